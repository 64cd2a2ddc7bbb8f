//! Canned test payloads: colour charts, VT100/xterm control-sequence
//! exercises and text-handling pages. Each page paints a pattern and then
//! tells the tester what a correct terminal should be showing.

use std::thread;
use std::time::Duration;

use crate::conn::{Connection, WriteFlags};

const COLS: &[u8; 16] = b"nrgybmcwNRGYBMCW";

fn put(conn: &mut Connection, text: &str) {
    let _ = conn.write(text.as_bytes(), WriteFlags::empty());
}

/// The 16 ANSI colours as a foreground/background grid.
pub fn colour_show(conn: &mut Connection) {
    put(
        conn,
        "These are the colours:\r\n  n  r  g  y  b  m  c  w  N  R  G  Y  B  M  C  W\r\n",
    );
    for b in 0..8 {
        put(conn, &format!("{} ", COLS[b] as char));
        for bold in 0..2 {
            for f in 0..8 {
                let label = if bold == 1 { COLS[f + 8] } else { COLS[f] };
                put(
                    conn,
                    &format!(
                        "\x1b[{};3{};4{}m{}{} \x1b[0m",
                        bold, f, b, label as char, COLS[b] as char
                    ),
                );
            }
        }
        put(conn, "\r\n");
    }
}

/// The 256-colour xterm palette: basics, 6x6x6 cubes, greyscales.
pub fn colour_show256(conn: &mut Connection) {
    put(conn, "Basic colours:  ");
    for i in 0..8 {
        put(conn, &format!("\x1b[3{}m{}", i, COLS[i] as char));
    }
    put(conn, " ");
    for i in 0..8 {
        put(conn, &format!("\x1b[4{}m{}", i, COLS[i] as char));
    }
    put(conn, "\x1b[0m\r\nBright colours: \x1b[1m");
    for i in 0..8 {
        put(conn, &format!("\x1b[3{}m{}", i, COLS[i + 8] as char));
    }
    put(conn, " ");
    for i in 0..8 {
        put(conn, &format!("\x1b[4{}m{}", i, COLS[i] as char));
    }
    put(conn, "\x1b[0m\r\n\r\n6x6x6 colour cubes:\r\n  R");
    for _ in 0..2 {
        for _ in 0..6 {
            put(conn, "012345");
        }
        put(conn, " ");
    }
    put(conn, "\r\n  G");
    for pass in 0..2 {
        if pass == 1 {
            put(conn, " ");
        }
        for i in 0..6 {
            for _ in 0..6 {
                put(conn, &format!("{}", i));
            }
        }
    }
    put(conn, "\r\n");
    for b in 0..6 {
        put(conn, &format!("B{} ", b));
        for g in 0..6 {
            for r in 0..6 {
                put(conn, &format!("\x1b[38;5;{}mX", 16 + r * 36 + g * 6 + b));
            }
        }
        put(conn, "\x1b[0m ");
        for g in 0..6 {
            for r in 0..6 {
                put(conn, &format!("\x1b[48;5;{}mX", 16 + r * 36 + g * 6 + b));
            }
        }
        put(conn, "\x1b[0m\r\n");
    }
    put(conn, "\r\nGreyscales (0-23): ");
    for i in 0..24 {
        put(conn, &format!("\x1b[38;5;{}mX", 16 + 6 * 6 * 6 + i));
    }
    put(conn, " ");
    for i in 0..24 {
        put(conn, &format!("\x1b[48;5;{}mX", 16 + 6 * 6 * 6 + i));
    }
    put(conn, "\x1b[0m\r\n");
}

/// VT100/102 and xterm control-sequence pages.
pub fn test_cc(conn: &mut Connection, args: &str) {
    match args.trim().parse::<u32>().unwrap_or(0) {
        1 => put(
            conn,
            "\x1b[3H\x1b[2J>\x1b[HX\x1b[;5HV\x1b[1;1H \r\n\x1b[3;5H\
             * - should be pointed to by V and > (line 3, column 5)\r\n\
             \r\nThe screen should only contain this text, \
             the message above, \"V\", \">\"\r\n\
             and \"* -\" plus the new prompt. \
             The V should be on the first line,\r\n\
             the > in the first column and this is the only X.\r\n",
        ),
        2 => put(
            conn,
            "\x1b[H\x1b[2J\
             123456789>\r\n\
             2   YY\r\n\
             3  YabY\r\n\
             4  YcdY\r\n\
             5   YY\r\n\
             V\r\n\
             \x1b[H\
             \x1b[B\x1b[2B\x1b[C\x1b[4CDX\
             \x1b[2A\x1b[3D  \x1b[D\x1b[2D\x1b[B AX \
             \x1b[E\
             \x1b[3C C\
             \x1b[F\x1b[2F\x1b[5C\x1b[2BB\
             \x1b[6G\x1b[2B \x1b[5G \
             \x1b[4;7H \
             \r\n\r\n\r\n\r\n\
             The screen should now show \"AB\" and below it \"CD\".\r\n\
             A should be shown in the third row, fifth column.\r\n",
        ),
        3 => put(
            conn,
            "\x1b[H\x1b[2J\
             XXXXXXXXXXXXXXXXXXXX\r\n\
             XXXXXXXXX#XXXXXXXXXX\r\n\
             XXXXXXX#####XXXXXXXX\r\n\
             XXXXXXXXXXXXXXXXXXXX\r\n\
             XXXXXXXXX#XXXXXXXXXX\r\n\
             XXXXXXXXXXXXXXXXXXXX\r\n\
             \x1b[2;9H\x1b[1J\
             \x1b[11G\x1b[K\
             \x1b[3;7H\x1b[1K\
             \x1b[13G\x1b[0K\
             \x1b[5;11H\x1b[J\x1b[2D\x1b[1K\
             \x1b[A\x1b[2K\
             \r\n\r\n\r\n\r\n\
             This is the only \"X\" that should be visible. \
             Line one, four and six should\r\n\
             be empty. If line four were to be removed, a 3x5 character\r\n\
             large plus-sign would be visible, made of 7 characters.\r\n",
        ),
        4 => put(
            conn,
            "\r\n\x1b(0\
             lqwqk    \r\n\
             xAxBx    \r\n\
             tqnqu    \r\n\
             xCxDx    \r\n\
             mqvqj    \r\n\
             y z a ` f g\x1b(B\r\n\r\n\
             A, B, C and D should be nicely framed with lines, then a line of symbols;\r\n\
             <=, >=, checkers, a diamond, a degree-sign and finally +-\r\n",
        ),
        5 => put(
            conn,
            "\r\n\x1b[2J\x1b[H\r\n\
             \x1b[33;41;1m\
             Storing the cursor here.\x1b7XXXXXX\r\n\
             \x1b[0;32;40mChanging cursor colour.\r\n\
             \x1b8XXXXXXXXXXXXX\r\n\
             \x1b8 After restoration of cursor.\x1b[m\r\n\r\n\r\n\
             The first row is empty, the second row should read:\r\n\
             Storing the cursor here. After restoration of cursor.\r\n\
             The colour of the second row is bright yellow on a red background,\r\n\
             the third row is written in dark green above a black background.\r\n\
             This is the only X.\r\n",
        ),
        // Character insert/delete exercises: DCH, ICH, REP, DL/IL.
        6 => put(
            conn,
            "\x1b[2J\x1b[H\
             1\r\nX\r\nX\r\nX\r\n5\r\n\
             \x1b[;3HXXXACF\
             \x1b[3G\x1b[P\x1b[2P\
             \x1b[4G\x1b[@\
             \x1b[2C\x1b[2@\
             \x1b[4GB\
             \x1b[6GDE\
             \x1b[2H\x1b[M\x1b[2M\x1b[L\x1b[2L\
             \x1b[2H2\r\n3\r\n4\
             \x1b[5;3Ha\x1b[2bb\x1b[bc\x1b[1b\x1b[bd\
             \r\n\r\n\r\n\
             The first row should be: \"1 ABCDEF\".\r\n\
             There should be a column with 1..5 and this is the only X.\r\n\
             The fifth row should be \"5 aaabbccd\" or \"5 aaabbcccd\"\r\n",
        ),
        7 => put(
            conn,
            "\x1b]0;Window and icon name\x07\
             \x1b]1;Icon name\x07\
             \x1b]2;Window title\x07\
             The window title should now be \"Window title\"\r\n\
             The icon name should now be \"Icon name\"\r\n",
        ),
        8 => {
            put(
                conn,
                "\x1b[2J\x1b[6;0H6\
                 \x1b[;4r\
                 X\r\nX\r\nX\r\nX\r\n\
                 2\r\nX\r\nX\
                 \x1b[3;5rX\r\n\
                 \r\n\
                 X\r\nX\r\n3\r\n4\r\n\
                 \x1b[r1\
                 \x1b[5;1H5\
                 \r\n\r\n\r\n\
                 A column with 1..6 is shown, starting at the first row. \
                 This is the only X.\r\n",
            );
            put(conn, "\x1b[10H");
        }
        9 => put(conn, "\x1bc\r\n"),
        // Reverse index inside and outside a scroll region.
        10 => put(
            conn,
            "\x1b[2J\x1b[5;1H6\
             \x1b[1;1H2\
             \x1bM\x083\
             \x1b[3;5r\r\n\r\nX\
             \x1bM\x085\
             \x1bM\x084\
             \x1bM\x083\
             \x1b[H\x1bMThis is the last line of the screen.\
             \x1b[r1\x1b[8;1H\
             The screen should show 1..6 from the upper left corner and down.\r\n\
             The last line should have a text about it. This is the only X.\r\n",
        ),
        11 => {
            put(conn, "This should show a single tile:\r\n\x1b[2;3z");
            for i in 0..80 {
                put(conn, &format!("\x1b[0;{}zX\x1b[1z", i));
            }
            put(conn, "\x1b[3z\r\nThis is the only X.\r\n");
        }
        _ => put(
            conn,
            "VT100/102 & xterm tests:\r\n\
             testcc 1  - clears the screen, absolute cursor movement tests.\r\n\
             testcc 2  - clears the screen, relative cursor movement tests.\r\n\
             testcc 3  - erase tests.\r\n\
             testcc 4  - \"DEC\" graphics.\r\n\
             testcc 5  - storing/restoring the cursor.\r\n\
             testcc 6  - text insertion tests.\r\n\
             testcc 7  - xterm icon & window title tests.\r\n\
             testcc 8  - scroll region tests.\r\n\
             testcc 9  - reset the terminal.\r\n\
             testcc 10 - test Reverse Index.\r\n\
             testcc 11 - tile glyph output.\r\n",
        ),
    }
}

/// Text-handling pages: CR handling, charsets, wrapping, backspace.
pub fn test_text(conn: &mut Connection, args: &str) {
    match args.trim().parse::<u32>().unwrap_or(0) {
        1 => {
            put(conn, "First line\r\n");
            let _ = conn.prompt(b"> ");
            thread::sleep(Duration::from_secs(1));
            let _ = conn.write(b"\r", WriteFlags::empty());
            put(
                conn,
                "Second line\r\nThere should no longer be a > character \
                 between the first and second line.\r\n",
            );
        }
        // Raw Latin-1 bytes; the doubled 0xFF is the IAC escape for a
        // literal y-umlaut on the client's screen.
        2 => {
            let _ = conn.write(
                b"\x1b%@\
                  (iso-8859-1 charset): A single y character, with \" above it: \xff\xff\r\n\
                  Word wrapping test. The next line contains non-breaking spaces:\r\n\
                  In\xa0this\xa0long\xa0line\xa0of\xa0text,\xa0the\xa0only\xa0place\
                  \xa0where space\xa0is\xa0used\xa0is\xa0before\xa0the\xa0first\
                  \xa0space\xa0word.\r\n",
                WriteFlags::empty(),
            );
        }
        3 => put(
            conn,
            "\x1b%G\
             (utf-8 charset): A single a character with \" above it: \u{e4} and again: a\u{308}\r\n\
             Word wrapping test. The next line contains non-breaking spaces:\r\n\
             In\u{a0}this\u{a0}long\u{a0}line\u{a0}of\u{a0}text,\u{a0}the\u{a0}only\u{a0}place\
             \u{a0}where space\u{a0}is\u{a0}used\u{a0}is\u{a0}before\u{a0}the\u{a0}first\
             \u{a0}space\u{a0}word.\r\n",
        ),
        4 => put(
            conn,
            "This test assumes the screen is 80 characters wide.\r\n\
             This 80 character line should not be wrapped. The line should properly end here.\r\n\
             This 81 character line should be wrapped. Xyzzy hocus pocus plugh shazam alakazam\r\n\
             This 81 character line should also be wrapped. Abracadabra plugh plover alakazam.\r\n\
             This 81 character line should be wrapped too.  Klaatu barada nikto!  Hocus-pocus.\r\n\
             This 81 character line should be wrapped as well. Klaatu barada nikto hocus-pocus\r\n",
        ),
        5 => {
            put(
                conn,
                "Backspace is destructive NOT!\x08\x08\x08\x08\r\n\
                 \r\n\
                 \x083\r\n\
                 \r\n\
                 \r\n\
                 \"3\" should be in the first column and there should be a blank\r\n\
                 line between the \"Backspace is...\" text and the line with \"3\".\r\n\
                 The first line should end with \"NOT!\"\r\n",
            );
            put(conn, "Backspace is destructive NOT!\x08\x08\x08\x08\r\n");
        }
        _ => put(
            conn,
            "Test processing tests:\r\n\
             testtext 1 - tests carriage return handling.\r\n\
             testtext 2 - tests ISO-8859-1 text handling.\r\n\
             testtext 3 - tests UTF-8 text handling.\r\n\
             testtext 4 - more word wrapping tests\r\n\
             testtext 5 - Backspace testing.\r\n",
        ),
    }
}

/// Bright colours, a prompt that gets overwritten, and a split escape
/// sequence delivered across a deliberate pause.
pub fn test_ansi(conn: &mut Connection, args: &str) {
    put(
        conn,
        "\x1b[1;37;40mBright white \x1b[1;31mBright red.\x1b[37m\r\n",
    );
    let _ = conn.prompt(b"special prompt> ");
    let delay = args.trim().parse::<u64>().unwrap_or(1).max(1);
    thread::sleep(Duration::from_secs(delay));
    let _ = conn.write(b"\r", WriteFlags::empty());
    put(conn, "\x1b");
    thread::sleep(Duration::from_secs(delay));
    put(
        conn,
        "[31mStill bright red\r\n\x1b[mBack to the default colour.\r\n",
    );
}
