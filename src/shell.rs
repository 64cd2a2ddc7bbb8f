//! Command dispatch over completed input lines. Everything here consumes
//! only the connection write path and the option-engine entry points.

use std::fs::File;
use std::io::Read;

use crate::conn::{Connection, Mode, WriteFlags};
use crate::ident;
use crate::pages;
use crate::server::{ClientId, Server};
use crate::telnet::{self, opt};
use crate::zmp;

/// One more than the max number of arguments to a ZMP command.
const MAX_ZMP_ARGS: usize = 20;

const HELP: &str = "Commands: \r\n\
    cat [<maxsize>] - sends the test.txt file (up to byte <maxsize>)\r\n\
    colourshow - show the 16 ansi colours.\r\n\
    colourshow256 - show the 256 xterm colours.\r\n\
    eall <text> - sends text to all connected clients (without a prompt afterwards).\r\n\
    echo - turn server echo on/off.\r\n\
    ident - try to look up the user id via IDENT, RFC1413\r\n\
    promptall <text> - send text to all connected clients without newline\r\n\
    quit - leave\r\n\
    sendasis <string> - send the string back on a new line.\r\n\
    senddata <hex byte>* - send the bytes back.\r\n\
    set <variable> <value> - set a variable.\r\n\
    startmsp - start telnet msp option negotiation.\r\n\
    startmxp - start telnet mxp option negotiation.\r\n\
    stopmccp - finish the zlib stream.\r\n\
    telnet - Hex codes for some telnet constants.\r\n\
    testansi - Various ANSI colour tests.\r\n\
    testcc - Various control code sequence tests.\r\n\
    testtext - Various text tests.\r\n\
    tt - Ask the client for the next terminal type.\r\n\
    zmp <cmd> [<args>|\"<arg>\"]* - send a ZMP command.\r\n";

const TELNET_CHEAT_SHEET: &str = "TELNET and other codes:\r\n\
    IAC  = FF  DONT = FE  DO   = FD  WONT = FC  WILL = FB\r\n\
    MSP  = 5A  MXP  = 5B  ZMP  = 5D  END OF RECORD   = EF\r\n\
    ESC  = 1B  [    = 5B  ]    = 5D\r\n\
    \r\n";

const CREDITS: &str = "mudtest comes with ABSOLUTELY NO WARRANTY.\r\n\
    This is free software, and you are welcome to redistribute it\r\n\
    under certain conditions.\r\n";

/// Welcome a freshly accepted client and put up the first prompt.
pub fn greet(server: &mut Server, id: ClientId) {
    let Some(conn) = server.client_mut(id) else {
        return;
    };
    let _ = conn.write(
        format!(
            "\r\n\r\nWelcome to the MUD Client Test Server!\r\n\
             Server version: {}\r\n\r\nWrite ? for help\r\n",
            env!("CARGO_PKG_VERSION")
        )
        .as_bytes(),
        WriteFlags::empty(),
    );
    dispatch(server, id, b"");
}

/// Run one input line and re-issue the prompt (unless the line closed
/// the connection).
pub fn dispatch(server: &mut Server, id: ClientId, line: &[u8]) {
    let Some(conn) = server.client_mut(id) else {
        return;
    };
    let _ = conn.write(b"\r\n", WriteFlags::empty());

    let text = String::from_utf8_lossy(line).into_owned();
    let trimmed = text.trim_matches(' ');
    let (cmd, args) = match trimmed.split_once(' ') {
        Some((c, a)) => (c, a.trim_start_matches(' ')),
        None => (trimmed, ""),
    };
    let cmd = cmd.to_ascii_lowercase();

    match cmd.as_str() {
        // Commands that reach past the issuing client.
        "eall" => {
            for cid in server.client_ids() {
                if let Some(conn) = server.client_mut(cid) {
                    let _ = conn.write(args.as_bytes(), WriteFlags::empty());
                    let _ = conn.write(b"\r\n", WriteFlags::DO_FLUSH);
                }
            }
        }
        "promptall" => {
            for cid in server.client_ids() {
                if let Some(conn) = server.client_mut(cid) {
                    let _ = conn.write(args.as_bytes(), WriteFlags::DO_FLUSH);
                }
            }
        }
        "quit" => {
            if let Some(conn) = server.client_mut(id) {
                let _ = conn.write(b"Bwye!\r\n", WriteFlags::DO_FLUSH);
            }
            if let Some(peer) = server.close(id) {
                println!("{} disconnected (quit, client {})", peer, id);
            }
            return;
        }
        _ => {
            let Some(conn) = server.client_mut(id) else {
                return;
            };
            run_client_command(conn, &cmd, args, line);
        }
    }

    if let Some(conn) = server.client_mut(id) {
        let _ = conn.prompt(b"> ");
    }
}

fn run_client_command(conn: &mut Connection, cmd: &str, args: &str, raw: &[u8]) {
    match cmd {
        "" => {}
        "?" | "help" => {
            let _ = conn.write(HELP.as_bytes(), WriteFlags::empty());
        }
        "cat" => cat(conn, args),
        "colourshow" | "colorshow" => pages::colour_show(conn),
        "colourshow256" | "colorshow256" | "colourshow2" | "colorshow2" => {
            pages::colour_show256(conn)
        }
        "credits" => {
            let _ = conn.write(CREDITS.as_bytes(), WriteFlags::empty());
        }
        "echo" => {
            if conn.mode.contains(Mode::INVISIBLE) {
                conn.visible();
            } else {
                conn.invisible();
            }
        }
        "ident" => {
            let _ = conn.write(b"(processing)\r\n", WriteFlags::DO_FLUSH);
            ident::lookup(conn);
        }
        "sendasis" => {
            let _ = conn.write(args.as_bytes(), WriteFlags::empty());
            let _ = conn.write(b"\r\n", WriteFlags::empty());
        }
        "senddata" => send_data(conn, args),
        "set" => handle_set(conn, args),
        "startmsp" => conn.enable_us(opt::MSP),
        "startmxp" => conn.enable_us(opt::MXP),
        "stopmccp" => {
            let _ = conn.write(
                b"Stopping MCCP\r\n",
                WriteFlags::FINISH | WriteFlags::DO_FLUSH,
            );
        }
        "telnet" => {
            let _ = conn.write(TELNET_CHEAT_SHEET.as_bytes(), WriteFlags::empty());
        }
        "testansi" => pages::test_ansi(conn, args),
        "testtext" => pages::test_text(conn, args),
        "testcc" => pages::test_cc(conn, args),
        "tt" => conn.turned_on_him(opt::TTYPE),
        "zmp" => zmp_command(conn, args),
        _ => {
            let _ = conn.write(b"Unknown command: ", WriteFlags::empty());
            // Echo the raw line; a literal 0xFF must be doubled.
            let mut echoed = Vec::with_capacity(raw.len());
            for &b in raw {
                if b == telnet::IAC {
                    echoed.push(telnet::IAC);
                }
                echoed.push(b);
            }
            let _ = conn.write(&echoed, WriteFlags::empty());
            let _ = conn.write(b"\r\n", WriteFlags::empty());
        }
    }
}

/// Stream `test.txt` with LF expanded to CR LF, truncated at `maxsize`
/// input bytes when given.
fn cat(conn: &mut Connection, args: &str) {
    let mut max = args.trim().parse::<usize>().unwrap_or(0);
    if max == 0 {
        max = 1 << 30;
    }
    let Ok(mut f) = File::open("test.txt") else {
        let _ = conn.write(b"Could not find test.txt\r\n", WriteFlags::empty());
        return;
    };
    let mut buf = [0u8; 4096];
    while max > 0 {
        let n = match f.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let take = n.min(max);
        max -= take;
        let mut out = Vec::with_capacity(take + 64);
        for &b in &buf[..take] {
            if b == b'\n' {
                out.extend_from_slice(b"\r\n");
            } else {
                out.push(b);
            }
        }
        if conn.write(&out, WriteFlags::empty()).is_err() {
            break;
        }
    }
}

pub(crate) fn parse_hex_bytes(args: &str) -> Result<Vec<u8>, ()> {
    let mut out = Vec::new();
    for tok in args.split_whitespace() {
        match u8::from_str_radix(tok, 16) {
            Ok(b) => out.push(b),
            Err(_) => return Err(()),
        }
    }
    Ok(out)
}

fn send_data(conn: &mut Connection, args: &str) {
    if args.is_empty() {
        let _ = conn.write(
            b"USAGE: senddata <hex byte> <hex byte>*\r\n\
              Example: senddata 41 42 43  -- sends ABC\r\n",
            WriteFlags::empty(),
        );
        return;
    }
    match parse_hex_bytes(args) {
        Ok(bytes) => {
            let _ = conn.write(&bytes, WriteFlags::empty());
            let _ = conn.write(b"\r\n", WriteFlags::empty());
        }
        Err(()) => {
            let _ = conn.write(b"\r\nERROR: Unknown byte.\r\n", WriteFlags::empty());
        }
    }
}

/// `set` — list variables, set one, or unset one. The engine itself only
/// ever reads `nodebug`.
fn handle_set(conn: &mut Connection, args: &str) {
    if args.is_empty() {
        let listing: Vec<String> = conn
            .vars()
            .map(|(k, v)| format!("{}={}\r\n", k, v))
            .collect();
        if listing.is_empty() {
            let _ = conn.write(
                b"No variables are set.\r\n\
                  Use \"set var value\" to set the \"var\" variable to \"value\".\r\n\
                  Use \"set var\" to unset the \"var\" variable.\r\n\
                  Known variables are:\r\n\
                  \x20 nodebug - if set to any value, stops telnet options from being displayed.\r\n",
                WriteFlags::empty(),
            );
        } else {
            for entry in listing {
                let _ = conn.write(entry.as_bytes(), WriteFlags::empty());
            }
        }
        return;
    }
    let (key, value) = match args.split_once(' ') {
        Some((k, v)) => (k, v.trim_start_matches(' ')),
        None => (args, ""),
    };
    if value.is_empty() {
        conn.remove_var(key);
    } else {
        conn.set_var(key, value);
    }
}

pub(crate) fn parse_zmp_args(mut s: &str) -> Result<Vec<String>, ()> {
    let mut out = Vec::new();
    while out.len() < MAX_ZMP_ARGS {
        s = s.trim_start_matches(' ');
        if s.is_empty() {
            break;
        }
        if let Some(rest) = s.strip_prefix('"') {
            let Some(end) = rest.find('"') else {
                return Err(());
            };
            out.push(rest[..end].to_string());
            s = &rest[end + 1..];
        } else {
            let end = s.find(' ').unwrap_or(s.len());
            out.push(s[..end].to_string());
            s = &s[end..];
        }
    }
    Ok(out)
}

/// `zmp <cmd> [arg|"arg"]*` — build a ZMP message from the shell line
/// and put it on the wire.
fn zmp_command(conn: &mut Connection, args: &str) {
    if args.trim().is_empty() {
        let _ = conn.write(
            b"USAGE: zmp cmd [<arg>|\"<arg>\"]*\r\n",
            WriteFlags::empty(),
        );
        return;
    }
    let parsed = match parse_zmp_args(args) {
        Ok(p) => p,
        Err(()) => {
            let _ = conn.write(b"ERROR: Unterminated ZMP argument\r\n", WriteFlags::empty());
            return;
        }
    };
    let mut note = String::from("Sending: IAC SB ZMP ");
    for a in &parsed {
        note.push('"');
        note.push_str(a);
        note.push_str("\" ");
    }
    note.push_str("IAC SE\r\n");
    let _ = conn.write(note.as_bytes(), WriteFlags::empty());
    let raw: Vec<&[u8]> = parsed.iter().map(|a| a.as_bytes()).collect();
    let frame = zmp::encode(&raw);
    let _ = conn.write(&frame, WriteFlags::DO_FLUSH);
}
