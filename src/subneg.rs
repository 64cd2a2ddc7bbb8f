//! Sub-negotiation handlers, dispatched on the option code that leads
//! the collected payload.

use std::fmt::Write as _;

use crate::conn::{Connection, WriteFlags};
use crate::telnet::{self, charset, opt, option_name};

/// Charsets the server is willing to ACCEPT: UTF-8 plus US-ASCII and
/// ISO-8859-1 under their IANA aliases, compared case-insensitively.
const OK_CHARSETS: &[&str] = &[
    "UTF-8",
    // ASCII and its aliases
    "ANSI_X3.4-1968",
    "iso-ir-6",
    "ANSI_X3.4-1986",
    "IS_646.irv:1991",
    "ASCII",
    "ISO646-US",
    "US-ASCII",
    "us",
    "IBM367",
    "cp367",
    "csASCII",
    // ISO-8859-1 and its aliases
    "ISO_8859-1:1987",
    "iso-ir-100",
    "ISO_8859-1",
    "ISO-8859-1",
    "latin1",
    "l1",
    "IBM819",
    "CP819",
    "csISOLatin1",
];

fn is_ok_charset(name: &[u8]) -> bool {
    OK_CHARSETS
        .iter()
        .any(|ok| ok.as_bytes().eq_ignore_ascii_case(name))
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut s = String::new();
    for b in bytes {
        let _ = write!(s, "{:02X} ", b);
    }
    s
}

impl Connection {
    /// Complete sub-negotiation collected between IAC SB and IAC SE.
    /// The payload sits in the line buffer past the in-progress line.
    pub(crate) fn process_subneg(&mut self) {
        let payload = self.line[self.curr..self.telnet_position].to_vec();
        let Some(&code) = payload.first() else {
            self.trace("ERROR: An incomplete SB option?");
            return;
        };
        self.trace(&format!(
            "RCVD IAC SB {} {}IAC SE",
            option_name(code),
            hex_dump(&payload[1..])
        ));
        match code {
            opt::CHARSET => self.recv_charset(&payload),
            opt::TTYPE => self.recv_terminal_type(&payload),
            opt::NAWS => self.recv_naws(&payload),
            opt::ZMP => self.recv_zmp(&payload[1..]),
            other => {
                self.trace(&format!("Unknown telnet SB option: {:02X}", other));
            }
        }
    }

    fn recv_terminal_type(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            self.trace("ERROR: An incomplete SB option?");
            return;
        }
        // Only IS replies carry a name.
        if payload[1] != 0 {
            return;
        }
        let name = String::from_utf8_lossy(&payload[2..]).into_owned();
        self.trace(&format!("TT: \"{}\"", name));
    }

    fn recv_naws(&mut self, payload: &[u8]) {
        if payload.len() < 5 {
            self.trace("ERROR: Too few arguments to SB NAWS");
            return;
        }
        self.x_size = u16::from(payload[1]) << 8 | u16::from(payload[2]);
        self.y_size = u16::from(payload[3]) << 8 | u16::from(payload[4]);
        let (x, y) = (self.x_size, self.y_size);
        self.trace(&format!("Terminal size: {} {}", x, y));
    }

    fn recv_charset(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            self.trace("ERROR: The CHARSET SB option was incomplete.");
            return;
        }
        let sub = payload[1];
        let rest = &payload[2..];
        match sub {
            charset::REQUEST => {
                self.trace(&format!(
                    "RCVD IAC SB CHARSET REQUEST {}",
                    String::from_utf8_lossy(rest)
                ));
                self.charset_request(rest);
            }
            charset::ACCEPTED => self.charset_note("ACCEPTED", rest),
            charset::REJECTED => self.charset_note("REJECTED", rest),
            charset::TTABLE_IS => {
                self.charset_note("TTABLE-IS", rest);
                // No translation tables here.
                let _ = self.write(
                    &[
                        telnet::IAC,
                        telnet::SB,
                        opt::CHARSET,
                        charset::TTABLE_REJECTED,
                        telnet::IAC,
                        telnet::SE,
                    ],
                    WriteFlags::DO_FLUSH,
                );
                self.trace("SENT IAC SB CHARSET TTABLE-REJECTED IAC SE");
            }
            charset::TTABLE_REJECTED => self.charset_note("TTABLE-REJECTED", rest),
            charset::TTABLE_ACK => self.charset_note("TTABLE-ACK", rest),
            charset::TTABLE_NAK => self.charset_note("TTABLE-NAK", rest),
            other => {
                self.trace(&format!(
                    "ERROR(?): Received unknown CHARSET SB Code: {:02x}",
                    other
                ));
            }
        }
    }

    fn charset_note(&mut self, what: &str, rest: &[u8]) {
        self.trace(&format!(
            "RCVD IAC SB CHARSET {} {}IAC SE",
            what,
            hex_dump(rest)
        ));
    }

    /// Pick the first whitelisted name out of a REQUEST and answer it.
    fn charset_request(&mut self, mut rest: &[u8]) {
        // A TTABLE prefix carries one version byte after the word.
        if rest.starts_with(b"TTABLE") {
            if rest.len() < 7 {
                self.charset_reject();
                return;
            }
            rest = &rest[7..];
        }
        let Some((&sep, names)) = rest.split_first() else {
            self.charset_reject();
            return;
        };
        match names.split(|&b| b == sep).find(|name| is_ok_charset(name)) {
            Some(name) => {
                let mut reply = vec![telnet::IAC, telnet::SB, opt::CHARSET, charset::ACCEPTED];
                reply.extend_from_slice(name);
                reply.push(telnet::IAC);
                reply.push(telnet::SE);
                let _ = self.write(&reply, WriteFlags::DO_FLUSH);
                let accepted = String::from_utf8_lossy(name).into_owned();
                self.trace(&format!("SENT IAC SB CHARSET ACCEPT \"{}\" IAC SE", accepted));
            }
            None => self.charset_reject(),
        }
    }

    fn charset_reject(&mut self) {
        let _ = self.write(
            &[
                telnet::IAC,
                telnet::SB,
                opt::CHARSET,
                charset::REJECTED,
                telnet::IAC,
                telnet::SE,
            ],
            WriteFlags::DO_FLUSH,
        );
        self.trace("SENT IAC SB CHARSET REJECT IAC SE");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{IAC, SB, SE};

    fn quiet() -> Connection {
        let mut c = Connection::detached();
        c.set_var("nodebug", "1");
        c
    }

    fn feed_sb(c: &mut Connection, payload: &[u8]) {
        c.process_byte(IAC);
        c.process_byte(SB);
        for &b in payload {
            c.process_byte(b);
            if b == IAC {
                c.process_byte(IAC);
            }
        }
        c.process_byte(IAC);
        c.process_byte(SE);
    }

    #[test]
    fn naws_stores_window_size() {
        let mut c = quiet();
        feed_sb(&mut c, &[opt::NAWS, 0, 80, 0, 24]);
        assert_eq!((c.x_size, c.y_size), (80, 24));
    }

    #[test]
    fn naws_too_short_leaves_size_alone() {
        let mut c = Connection::detached();
        feed_sb(&mut c, &[opt::NAWS, 0, 80]);
        assert_eq!((c.x_size, c.y_size), (0, 0));
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("Too few arguments to SB NAWS"), "{}", out);
    }

    #[test]
    fn terminal_type_is_traced() {
        let mut c = Connection::detached();
        let mut payload = vec![opt::TTYPE, 0];
        payload.extend_from_slice(b"xterm-256color");
        feed_sb(&mut c, &payload);
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("TT: \"xterm-256color\""), "{}", out);
    }

    #[test]
    fn charset_request_accepts_utf8() {
        let mut c = quiet();
        let mut payload = vec![opt::CHARSET, charset::REQUEST, b';'];
        payload.extend_from_slice(b"UTF-8");
        feed_sb(&mut c, &payload);
        let mut expect = vec![IAC, SB, opt::CHARSET, charset::ACCEPTED];
        expect.extend_from_slice(b"UTF-8");
        expect.push(IAC);
        expect.push(SE);
        assert_eq!(c.take_output(), expect);
    }

    #[test]
    fn charset_request_scans_alias_list() {
        let mut c = quiet();
        let mut payload = vec![opt::CHARSET, charset::REQUEST, b';'];
        payload.extend_from_slice(b"KOI8-R;latin1;UTF-8");
        feed_sb(&mut c, &payload);
        let out = c.take_output();
        // First acceptable name wins, case preserved from the request.
        let mut expect = vec![IAC, SB, opt::CHARSET, charset::ACCEPTED];
        expect.extend_from_slice(b"latin1");
        expect.push(IAC);
        expect.push(SE);
        assert_eq!(out, expect);
    }

    #[test]
    fn charset_request_rejects_unknown() {
        let mut c = quiet();
        let mut payload = vec![opt::CHARSET, charset::REQUEST, b';'];
        payload.extend_from_slice(b"EBCDIC-US;KOI8-R");
        feed_sb(&mut c, &payload);
        assert_eq!(
            c.take_output(),
            [IAC, SB, opt::CHARSET, charset::REJECTED, IAC, SE]
        );
    }

    #[test]
    fn charset_request_with_ttable_prefix() {
        let mut c = quiet();
        let mut payload = vec![opt::CHARSET, charset::REQUEST];
        payload.extend_from_slice(b"TTABLE\x01;US-ASCII");
        feed_sb(&mut c, &payload);
        let mut expect = vec![IAC, SB, opt::CHARSET, charset::ACCEPTED];
        expect.extend_from_slice(b"US-ASCII");
        expect.push(IAC);
        expect.push(SE);
        assert_eq!(c.take_output(), expect);
    }

    #[test]
    fn charset_ttable_is_gets_rejected() {
        let mut c = quiet();
        feed_sb(&mut c, &[opt::CHARSET, charset::TTABLE_IS, 1, 2, 3]);
        assert_eq!(
            c.take_output(),
            [IAC, SB, opt::CHARSET, charset::TTABLE_REJECTED, IAC, SE]
        );
    }

    #[test]
    fn charset_matching_ignores_case() {
        assert!(is_ok_charset(b"utf-8"));
        assert!(is_ok_charset(b"Us-Ascii"));
        assert!(is_ok_charset(b"csisolatin1"));
        assert!(!is_ok_charset(b"UTF-16"));
    }

    #[test]
    fn unknown_sb_option_traced() {
        let mut c = Connection::detached();
        feed_sb(&mut c, &[opt::MSP, 1, 2]);
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("Unknown telnet SB option: 5A"), "{}", out);
    }

    #[test]
    fn empty_subneg_is_survivable() {
        let mut c = Connection::detached();
        c.process_byte(IAC);
        c.process_byte(SB);
        c.process_byte(IAC);
        c.process_byte(SE);
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("incomplete SB option"), "{}", out);
    }
}
