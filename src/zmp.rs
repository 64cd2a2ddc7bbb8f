//! ZMP (option 93): NUL-delimited string messages inside a Telnet
//! sub-negotiation, IAC bytes doubled on the wire.

use chrono::Utc;

use crate::conn::{Connection, WriteFlags};
use crate::telnet::{self, opt};

/// Build a complete `IAC SB ZMP ... IAC SE` frame from argument strings.
/// Literal 0xFF bytes are doubled; every argument gains a trailing NUL.
pub fn encode(args: &[&[u8]]) -> Vec<u8> {
    let mut frame = vec![telnet::IAC, telnet::SB, opt::ZMP];
    for arg in args {
        for &b in *arg {
            if b == telnet::IAC {
                frame.push(telnet::IAC);
            }
            frame.push(b);
        }
        frame.push(0);
    }
    frame.push(telnet::IAC);
    frame.push(telnet::SE);
    frame
}

/// Split an unescaped argument block back into its strings. The block
/// must be at least a one-byte command plus its NUL and end in NUL.
pub fn split_args(payload: &[u8]) -> Option<Vec<&[u8]>> {
    if payload.len() < 2 || payload[payload.len() - 1] != 0 {
        return None;
    }
    Some(payload[..payload.len() - 1].split(|&b| b == 0).collect())
}

/// Command and argument strings may only hold alphanumerics, `.` and `-`.
pub fn find_illegal_byte(args: &[&[u8]]) -> Option<u8> {
    for arg in args {
        for &b in *arg {
            if !(b.is_ascii_alphanumeric() || b == b'.' || b == b'-') {
                return Some(b);
            }
        }
    }
    None
}

impl Connection {
    /// Send a ZMP message and trace it.
    pub fn send_zmp(&mut self, args: &[&str]) {
        let raw: Vec<&[u8]> = args.iter().map(|a| a.as_bytes()).collect();
        let frame = encode(&raw);
        let _ = self.write(&frame, WriteFlags::empty());
        let mut line = String::from("SENT IAC SB ZMP ");
        for a in args {
            line.push('"');
            line.push_str(a);
            line.push_str("\" ");
        }
        line.push_str("IAC SE");
        self.trace(&line);
    }

    /// Handle an inbound ZMP sub-negotiation payload (option byte already
    /// stripped, IAC doubling already collapsed by the parser).
    pub(crate) fn recv_zmp(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            self.trace("ERROR: Too short ZMP command received");
            return;
        }
        let Some(args) = split_args(payload) else {
            self.trace("ERROR: Received a ZMP command that did not end with a NUL character");
            return;
        };
        if let Some(b) = find_illegal_byte(&args) {
            self.trace(&format!(
                "ERROR: Illegal ZMP command containing the character '{}' received.",
                b as char
            ));
            return;
        }
        let cmd = String::from_utf8_lossy(args[0]).into_owned();
        let mut line = format!("Received ZMP Command: {}", cmd);
        for arg in &args[1..] {
            line.push_str(&format!(" \"{}\"", String::from_utf8_lossy(arg)));
        }
        self.trace(&line);

        if cmd == "zmp.ping" {
            let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
            self.send_zmp(&["zmp.time", &stamp]);
        }
    }
}
