//! Inbound byte handling: the Telnet command state machine, the CR/LF
//! normalizer and the line editor.

use crate::conn::{Connection, Mode, WriteFlags, LINELEN};
use crate::telnet::{self, opt, CrlfState, OptionState, TelnetState};

const CTRL_R: u8 = 0x12;
const CTRL_U: u8 = 0x15;
const CTRL_W: u8 = 0x17;
const BS: u8 = 0x08;
const DEL: u8 = 0x7f;

impl Connection {
    /// Feed one inbound byte. Returns the completed line, terminator
    /// stripped, when this byte finished one.
    pub(crate) fn process_byte(&mut self, b: u8) -> Option<Vec<u8>> {
        match self.t_state {
            TelnetState::Normal => {
                if b == telnet::IAC {
                    self.t_state = TelnetState::Iac;
                    None
                } else {
                    self.process_normal(b)
                }
            }
            TelnetState::Iac => self.process_iac(b),
            TelnetState::Will => {
                self.t_state = TelnetState::Normal;
                self.recv_will(b);
                None
            }
            TelnetState::Wont => {
                self.t_state = TelnetState::Normal;
                self.recv_wont(b);
                None
            }
            TelnetState::Do => {
                self.t_state = TelnetState::Normal;
                self.recv_do(b);
                None
            }
            TelnetState::Dont => {
                self.t_state = TelnetState::Normal;
                self.recv_dont(b);
                None
            }
            TelnetState::Sb => {
                if b == telnet::IAC {
                    self.t_state = TelnetState::SbIac;
                } else {
                    self.push_subneg(b);
                }
                None
            }
            TelnetState::SbIac => {
                if b == telnet::IAC {
                    // Doubled IAC inside the payload collapses to one byte.
                    self.t_state = TelnetState::Sb;
                    self.push_subneg(telnet::IAC);
                } else if b == telnet::SE {
                    self.t_state = TelnetState::Normal;
                    self.process_subneg();
                } else {
                    self.t_state = TelnetState::Normal;
                    self.trace(&format!(
                        "ERROR: Sub-negotiation aborted by IAC followed by 0x{:02x}",
                        b
                    ));
                }
                None
            }
        }
    }

    fn process_iac(&mut self, b: u8) -> Option<Vec<u8>> {
        self.t_state = TelnetState::Normal;
        match b {
            telnet::IAC => {
                // Escaped data byte.
                self.store_char(telnet::IAC);
                None
            }
            telnet::WILL => {
                self.t_state = TelnetState::Will;
                None
            }
            telnet::WONT => {
                self.t_state = TelnetState::Wont;
                None
            }
            telnet::DO => {
                self.t_state = TelnetState::Do;
                None
            }
            telnet::DONT => {
                self.t_state = TelnetState::Dont;
                None
            }
            telnet::SB => {
                self.t_state = TelnetState::Sb;
                self.telnet_position = self.curr;
                None
            }
            telnet::GA => {
                self.trace("RCVD: IAC GA");
                None
            }
            telnet::EL => {
                self.trace("RCVD: IAC EL");
                self.process_normal(CTRL_U)
            }
            telnet::EC => {
                self.trace("RCVD: IAC EC");
                self.process_normal(BS)
            }
            telnet::AYT => {
                self.trace("RCVD: IAC AYT");
                let _ = self.write(b"<I AM HERE>\r\n", WriteFlags::DO_FLUSH);
                None
            }
            telnet::AO => {
                self.trace("RCVD: IAC AO");
                // Flushing queued output properly would tear mid-sequence
                // ANSI in half; a synch marker is all the client gets.
                let _ = self.write(&[telnet::IAC, telnet::DM], WriteFlags::DO_FLUSH);
                self.trace("SENT: IAC DM");
                None
            }
            telnet::IP => {
                self.trace("RCVD: IAC IP");
                None
            }
            telnet::BREAK => {
                self.trace("RCVD: IAC BREAK");
                None
            }
            telnet::NOP => {
                self.trace("RCVD: IAC NOP");
                None
            }
            telnet::ABORT => {
                self.trace("RCVD: IAC ABORT");
                None
            }
            telnet::SUSPEND => {
                self.trace("RCVD: IAC SUSPEND");
                None
            }
            other => {
                self.trace(&format!("ERROR(?): RCVD: IAC followed by 0x{:02x}", other));
                None
            }
        }
    }

    /// Sub-negotiation payload shares the tail of the line buffer; bytes
    /// past its end are discarded.
    fn push_subneg(&mut self, b: u8) {
        if self.telnet_position < LINELEN {
            self.line[self.telnet_position] = b;
            self.telnet_position += 1;
        }
    }

    /// CR/LF normalizer plus the line editor for everything else.
    fn process_normal(&mut self, b: u8) -> Option<Vec<u8>> {
        match self.c_state {
            CrlfState::AfterCr => {
                self.c_state = CrlfState::Normal;
                match b {
                    0 | b'\n' => None,
                    _ => self.process_normal(b),
                }
            }
            CrlfState::AfterLf => {
                self.c_state = CrlfState::Normal;
                match b {
                    0 => {
                        self.trace("WARN: Got LF NUL");
                        None
                    }
                    b'\r' => {
                        self.trace("ERROR: Got LF CR");
                        None
                    }
                    _ => self.process_normal(b),
                }
            }
            CrlfState::Normal => match b {
                0 => None,
                b'\n' => {
                    self.c_state = CrlfState::AfterLf;
                    Some(self.finish_line())
                }
                b'\r' => {
                    self.c_state = CrlfState::AfterCr;
                    Some(self.finish_line())
                }
                CTRL_R => {
                    if self.should_echo() {
                        let mut buf = Vec::with_capacity(self.curr + 2);
                        buf.extend_from_slice(b"\r\n");
                        buf.extend_from_slice(&self.line[..self.curr]);
                        let _ = self.write(&buf, WriteFlags::DO_FLUSH);
                    }
                    None
                }
                CTRL_U => {
                    self.rubout(self.curr);
                    self.curr = 0;
                    None
                }
                CTRL_W => {
                    let mut keep = self.curr;
                    while keep > 0 && self.line[keep - 1] == b' ' {
                        keep -= 1;
                    }
                    while keep > 0 && self.line[keep - 1] != b' ' {
                        keep -= 1;
                    }
                    self.rubout(self.curr - keep);
                    self.curr = keep;
                    None
                }
                BS | DEL => {
                    if self.curr > 0 {
                        self.curr -= 1;
                        self.rubout(1);
                    }
                    None
                }
                other => {
                    self.store_char(other);
                    None
                }
            },
        }
    }

    /// Append a printable byte, echoing it back when echo is on. Control
    /// ranges and overruns are dropped.
    fn store_char(&mut self, b: u8) {
        if b < b' ' || (0x80..=0x9f).contains(&b) {
            return;
        }
        if self.curr >= LINELEN {
            return;
        }
        self.line[self.curr] = b;
        self.curr += 1;
        if self.should_echo() {
            let _ = self.write(&[b], WriteFlags::DO_FLUSH);
        }
    }

    /// Erase `n` already-echoed characters from the client's display.
    fn rubout(&mut self, n: usize) {
        if n > 0 && self.should_echo() {
            let seq: Vec<u8> = b"\x08 \x08".iter().copied().cycle().take(3 * n).collect();
            let _ = self.write(&seq, WriteFlags::DO_FLUSH);
        }
    }

    fn finish_line(&mut self) -> Vec<u8> {
        if self.us_state(opt::ECHO) == OptionState::Yes || self.mode.contains(Mode::INVISIBLE) {
            let _ = self.write(b"\r\n", WriteFlags::empty());
        }
        let line = self.line[..self.curr].to_vec();
        self.curr = 0;
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(c: &mut Connection, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &b in bytes {
            if let Some(line) = c.process_byte(b) {
                lines.push(line);
            }
        }
        lines
    }

    #[test]
    fn crlf_variants_yield_one_line_each() {
        for term in [&b"\r\n"[..], &b"\r\0"[..], &b"\n"[..]] {
            let mut c = Connection::detached();
            let mut input = b"hello".to_vec();
            input.extend_from_slice(term);
            let lines = feed(&mut c, &input);
            assert_eq!(lines, vec![b"hello".to_vec()], "terminator {:?}", term);
            assert_eq!(c.curr, 0);
        }
    }

    #[test]
    fn lf_cr_is_absorbed_with_error_trace() {
        let mut c = Connection::detached();
        let lines = feed(&mut c, b"one\n\rtwo\n");
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("ERROR: Got LF CR"), "{}", out);
    }

    #[test]
    fn lf_nul_warns() {
        let mut c = Connection::detached();
        feed(&mut c, b"one\n\0");
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("WARN: Got LF NUL"), "{}", out);
    }

    #[test]
    fn doubled_iac_is_literal_data() {
        let mut c = Connection::detached();
        let lines = feed(&mut c, &[telnet::IAC, telnet::IAC, b'A', b'\r', b'\n']);
        assert_eq!(lines, vec![vec![telnet::IAC, b'A']]);
        assert_eq!(c.t_state, TelnetState::Normal);
    }

    #[test]
    fn line_buffer_boundary() {
        let mut c = Connection::detached();
        feed(&mut c, &vec![b'a'; LINELEN - 1]);
        assert_eq!(c.curr, LINELEN - 1);
        feed(&mut c, b"b");
        assert_eq!(c.curr, LINELEN);
        // Full: printable input is dropped until a terminator.
        feed(&mut c, b"ccc");
        assert_eq!(c.curr, LINELEN);
        let lines = feed(&mut c, b"\r\n");
        assert_eq!(lines[0].len(), LINELEN);
        assert_eq!(c.curr, 0);
    }

    #[test]
    fn control_chars_dropped() {
        let mut c = Connection::detached();
        let lines = feed(&mut c, b"a\x01b\x9fc\r\n");
        assert_eq!(lines, vec![b"abc".to_vec()]);
    }

    #[test]
    fn backspace_edits_and_echoes() {
        let mut c = Connection::detached();
        c.us[opt::ECHO as usize] = OptionState::Yes;
        feed(&mut c, b"ab\x08");
        assert_eq!(c.curr, 1);
        assert_eq!(c.take_output(), b"ab\x08 \x08");
        // Nothing left: backspace at column zero stays silent.
        feed(&mut c, b"\x08\x08");
        assert_eq!(c.curr, 0);
        assert_eq!(c.take_output(), b"\x08 \x08");
    }

    #[test]
    fn kill_line_resets_cursor() {
        let mut c = Connection::detached();
        c.us[opt::ECHO as usize] = OptionState::Yes;
        feed(&mut c, b"abc\x15");
        assert_eq!(c.curr, 0);
        let out = c.take_output();
        assert_eq!(&out[3..], b"\x08 \x08\x08 \x08\x08 \x08");
    }

    #[test]
    fn erase_word_consumes_spaces_then_word() {
        let mut c = Connection::detached();
        feed(&mut c, b"one two  \x17");
        assert_eq!(&c.line[..c.curr], b"one ");
        feed(&mut c, b"\x17");
        assert_eq!(c.curr, 0);
    }

    #[test]
    fn refresh_redisplays_line() {
        let mut c = Connection::detached();
        c.us[opt::ECHO as usize] = OptionState::Yes;
        feed(&mut c, b"hi");
        c.take_output();
        feed(&mut c, &[CTRL_R]);
        assert_eq!(c.take_output(), b"\r\nhi");
    }

    #[test]
    fn erase_line_command_injects_kill() {
        let mut c = Connection::detached();
        feed(&mut c, b"abc");
        feed(&mut c, &[telnet::IAC, telnet::EL]);
        assert_eq!(c.curr, 0);
    }

    #[test]
    fn ayt_answers() {
        let mut c = Connection::detached();
        c.set_var("nodebug", "1");
        feed(&mut c, &[telnet::IAC, telnet::AYT]);
        assert_eq!(c.take_output(), b"<I AM HERE>\r\n");
    }

    #[test]
    fn abort_output_sends_synch_mark() {
        let mut c = Connection::detached();
        c.set_var("nodebug", "1");
        feed(&mut c, &[telnet::IAC, telnet::AO]);
        assert_eq!(c.take_output(), [telnet::IAC, telnet::DM]);
    }

    #[test]
    fn subneg_payload_collects_and_unescapes() {
        let mut c = Connection::detached();
        c.set_var("nodebug", "1");
        feed(&mut c, b"ab");
        feed(
            &mut c,
            &[
                telnet::IAC,
                telnet::SB,
                opt::NAWS,
                0,
                telnet::IAC,
                telnet::IAC, // literal 255 inside payload
                0,
                24,
                telnet::IAC,
                telnet::SE,
            ],
        );
        // NAWS handler stored the doubled byte as a single 255.
        assert_eq!((c.x_size, c.y_size), (255, 24));
        // The in-progress line survives the sub-negotiation.
        assert_eq!(&c.line[..c.curr], b"ab");
    }

    #[test]
    fn stray_iac_in_subneg_aborts() {
        let mut c = Connection::detached();
        feed(&mut c, &[telnet::IAC, telnet::SB, opt::NAWS, telnet::IAC, b'x']);
        assert_eq!(c.t_state, TelnetState::Normal);
        let out = String::from_utf8_lossy(&c.take_output()).into_owned();
        assert!(out.contains("Sub-negotiation aborted"), "{}", out);
    }
}
