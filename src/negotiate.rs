//! RFC 1143 Q-method option negotiation, one state pair per option code.
//!
//! `us[c]` tracks what this server performs, `him[c]` what the peer
//! performs; the two machines are independent. Every transition is traced
//! to the client so a MUD client author can watch the negotiation unfold.

use crate::conn::{Connection, Mode, WriteFlags};
use crate::telnet::{self, opt, option_name, OptionState};

const IDENT_DESCRIPTION: &str = "A server to test clients' ability to speak telnet and ZMP";

impl Connection {
    fn send_verb(&mut self, verb: u8, c: u8, flags: WriteFlags) {
        let _ = self.write(&[telnet::IAC, verb, c], flags);
        let (verb_name, state) = match verb {
            telnet::WILL => ("WILL", self.us_state(c)),
            telnet::WONT => ("WONT", self.us_state(c)),
            telnet::DO => ("DO", self.him_state(c)),
            _ => ("DONT", self.him_state(c)),
        };
        let side = if verb == telnet::WILL || verb == telnet::WONT {
            "us_q"
        } else {
            "him_q"
        };
        self.trace(&format!(
            "SENT IAC {} {} ({}={})",
            verb_name,
            option_name(c),
            side,
            state.name()
        ));
    }

    /// Ask the peer to start performing option `c` (DO).
    pub fn enable_him(&mut self, c: u8) {
        let state = self.him_state(c);
        match state {
            OptionState::No => {
                self.him[c as usize] = OptionState::WantYesEmpty;
                self.send_verb(telnet::DO, c, WriteFlags::DO_FLUSH);
            }
            OptionState::Yes => self.entry_error(c, "enable", "already enabled", state),
            OptionState::WantNoEmpty => {
                self.him[c as usize] = OptionState::WantNoOpposite;
            }
            OptionState::WantNoOpposite => self.entry_error(c, "enable", "already queued", state),
            OptionState::WantYesEmpty => {
                self.entry_error(c, "enable", "already under negotiation", state)
            }
            OptionState::WantYesOpposite => {
                self.him[c as usize] = OptionState::WantYesEmpty;
            }
        }
    }

    /// Offer to perform option `c` ourselves (WILL).
    pub fn enable_us(&mut self, c: u8) {
        let state = self.us_state(c);
        match state {
            OptionState::No => {
                self.us[c as usize] = OptionState::WantYesEmpty;
                self.send_verb(telnet::WILL, c, WriteFlags::DO_FLUSH);
            }
            OptionState::Yes => self.entry_error(c, "enable", "already enabled", state),
            OptionState::WantNoEmpty => {
                self.us[c as usize] = OptionState::WantNoOpposite;
            }
            OptionState::WantNoOpposite => self.entry_error(c, "enable", "already queued", state),
            OptionState::WantYesEmpty => {
                self.entry_error(c, "enable", "already under negotiation", state)
            }
            OptionState::WantYesOpposite => {
                self.us[c as usize] = OptionState::WantYesEmpty;
            }
        }
    }

    /// Withdraw our side of option `c` (WONT).
    pub fn disable_us(&mut self, c: u8) {
        let state = self.us_state(c);
        match state {
            OptionState::No => self.entry_error(c, "disable", "already disabled", state),
            OptionState::Yes => {
                self.us[c as usize] = OptionState::WantNoEmpty;
                self.send_verb(telnet::WONT, c, WriteFlags::DO_FLUSH);
            }
            OptionState::WantNoEmpty => {
                self.entry_error(c, "disable", "already being negotiated", state)
            }
            OptionState::WantNoOpposite => {
                self.us[c as usize] = OptionState::WantNoEmpty;
            }
            OptionState::WantYesEmpty => {
                self.us[c as usize] = OptionState::WantYesOpposite;
            }
            OptionState::WantYesOpposite => self.entry_error(c, "disable", "already queued", state),
        }
    }

    fn entry_error(&mut self, c: u8, what: &str, why: &str, state: OptionState) {
        self.trace(&format!(
            "ERROR: trying to {} telnet option {} that is {}: {}",
            what,
            option_name(c),
            why,
            state.name()
        ));
    }

    pub(crate) fn recv_will(&mut self, c: u8) {
        let state = self.him_state(c);
        self.trace(&format!(
            "RCVD IAC WILL {} (him_q={})",
            option_name(c),
            state.name()
        ));
        match state {
            OptionState::No => {
                // Accept list for peer-initiated options.
                if c == opt::NAWS || c == opt::TTYPE {
                    self.him[c as usize] = OptionState::Yes;
                    self.send_verb(telnet::DO, c, WriteFlags::DO_FLUSH);
                    self.turned_on_him(c);
                } else {
                    self.send_verb(telnet::DONT, c, WriteFlags::DO_FLUSH);
                }
            }
            OptionState::Yes => {}
            OptionState::WantNoEmpty => {
                self.refusal_error("DONT", "WILL", c, "him_q", state);
                self.him[c as usize] = OptionState::No;
            }
            OptionState::WantNoOpposite => {
                self.refusal_error("DONT", "WILL", c, "him_q", state);
                self.him[c as usize] = OptionState::Yes;
                self.turned_on_him(c);
            }
            OptionState::WantYesEmpty => {
                self.him[c as usize] = OptionState::Yes;
                self.turned_on_him(c);
            }
            OptionState::WantYesOpposite => {
                self.him[c as usize] = OptionState::WantNoEmpty;
                self.send_verb(telnet::DONT, c, WriteFlags::DO_FLUSH);
            }
        }
    }

    pub(crate) fn recv_wont(&mut self, c: u8) {
        let state = self.him_state(c);
        self.trace(&format!(
            "RCVD IAC WONT {} (him_q={})",
            option_name(c),
            state.name()
        ));
        match state {
            OptionState::No => {}
            OptionState::Yes => {
                self.him[c as usize] = OptionState::No;
                self.send_verb(telnet::DONT, c, WriteFlags::DO_FLUSH);
            }
            OptionState::WantNoEmpty => self.him[c as usize] = OptionState::No,
            OptionState::WantNoOpposite => {
                self.him[c as usize] = OptionState::WantYesEmpty;
                self.send_verb(telnet::DO, c, WriteFlags::DO_FLUSH);
            }
            OptionState::WantYesEmpty => self.him[c as usize] = OptionState::No,
            OptionState::WantYesOpposite => self.him[c as usize] = OptionState::No,
        }
    }

    pub(crate) fn recv_do(&mut self, c: u8) {
        let state = self.us_state(c);
        self.trace(&format!(
            "RCVD IAC DO {} (us_q={})",
            option_name(c),
            state.name()
        ));
        match state {
            OptionState::No => {
                if self.turn_on_us(c) {
                    self.us[c as usize] = OptionState::Yes;
                    self.send_verb(telnet::WILL, c, WriteFlags::DO_FLUSH);
                } else {
                    self.send_verb(telnet::WONT, c, WriteFlags::DO_FLUSH);
                }
            }
            OptionState::Yes => {}
            OptionState::WantNoEmpty => {
                self.refusal_error("WONT", "DO", c, "us_q", state);
                self.us[c as usize] = OptionState::No;
            }
            OptionState::WantNoOpposite => {
                self.refusal_error("WONT", "DO", c, "us_q", state);
                self.us[c as usize] = OptionState::Yes;
                self.turn_on_us(c);
            }
            OptionState::WantYesEmpty => {
                self.us[c as usize] = OptionState::Yes;
                self.turn_on_us(c);
            }
            OptionState::WantYesOpposite => {
                self.us[c as usize] = OptionState::WantNoEmpty;
                self.send_verb(telnet::WONT, c, WriteFlags::DO_FLUSH);
            }
        }
    }

    pub(crate) fn recv_dont(&mut self, c: u8) {
        let state = self.us_state(c);
        self.trace(&format!(
            "RCVD IAC DONT {} (us_q={})",
            option_name(c),
            state.name()
        ));
        match state {
            OptionState::No => {}
            OptionState::Yes => {
                self.us[c as usize] = OptionState::No;
                self.turned_off_us(c);
                self.send_verb(telnet::WONT, c, WriteFlags::DO_FLUSH);
            }
            OptionState::WantNoEmpty => {
                self.us[c as usize] = OptionState::No;
                self.turned_off_us(c);
            }
            OptionState::WantNoOpposite => {
                self.us[c as usize] = OptionState::WantYesEmpty;
                self.send_verb(telnet::WILL, c, WriteFlags::DO_FLUSH);
            }
            OptionState::WantYesEmpty => {
                self.us[c as usize] = OptionState::No;
                self.turned_off_us(c);
            }
            OptionState::WantYesOpposite => {
                self.us[c as usize] = OptionState::No;
                self.turned_off_us(c);
            }
        }
    }

    fn refusal_error(&mut self, refused: &str, verb: &str, c: u8, side: &str, state: OptionState) {
        self.trace(&format!(
            "ERROR: {} answered by {} for telnet option {}. {}={}",
            refused,
            verb,
            option_name(c),
            side,
            state.name()
        ));
    }

    /// Local policy: do we agree to start performing option `c`?
    /// Side effects of an option coming alive happen here.
    fn turn_on_us(&mut self, c: u8) -> bool {
        match c {
            opt::ECHO | opt::SGA | opt::CHARSET => true,
            opt::EOR => {
                self.mode.insert(Mode::EOR_RECORDS);
                let _ = self.write(
                    &[telnet::IAC, telnet::EOR_CMD],
                    WriteFlags::DO_FLUSH,
                );
                self.trace("SENT IAC ENDOFRECORD");
                // The prompt already on the client's screen stands; it is
                // the client's job to keep showing it.
                true
            }
            #[cfg(feature = "mccp")]
            opt::COMPRESS2 => {
                if self.comp_active() {
                    self.trace("ERROR: RCVD IAC DO COMPRESSv2 while a stream is active");
                } else {
                    self.reset_comp_latch();
                    self.trace("preparing to turn on compression");
                }
                true
            }
            opt::ZMP => {
                self.send_zmp(&[
                    "zmp.ident",
                    "mudtest",
                    env!("CARGO_PKG_VERSION"),
                    IDENT_DESCRIPTION,
                ]);
                true
            }
            _ => false,
        }
    }

    fn turned_off_us(&mut self, c: u8) {
        if c == opt::EOR {
            self.mode.remove(Mode::EOR_RECORDS);
        }
    }

    /// The peer started performing option `c`.
    pub(crate) fn turned_on_him(&mut self, c: u8) {
        if c == opt::TTYPE {
            let _ = self.write(
                &[telnet::IAC, telnet::SB, opt::TTYPE, 1, telnet::IAC, telnet::SE],
                WriteFlags::DO_FLUSH,
            );
            self.trace("SENT IAC SB TERMINAL TYPE SEND IAC SE");
        }
    }
}
