//! Telnet protocol constants and shared state types.

use std::borrow::Cow;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const GA: u8 = 249;
pub const EL: u8 = 248;
pub const EC: u8 = 247;
pub const AYT: u8 = 246;
pub const AO: u8 = 245;
pub const IP: u8 = 244;
pub const BREAK: u8 = 243;
pub const DM: u8 = 242;
pub const NOP: u8 = 241;
pub const SE: u8 = 240;
pub const EOR_CMD: u8 = 239;
pub const ABORT: u8 = 238;
pub const SUSPEND: u8 = 237;

pub mod opt {
    pub const BINARY: u8 = 0;
    pub const ECHO: u8 = 1;
    pub const SGA: u8 = 3;
    pub const STATUS: u8 = 5;
    pub const TIMING_MARK: u8 = 6;
    pub const TTYPE: u8 = 24;
    pub const EOR: u8 = 25;
    pub const NAWS: u8 = 31;
    pub const LINEMODE: u8 = 34;
    pub const CHARSET: u8 = 42;
    pub const START_TLS: u8 = 46;
    pub const COMPRESS2: u8 = 86;
    pub const MSP: u8 = 90;
    pub const MXP: u8 = 91;
    pub const ZMP: u8 = 93;
    pub const MPLEX: u8 = 112;
    pub const EXTOP: u8 = 255;
}

pub mod charset {
    pub const REQUEST: u8 = 1;
    pub const ACCEPTED: u8 = 2;
    pub const REJECTED: u8 = 3;
    pub const TTABLE_IS: u8 = 4;
    pub const TTABLE_REJECTED: u8 = 5;
    pub const TTABLE_ACK: u8 = 6;
    pub const TTABLE_NAK: u8 = 7;
}

/// Human-readable option name for trace lines, per the IANA registry.
/// Codes without an assigned name render as decimal.
pub fn option_name(c: u8) -> Cow<'static, str> {
    let name = match c {
        opt::BINARY => "BINARY TRANSMISSION",
        opt::ECHO => "ECHO",
        2 => "RECONNECTION",
        opt::SGA => "SGA",
        4 => "APPROX MESSAGE SIZE NEGOTIATION",
        opt::STATUS => "STATUS",
        opt::TIMING_MARK => "TIMING MARK",
        7 => "RCTE",
        8 => "OUTPUT LINE WIDTH",
        9 => "OUTPUT PAGE SIZE",
        10 => "OUTPUT CR DISPOSITION",
        17 => "EXTENDED ASCII",
        18 => "LOGOUT",
        19 => "BYTE MACRO",
        20 => "DATA ENTRY TERMINAL",
        21 => "SUPDUP",
        22 => "SUPDUP OUTPUT",
        23 => "SEND LOCATION",
        opt::TTYPE => "TERMINAL TYPE",
        opt::EOR => "END OF RECORD",
        opt::NAWS => "NAWS",
        32 => "TS",
        opt::LINEMODE => "LINEMODE",
        36 => "ENVIR-OLD",
        37 => "AUTH",
        39 => "ENVIR",
        opt::CHARSET => "CHARSET",
        opt::START_TLS => "START_TLS",
        opt::COMPRESS2 => "COMPRESSv2",
        opt::MSP => "MSP",
        opt::MXP => "MXP",
        opt::ZMP => "ZMP",
        opt::MPLEX => "MPLEX",
        opt::EXTOP => "EXTOP",
        other => return Cow::Owned(format!("{}", other)),
    };
    Cow::Borrowed(name)
}

/// RFC 1143 Q-method per-option state, one per direction per option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionState {
    #[default]
    No,
    Yes,
    WantYesEmpty,
    WantNoEmpty,
    WantYesOpposite,
    WantNoOpposite,
}

impl OptionState {
    pub fn name(self) -> &'static str {
        match self {
            OptionState::No => "NO",
            OptionState::Yes => "YES",
            OptionState::WantYesEmpty => "WANTYES_EMPTY",
            OptionState::WantNoEmpty => "WANTNO_EMPTY",
            OptionState::WantYesOpposite => "WANTYES_OPPOSITE",
            OptionState::WantNoOpposite => "WANTNO_OPPOSITE",
        }
    }
}

/// Inbound byte-parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelnetState {
    #[default]
    Normal,
    Iac,
    Will,
    Wont,
    Do,
    Dont,
    Sb,
    SbIac,
}

/// Line-terminator follow state, kept apart from the Telnet machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrlfState {
    #[default]
    Normal,
    AfterCr,
    AfterLf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_options() {
        assert_eq!(option_name(opt::ECHO), "ECHO");
        assert_eq!(option_name(opt::COMPRESS2), "COMPRESSv2");
        assert_eq!(option_name(opt::EXTOP), "EXTOP");
    }

    #[test]
    fn unnamed_options_render_decimal() {
        assert_eq!(option_name(77), "77");
        assert_eq!(option_name(200), "200");
    }

    #[test]
    fn corrected_registry_entries() {
        assert_eq!(option_name(7), "RCTE");
        assert_eq!(option_name(8), "OUTPUT LINE WIDTH");
    }

    #[test]
    fn default_states() {
        assert_eq!(OptionState::default(), OptionState::No);
        assert_eq!(TelnetState::default(), TelnetState::Normal);
        assert_eq!(CrlfState::default(), CrlfState::Normal);
    }
}
