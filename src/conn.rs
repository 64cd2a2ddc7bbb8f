//! Per-client connection state and the single outbound write path.
//!
//! Every byte leaving the server for a client goes through
//! [`Connection::write`]: it decides between the compressor, the output
//! queue and a direct nonblocking send, and performs the deferred
//! COMPRESS2 start/stop transitions after a fully successful send.

use std::collections::HashMap;
use std::ffi::CStr;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;

use bitflags::bitflags;

#[cfg(feature = "mccp")]
use crate::compress::{Compressor, Flush, Outcome};
use crate::queue::{OutputQueue, DROP_AT};
use crate::telnet::{self, opt, CrlfState, OptionState, TelnetState};

/// Maximum length of a received line.
pub const LINELEN: usize = 256;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u16 {
        /// The client disconnected or earned disconnection.
        const QUITTING = 1;
        /// Prompts are terminated with IAC EOR.
        const EOR_RECORDS = 4;
        /// Password entry: claim to echo but stay silent.
        const INVISIBLE = 64;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WriteFlags: u16 {
        /// Bypass an active compression stream.
        const DONT_COMPRESS = 16;
        /// Flush compression buffers after this message.
        const DO_FLUSH = 32;
        /// End the compression stream after this message.
        const FINISH = 64;
    }
}

pub struct Connection {
    fd: RawFd,
    peer: libc::sockaddr_storage,
    peer_len: libc::socklen_t,

    pub(crate) t_state: TelnetState,
    pub(crate) c_state: CrlfState,
    pub(crate) line: [u8; LINELEN],
    pub(crate) curr: usize,
    /// Write cursor for sub-negotiation payload, `>= curr` while one is open.
    pub(crate) telnet_position: usize,

    pub mode: Mode,
    pub x_size: u16,
    pub y_size: u16,

    pub(crate) us: [OptionState; 256],
    pub(crate) him: [OptionState; 256],

    queue: OutputQueue,
    wants_write: bool,

    #[cfg(feature = "mccp")]
    comp: Option<Compressor>,
    /// Set once a stream has been finalized (or died); cleared when
    /// COMPRESS2 is negotiated on again.
    #[cfg(feature = "mccp")]
    comp_finished: bool,

    vars: HashMap<String, String>,
}

impl Connection {
    pub fn new(fd: RawFd, peer: libc::sockaddr_storage, peer_len: libc::socklen_t) -> Self {
        Connection {
            fd,
            peer,
            peer_len,
            t_state: TelnetState::Normal,
            c_state: CrlfState::Normal,
            line: [0; LINELEN],
            curr: 0,
            telnet_position: 0,
            mode: Mode::empty(),
            x_size: 0,
            y_size: 0,
            us: [OptionState::No; 256],
            him: [OptionState::No; 256],
            queue: OutputQueue::new(),
            wants_write: false,
            #[cfg(feature = "mccp")]
            comp: None,
            #[cfg(feature = "mccp")]
            comp_finished: false,
            vars: HashMap::new(),
        }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn peer_addr(&self) -> (libc::sockaddr_storage, libc::socklen_t) {
        (self.peer, self.peer_len)
    }

    /// Numeric peer address for operator log lines.
    pub fn peer_name(&self) -> String {
        let mut host = [0 as libc::c_char; 100];
        let rc = unsafe {
            libc::getnameinfo(
                &self.peer as *const _ as *const libc::sockaddr,
                self.peer_len,
                host.as_mut_ptr(),
                host.len() as libc::socklen_t,
                ptr::null_mut(),
                0,
                libc::NI_NUMERICHOST,
            )
        };
        if rc == 0 {
            unsafe { CStr::from_ptr(host.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        } else {
            "unknown".to_string()
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn wants_write(&self) -> bool {
        self.wants_write
    }

    pub fn us_state(&self, c: u8) -> OptionState {
        self.us[c as usize]
    }

    pub fn him_state(&self, c: u8) -> OptionState {
        self.him[c as usize]
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    pub fn remove_var(&mut self, key: &str) {
        self.vars.remove(key);
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[cfg(feature = "mccp")]
    pub(crate) fn comp_active(&self) -> bool {
        self.comp.is_some()
    }

    /// Re-arm compression after a fresh COMPRESS2 negotiation.
    #[cfg(feature = "mccp")]
    pub(crate) fn reset_comp_latch(&mut self) {
        self.comp_finished = false;
    }

    pub(crate) fn should_echo(&self) -> bool {
        self.us[opt::ECHO as usize] == OptionState::Yes && !self.mode.contains(Mode::INVISIBLE)
    }

    fn debug_enabled(&self) -> bool {
        !self.vars.contains_key("nodebug")
    }

    /// One-line protocol trace toward the client, gated by `nodebug`.
    pub fn trace(&mut self, msg: &str) {
        if self.debug_enabled() {
            let _ = self.write(msg.as_bytes(), WriteFlags::empty());
            let _ = self.write(b"\r\n", WriteFlags::empty());
        }
    }

    /// Prompt with EOR record marker or in-progress line redisplay,
    /// depending on the echo state.
    pub fn prompt(&mut self, p: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(p.len() + self.curr + 2);
        buf.extend_from_slice(p);
        if self.should_echo() {
            buf.extend_from_slice(&self.line[..self.curr]);
        } else if self.mode.contains(Mode::EOR_RECORDS) {
            buf.push(telnet::IAC);
            buf.push(telnet::EOR_CMD);
        }
        self.write(&buf, WriteFlags::DO_FLUSH)
    }

    /// Enter password mode: claim the echo option but never echo.
    pub fn invisible(&mut self) {
        self.mode.insert(Mode::INVISIBLE);
        if self.us[opt::ECHO as usize] != OptionState::Yes {
            self.enable_us(opt::ECHO);
        }
    }

    pub fn visible(&mut self) {
        self.mode.remove(Mode::INVISIBLE);
        if self.us[opt::ECHO as usize] == OptionState::Yes {
            self.disable_us(opt::ECHO);
        }
    }

    /// The single outbound entry point. Callers never touch the queue.
    pub fn write(&mut self, data: &[u8], flags: WriteFlags) -> io::Result<()> {
        #[cfg(feature = "mccp")]
        if self.comp.is_some() && !flags.contains(WriteFlags::DONT_COMPRESS) {
            return self.write_compressed(data, flags);
        }
        self.write_plain(data, flags)
    }

    /// Queue-or-send path; never enters the compressor.
    fn write_plain(&mut self, data: &[u8], flags: WriteFlags) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if !self.queue.is_empty() {
            return self.enqueue(data);
        }
        let mut rest = data;
        while !rest.is_empty() {
            let n = unsafe {
                libc::send(
                    self.fd,
                    rest.as_ptr() as *const libc::c_void,
                    rest.len(),
                    0,
                )
            };
            if n > 0 {
                rest = &rest[n as usize..];
            } else {
                // Would block, or the socket is sick; park the remainder
                // and let the drain path decide on the next cycle.
                self.wants_write = true;
                return self.enqueue(rest);
            }
        }
        #[cfg(feature = "mccp")]
        self.after_direct_send(flags)?;
        #[cfg(not(feature = "mccp"))]
        let _ = flags;
        Ok(())
    }

    fn enqueue(&mut self, data: &[u8]) -> io::Result<()> {
        if self.queue.len() + data.len() > DROP_AT {
            // Way too much buffered output; the client has to go.
            self.mode.insert(Mode::QUITTING);
            self.wants_write = true;
            return Err(io::Error::other("output backlog exceeded"));
        }
        self.queue.push(data);
        Ok(())
    }

    /// Deferred COMPRESS2 transitions, evaluated once the wire is caught up.
    #[cfg(feature = "mccp")]
    fn after_direct_send(&mut self, flags: WriteFlags) -> io::Result<()> {
        if flags.contains(WriteFlags::DONT_COMPRESS) {
            return Ok(());
        }
        if self.us[opt::COMPRESS2 as usize] == OptionState::Yes
            && self.comp.is_none()
            && !self.comp_finished
        {
            // The start marker itself is the last uncompressed byte run.
            self.write_plain(
                &[telnet::IAC, telnet::SB, opt::COMPRESS2, telnet::IAC, telnet::SE],
                WriteFlags::DONT_COMPRESS,
            )?;
            self.comp = Some(Compressor::new());
            self.trace("SENT IAC SB COMPRESSv2 IAC SE");
        } else if self.us[opt::COMPRESS2 as usize] == OptionState::No && self.comp.is_some() {
            self.write(
                b"Turning off COMPRESSv2\r\n",
                WriteFlags::FINISH | WriteFlags::DO_FLUSH,
            )?;
        }
        Ok(())
    }

    #[cfg(feature = "mccp")]
    fn write_compressed(&mut self, data: &[u8], flags: WriteFlags) -> io::Result<()> {
        let flush = if flags.contains(WriteFlags::FINISH) {
            Flush::Finish
        } else if flags.contains(WriteFlags::DO_FLUSH) {
            Flush::Sync
        } else {
            Flush::None
        };
        let Some(mut comp) = self.comp.take() else {
            return self.write_plain(data, flags);
        };
        let fed = comp.feed(data, flush, |chunk| {
            self.write_plain(chunk, WriteFlags::DONT_COMPRESS)
        });
        match fed {
            Ok(Outcome::Active) => {
                self.comp = Some(comp);
                Ok(())
            }
            Ok(Outcome::Finished) => {
                self.comp_finished = true;
                let total_in = comp.total_in();
                let total_out = comp.total_out();
                let ratio = 100.0 * total_out as f64 / total_in.max(1) as f64;
                let stats = format!(
                    "CompStatistics: in: {}, out {} {:.1}%\r\n",
                    total_in, total_out, ratio
                );
                self.write_plain(stats.as_bytes(), WriteFlags::empty())
            }
            Err(e) => {
                // Stream is dead; bytes in flight are lost but the
                // connection lives on uncompressed.
                eprintln!("deflate stream failed: {}", e);
                self.comp_finished = true;
                Ok(())
            }
        }
    }

    /// Drain one burst of queued output after the socket reported writable.
    /// Returns false when the socket failed and the client must go.
    pub(crate) fn drain(&mut self) -> bool {
        let Some(head) = self.queue.head() else {
            self.wants_write = false;
            return true;
        };
        let n = unsafe {
            libc::send(self.fd, head.as_ptr() as *const libc::c_void, head.len(), 0)
        };
        if n <= 0 {
            self.mode.insert(Mode::QUITTING);
            return false;
        }
        self.queue.consume(n as usize);
        if self.queue.is_empty() {
            self.wants_write = false;
        }
        true
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::shutdown(self.fd, libc::SHUT_RDWR);
                libc::close(self.fd);
            }
        }
    }
}

/// Zeroed family-agnostic address storage.
pub fn empty_addr() -> (libc::sockaddr_storage, libc::socklen_t) {
    (unsafe { mem::zeroed() }, 0)
}

#[cfg(test)]
impl Connection {
    /// A connection without a socket: direct sends fail, so every write
    /// lands in the queue where tests can read it back.
    pub(crate) fn detached() -> Connection {
        let (addr, len) = empty_addr();
        Connection::new(-1, addr, len)
    }

    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(head) = self.queue.head() {
            let n = head.len();
            out.extend_from_slice(head);
            self.queue.consume(n);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_queue_when_socket_is_dead() {
        let mut c = Connection::detached();
        c.write(b"abc", WriteFlags::empty()).unwrap();
        c.write(b"def", WriteFlags::empty()).unwrap();
        assert_eq!(c.queued(), 6);
        assert!(c.wants_write());
        assert_eq!(c.take_output(), b"abcdef");
    }

    #[test]
    fn backlog_breach_marks_quitting() {
        let mut c = Connection::detached();
        c.write(&vec![b'x'; DROP_AT], WriteFlags::empty()).unwrap();
        assert!(!c.mode.contains(Mode::QUITTING));
        assert!(c.write(b"one more byte", WriteFlags::empty()).is_err());
        assert!(c.mode.contains(Mode::QUITTING));
        // The breaching bytes were refused, the ledger stays accurate.
        assert_eq!(c.queued(), DROP_AT);
    }

    #[test]
    fn trace_respects_nodebug() {
        let mut c = Connection::detached();
        c.trace("RCVD IAC NOP");
        assert_eq!(c.take_output(), b"RCVD IAC NOP\r\n");
        c.set_var("nodebug", "1");
        c.trace("RCVD IAC NOP");
        assert!(c.take_output().is_empty());
        c.remove_var("nodebug");
        c.trace("RCVD IAC NOP");
        assert_eq!(c.take_output(), b"RCVD IAC NOP\r\n");
    }

    #[test]
    fn prompt_appends_eor_record_marker() {
        let mut c = Connection::detached();
        c.mode.insert(Mode::EOR_RECORDS);
        c.prompt(b"> ").unwrap();
        assert_eq!(c.take_output(), [b'>', b' ', telnet::IAC, telnet::EOR_CMD]);
    }

    #[test]
    fn prompt_redisplays_pending_line_when_echoing() {
        let mut c = Connection::detached();
        c.us[opt::ECHO as usize] = OptionState::Yes;
        c.line[..3].copy_from_slice(b"abc");
        c.curr = 3;
        c.prompt(b"> ").unwrap();
        assert_eq!(c.take_output(), b"> abc");
    }

    #[test]
    fn invisible_suppresses_echo_flag() {
        let mut c = Connection::detached();
        c.us[opt::ECHO as usize] = OptionState::Yes;
        assert!(c.should_echo());
        c.mode.insert(Mode::INVISIBLE);
        assert!(!c.should_echo());
    }
}
