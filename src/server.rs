//! The reactor: one listening socket, a bounded client registry, and a
//! poll-driven cycle that turns socket readiness into accepted clients,
//! completed input lines and drained output queues.

use std::io;
use std::mem;
use std::os::fd::RawFd;

use crate::conn::{Connection, Mode, LINELEN};
use crate::telnet::opt;

/// Max number of simultaneous connections.
pub const MAX_FD: usize = 10;

pub const DEFAULT_PORT: u16 = 5445;

pub type ClientId = usize;

#[derive(Debug, PartialEq, Eq)]
pub enum ServerEvent {
    Connected(ClientId),
    /// A complete input line, terminator stripped.
    Line(ClientId, Vec<u8>),
    /// Carries the peer's printable address; the slot is already free.
    Disconnected(ClientId, String),
}

pub struct Server {
    listen_fd: RawFd,
    port: u16,
    clients: Vec<Option<Connection>>,
}

fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

impl Server {
    /// Bind and listen. Port 0 lets the OS pick one; `port()` reports it.
    pub fn new(port: u16) -> io::Result<Server> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let on: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &on as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_port = u16::to_be(port);
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        if unsafe { libc::listen(fd, 5) } < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        set_nonblocking(fd);

        let mut bound: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockname(fd, &mut bound as *mut _ as *mut libc::sockaddr, &mut len)
        };
        let port = if rc == 0 { u16::from_be(bound.sin_port) } else { port };

        let mut clients = Vec::with_capacity(MAX_FD);
        clients.resize_with(MAX_FD, || None);
        Ok(Server {
            listen_fd: fd,
            port,
            clients,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&self, id: ClientId) -> Option<&Connection> {
        self.clients.get(id).and_then(Option::as_ref)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Connection> {
        self.clients.get_mut(id).and_then(Option::as_mut)
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        (0..self.clients.len())
            .filter(|&i| self.clients[i].is_some())
            .collect()
    }

    /// Tear a client down immediately, releasing its socket and buffers.
    pub fn close(&mut self, id: ClientId) -> Option<String> {
        self.clients
            .get_mut(id)
            .and_then(Option::take)
            .map(|conn| conn.peer_name())
    }

    /// One reactor cycle: wait for readiness, accept at most one new
    /// client, turn readable clients into at most one line each, drain
    /// writable queues, and reap the dead.
    pub fn poll(&mut self, timeout_ms: i32) -> io::Result<Vec<ServerEvent>> {
        let mut events = Vec::new();
        self.reap(&mut events);

        let mut pfds = vec![libc::pollfd {
            fd: self.listen_fd,
            events: libc::POLLIN,
            revents: 0,
        }];
        let mut slots = vec![usize::MAX];
        for (slot, conn) in self.clients.iter().enumerate() {
            if let Some(conn) = conn {
                let mut interest = libc::POLLIN;
                if conn.wants_write() {
                    interest |= libc::POLLOUT;
                }
                pfds.push(libc::pollfd {
                    fd: conn.as_raw_fd(),
                    events: interest,
                    revents: 0,
                });
                slots.push(slot);
            }
        }

        let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(events);
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(events);
        }

        if pfds[0].revents & libc::POLLIN != 0 {
            if let Some(id) = self.accept() {
                events.push(ServerEvent::Connected(id));
            }
        }

        for (pfd, &slot) in pfds.iter().zip(&slots).skip(1) {
            if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                if let Some(line) = self.read_client(slot) {
                    events.push(ServerEvent::Line(slot, line));
                }
            }
            if pfd.revents & libc::POLLOUT != 0 {
                if let Some(conn) = self.client_mut(slot) {
                    conn.drain();
                }
            }
        }

        self.reap(&mut events);
        Ok(events)
    }

    /// Accept one pending connection. A full registry closes it on the
    /// doorstep; otherwise the initial option offers go out in order.
    fn accept(&mut self) -> Option<ClientId> {
        let mut addr: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let fd = unsafe {
            libc::accept(
                self.listen_fd,
                &mut addr as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if fd < 0 {
            return None;
        }
        let Some(slot) = self.clients.iter().position(Option::is_none) else {
            unsafe { libc::close(fd) };
            return None;
        };
        set_nonblocking(fd);
        let mut conn = Connection::new(fd, addr, len);
        conn.enable_us(opt::CHARSET);
        conn.enable_us(opt::EOR);
        conn.enable_him(opt::NAWS);
        conn.enable_him(opt::TTYPE);
        conn.enable_us(opt::ZMP);
        #[cfg(feature = "mccp")]
        conn.enable_us(opt::COMPRESS2);
        self.clients[slot] = Some(conn);
        Some(slot)
    }

    /// Peek what the line has room for, parse until a line completes, and
    /// consume only what was parsed; the rest stays in the kernel buffer
    /// for the next cycle.
    fn read_client(&mut self, id: ClientId) -> Option<Vec<u8>> {
        let conn = self.clients.get_mut(id)?.as_mut()?;
        let room = (LINELEN - conn.curr).max(1);
        let mut buf = [0u8; LINELEN + 16];
        let buf = &mut buf[..room.min(LINELEN + 16)];
        let n = unsafe {
            libc::recv(
                conn.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_PEEK,
            )
        };
        if n == 0 {
            conn.mode.insert(Mode::QUITTING);
            return None;
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock && err.kind() != io::ErrorKind::Interrupted {
                conn.mode.insert(Mode::QUITTING);
            }
            return None;
        }
        let n = n as usize;
        let mut line = None;
        let mut used = n;
        for i in 0..n {
            if let Some(done) = conn.process_byte(buf[i]) {
                line = Some(done);
                used = i + 1;
                break;
            }
        }
        unsafe {
            libc::recv(
                conn.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                used,
                0,
            );
        }
        line
    }

    fn reap(&mut self, events: &mut Vec<ServerEvent>) {
        for id in 0..self.clients.len() {
            let quitting = self.clients[id]
                .as_ref()
                .is_some_and(|c| c.mode.contains(Mode::QUITTING));
            if quitting {
                if let Some(peer) = self.close(id) {
                    events.push(ServerEvent::Disconnected(id, peer));
                }
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.listen_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn connect(server: &mut Server) -> (TcpStream, ClientId) {
        let stream = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut id = None;
        for _ in 0..50 {
            for ev in server.poll(10).unwrap() {
                if let ServerEvent::Connected(cid) = ev {
                    id = Some(cid);
                }
            }
            if id.is_some() {
                break;
            }
        }
        (stream, id.expect("no Connected event"))
    }

    /// Negotiation verbs interleave with their trace lines; pull the
    /// IAC triplets back out (trace text is plain ASCII, never 0xFF).
    fn negotiations(data: &[u8]) -> Vec<(u8, u8)> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if data[i] == crate::telnet::IAC && i + 2 < data.len() {
                out.push((data[i + 1], data[i + 2]));
                i += 3;
            } else {
                i += 1;
            }
        }
        out
    }

    #[test]
    fn accept_emits_offer_burst() {
        let mut server = Server::new(0).unwrap();
        let (mut stream, _id) = connect(&mut server);
        use crate::telnet::{DO, WILL};
        let mut expect = vec![
            (WILL, opt::CHARSET),
            (WILL, opt::EOR),
            (DO, opt::NAWS),
            (DO, opt::TTYPE),
            (WILL, opt::ZMP),
        ];
        #[cfg(feature = "mccp")]
        expect.push((WILL, opt::COMPRESS2));
        let mut got = Vec::new();
        let mut buf = [0u8; 1024];
        for _ in 0..20 {
            server.poll(5).unwrap();
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => got.extend_from_slice(&buf[..n]),
                Err(_) => break,
            }
            if negotiations(&got).len() >= expect.len() {
                break;
            }
        }
        assert_eq!(negotiations(&got), expect);
    }

    #[test]
    fn line_event_consumes_only_one_line() {
        let mut server = Server::new(0).unwrap();
        let (mut stream, id) = connect(&mut server);
        stream.write_all(b"first\r\nsecond\r\n").unwrap();
        let mut lines = Vec::new();
        for _ in 0..50 {
            for ev in server.poll(10).unwrap() {
                if let ServerEvent::Line(cid, line) = ev {
                    assert_eq!(cid, id);
                    lines.push(line);
                }
            }
            if lines.len() == 2 {
                break;
            }
        }
        assert_eq!(lines, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn eof_reaps_client() {
        let mut server = Server::new(0).unwrap();
        let (stream, id) = connect(&mut server);
        drop(stream);
        let mut disconnected = false;
        for _ in 0..50 {
            for ev in server.poll(10).unwrap() {
                if let ServerEvent::Disconnected(cid, _) = ev {
                    assert_eq!(cid, id);
                    disconnected = true;
                }
            }
            if disconnected {
                break;
            }
        }
        assert!(disconnected);
        assert!(server.client(id).is_none());
    }

    #[test]
    fn registry_full_closes_new_connections() {
        let mut server = Server::new(0).unwrap();
        let mut held = Vec::new();
        for _ in 0..MAX_FD {
            held.push(connect(&mut server));
        }
        assert_eq!(server.client_ids().len(), MAX_FD);
        // One more gets the door.
        let mut extra = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        extra
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        for _ in 0..10 {
            server.poll(10).unwrap();
        }
        let mut buf = [0u8; 16];
        // Closed without any negotiation: EOF.
        let n = extra.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(server.client_ids().len(), MAX_FD);
    }
}
