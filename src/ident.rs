//! RFC 1413 ident lookup: connect back to the peer's ident service from
//! the address this server spoke to them on, and relay whatever it says.
//! Best effort and blocking; this is a diagnostic command, not a path
//! the reactor depends on.

use std::mem;

use crate::conn::{Connection, WriteFlags};

const IDENT_PORT: u16 = 113;

pub(crate) fn storage_port(addr: &libc::sockaddr_storage) -> u16 {
    match i32::from(addr.ss_family) {
        libc::AF_INET => {
            let v4 = unsafe { &*(addr as *const _ as *const libc::sockaddr_in) };
            u16::from_be(v4.sin_port)
        }
        libc::AF_INET6 => {
            let v6 = unsafe { &*(addr as *const _ as *const libc::sockaddr_in6) };
            u16::from_be(v6.sin6_port)
        }
        _ => 0,
    }
}

pub(crate) fn set_storage_port(addr: &mut libc::sockaddr_storage, port: u16) {
    match i32::from(addr.ss_family) {
        libc::AF_INET => {
            let v4 = unsafe { &mut *(addr as *mut _ as *mut libc::sockaddr_in) };
            v4.sin_port = port.to_be();
        }
        libc::AF_INET6 => {
            let v6 = unsafe { &mut *(addr as *mut _ as *mut libc::sockaddr_in6) };
            v6.sin6_port = port.to_be();
        }
        _ => {}
    }
}

fn report(conn: &mut Connection, msg: &str) {
    let _ = conn.write(msg.as_bytes(), WriteFlags::empty());
    let _ = conn.write(b"\r\n", WriteFlags::DO_FLUSH);
}

pub fn lookup(conn: &mut Connection) {
    let (peer, peer_len) = conn.peer_addr();
    let s = unsafe { libc::socket(i32::from(peer.ss_family), libc::SOCK_STREAM, 0) };
    if s < 0 {
        report(conn, "Failed to open a socket for the ident lookup");
        return;
    }

    let mut local: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut local_len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockname(
            conn.as_raw_fd(),
            &mut local as *mut _ as *mut libc::sockaddr,
            &mut local_len,
        )
    };
    if rc == -1 {
        unsafe { libc::close(s) };
        report(conn, "Failed to get the sockets address?");
        return;
    }
    let our_port = storage_port(&local);
    set_storage_port(&mut local, 0);
    let rc = unsafe {
        libc::bind(s, &local as *const _ as *const libc::sockaddr, local_len)
    };
    if rc == -1 {
        unsafe { libc::close(s) };
        report(conn, "Failed to bind to the server's IP number?");
        return;
    }

    let mut target = peer;
    set_storage_port(&mut target, IDENT_PORT);
    let rc = unsafe {
        libc::connect(s, &target as *const _ as *const libc::sockaddr, peer_len)
    };
    if rc == -1 {
        unsafe { libc::close(s) };
        report(conn, "Failed to connect to the ident port");
        return;
    }

    let query = format!("{}, {}\r\n", storage_port(&peer), our_port);
    unsafe {
        libc::write(s, query.as_ptr() as *const libc::c_void, query.len());
    }
    let mut buf = [0u8; 256];
    let len = unsafe { libc::read(s, buf.as_mut_ptr() as *mut libc::c_void, buf.len() - 1) };
    if len > 0 {
        let text = String::from_utf8_lossy(&buf[..len as usize]).into_owned();
        report(conn, &format!("Result: {}", text));
    } else {
        report(conn, "Failed to get any data from the peer's ident server");
    }
    unsafe { libc::close(s) };
}
