//! MCCPv2 end-to-end: activation marker, deflate stream, stopmccp finish.
#![cfg(feature = "mccp")]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use flate2::{Decompress, FlushDecompress, Status};
use mudtest::server::{Server, ServerEvent};
use mudtest::shell;
use mudtest::telnet::{opt, DO, IAC, SB, SE};

fn start() -> (Server, TcpStream) {
    let mut server = Server::new(0).unwrap();
    let stream = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let mut connected = false;
    for _ in 0..50 {
        for ev in server.poll(10).unwrap() {
            if let ServerEvent::Connected(id) = ev {
                shell::greet(&mut server, id);
                connected = true;
            }
        }
        if connected {
            break;
        }
    }
    assert!(connected);
    (server, stream)
}

fn pump(server: &mut Server, cycles: usize) {
    for _ in 0..cycles {
        let events = server.poll(10).unwrap();
        for ev in events {
            match ev {
                ServerEvent::Connected(id) => shell::greet(server, id),
                ServerEvent::Line(id, line) => shell::dispatch(server, id, &line),
                ServerEvent::Disconnected(..) => {}
            }
        }
    }
}

fn read_avail(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    out
}

/// Client-side view of an MCCP stream: plain bytes until the start
/// marker, inflated bytes afterwards, plain again once the stream ends.
struct MccpReader {
    inflater: Option<Decompress>,
    plain: Vec<u8>,
    inflated: Vec<u8>,
    after_stream: Vec<u8>,
    ended: bool,
}

impl MccpReader {
    fn new() -> Self {
        MccpReader {
            inflater: None,
            plain: Vec::new(),
            inflated: Vec::new(),
            after_stream: Vec::new(),
            ended: false,
        }
    }

    fn feed(&mut self, mut data: &[u8]) {
        const MARKER: [u8; 5] = [IAC, SB, opt::COMPRESS2, IAC, SE];
        while !data.is_empty() {
            if self.ended {
                self.after_stream.extend_from_slice(data);
                return;
            }
            match &mut self.inflater {
                None => {
                    if let Some(pos) = data.windows(5).position(|w| w == MARKER) {
                        self.plain.extend_from_slice(&data[..pos]);
                        self.inflater = Some(Decompress::new(true));
                        data = &data[pos + 5..];
                    } else {
                        self.plain.extend_from_slice(data);
                        return;
                    }
                }
                Some(z) => {
                    let mut out = [0u8; 16384];
                    let before_in = z.total_in();
                    let before_out = z.total_out();
                    let status = z
                        .decompress(data, &mut out, FlushDecompress::None)
                        .expect("inflate failed");
                    let used = (z.total_in() - before_in) as usize;
                    let produced = (z.total_out() - before_out) as usize;
                    self.inflated.extend_from_slice(&out[..produced]);
                    data = &data[used..];
                    if status == Status::StreamEnd {
                        self.ended = true;
                        self.inflater = None;
                    } else if used == 0 && produced == 0 {
                        return;
                    }
                }
            }
        }
    }
}

#[test]
fn do_compress2_starts_a_deflate_stream() {
    let (mut server, mut stream) = start();
    let mut reader = MccpReader::new();
    reader.feed(&read_avail(&mut stream));

    stream.write_all(&[IAC, DO, opt::COMPRESS2]).unwrap();
    pump(&mut server, 5);
    reader.feed(&read_avail(&mut stream));

    assert!(reader.inflater.is_some(), "no start marker seen");
    // The trace of the marker itself is the first compressed payload.
    let text = String::from_utf8_lossy(&reader.inflated).into_owned();
    assert!(
        text.contains("SENT IAC SB COMPRESSv2 IAC SE"),
        "inflated: {}",
        text
    );

    // Everything the shell produces from here on arrives compressed.
    stream.write_all(b"sendasis compressed hello\r\n").unwrap();
    pump(&mut server, 5);
    reader.feed(&read_avail(&mut stream));
    let text = String::from_utf8_lossy(&reader.inflated).into_owned();
    assert!(text.contains("compressed hello"), "inflated: {}", text);
}

#[test]
fn stopmccp_finishes_stream_and_reports_statistics() {
    let (mut server, mut stream) = start();
    let mut reader = MccpReader::new();
    reader.feed(&read_avail(&mut stream));

    stream.write_all(&[IAC, DO, opt::COMPRESS2]).unwrap();
    pump(&mut server, 5);
    reader.feed(&read_avail(&mut stream));
    assert!(reader.inflater.is_some());

    stream.write_all(b"stopmccp\r\n").unwrap();
    pump(&mut server, 5);
    reader.feed(&read_avail(&mut stream));

    assert!(reader.ended, "deflate stream did not finish");
    let compressed_text = String::from_utf8_lossy(&reader.inflated).into_owned();
    assert!(
        compressed_text.contains("Stopping MCCP"),
        "inflated: {}",
        compressed_text
    );
    // Statistics and the next prompt arrive uncompressed.
    let tail = String::from_utf8_lossy(&reader.after_stream).into_owned();
    assert!(tail.contains("CompStatistics: in:"), "tail: {}", tail);
    assert!(tail.contains("> "), "tail: {}", tail);

    // Once finished, new output stays plain until renegotiation.
    stream.write_all(b"sendasis after stop\r\n").unwrap();
    pump(&mut server, 5);
    reader.feed(&read_avail(&mut stream));
    let tail = String::from_utf8_lossy(&reader.after_stream).into_owned();
    assert!(tail.contains("after stop"), "tail: {}", tail);
}
