use std::process;

use mudtest::server::{Server, ServerEvent, DEFAULT_PORT};
use mudtest::shell;

fn main() {
    // A dead client must not take the whole server down on write.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    let port = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let mut server = match Server::new(port) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Could not open the server port: {}", e);
            process::exit(1);
        }
    };
    println!("The server is now listening on port {}", server.port());

    loop {
        let events = match server.poll(60_000) {
            Ok(events) => events,
            Err(e) => {
                eprintln!("poll failed: {}", e);
                process::exit(1);
            }
        };
        for ev in events {
            match ev {
                ServerEvent::Connected(id) => {
                    if let Some(conn) = server.client(id) {
                        println!("{} connected (client {})", conn.peer_name(), id);
                    }
                    shell::greet(&mut server, id);
                }
                ServerEvent::Line(id, line) => shell::dispatch(&mut server, id, &line),
                ServerEvent::Disconnected(id, peer) => {
                    println!("{} disconnected (client {})", peer, id);
                }
            }
        }
    }
}
