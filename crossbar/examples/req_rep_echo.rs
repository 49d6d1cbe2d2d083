//! Minimal request/reply echo over a Unix datagram socket.
//!
//! Run with: `cargo run --example req_rep_echo`

use std::thread;

use crossbar::prelude::*;

fn main() -> Result<()> {
    let addr = format!(
        "unix://{}/crossbar-echo-{}.sock",
        std::env::temp_dir().display(),
        std::process::id()
    );

    let rep = RepSocket::new()?;
    rep.listen(&addr)?;

    let server = thread::spawn(move || -> Result<()> {
        for _ in 0..3 {
            let request = rep.recv()?;
            println!("server got: {}", String::from_utf8_lossy(request.payload()));
            rep.send(request.payload())?;
        }
        Ok(())
    });

    let req = ReqSocket::new()?;
    req.dial_and_wait(&addr)?;

    for text in ["one", "two", "three"] {
        req.send(text.as_bytes())?;
        let reply = req.recv()?;
        println!("client got: {}", String::from_utf8_lossy(reply.payload()));
    }

    server.join().expect("server thread panicked")?;
    Ok(())
}
