//! Topic-filtered publish/subscribe over UDP loopback.
//!
//! Run with: `cargo run --example pubsub_topics`

use std::time::Duration;

use crossbar::prelude::*;

fn main() -> Result<()> {
    let publisher = PublisherSocket::new()?;
    publisher.listen("ip://127.0.0.1:0")?;
    let addr = publisher
        .local_addr()
        .expect("listener has an address")
        .to_string();

    let weather = SubscriberSocket::new()?;
    weather.subscribe(b"weather.")?;
    weather.dial_and_wait(&addr)?;

    // Wait for the subscriber's presence to reach the publisher.
    while publisher.peer_count() == 0 {
        std::thread::sleep(Duration::from_millis(10));
    }

    publisher.send(b"weather.london cloudy")?;
    publisher.send(b"sports.football 2-1")?;
    publisher.send(b"weather.oslo snow")?;

    for _ in 0..2 {
        let msg = weather.recv_timeout(Duration::from_secs(2))?;
        println!("weather update: {}", String::from_utf8_lossy(msg.payload()));
    }

    // The sports item never matched the filter.
    assert!(weather.recv_timeout(Duration::from_millis(200)).is_err());
    Ok(())
}
