use std::time::Duration;

use squall::Client;

fn main() {
    tracing_subscriber::fmt::init();

    // A direct client sends each metric as its own datagram and reports
    // transport errors to the caller.
    let client = Client::udp("127.0.0.1:8125").expect("failed to build client");

    client.incr("example.counter").expect("failed to send metric");
    client.gauge("example.gauge", 5.0).expect("failed to send metric");
    client.time("example.timer", Duration::from_millis(32)).expect("failed to send metric");
    client.set("example.set", "visitor-1").expect("failed to send metric");
}
