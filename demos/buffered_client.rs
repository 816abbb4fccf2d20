use std::time::Duration;

use squall::ClientBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let client = ClientBuilder::default()
        .with_remote_address("127.0.0.1:8125")
        .expect("failed to parse remote address")
        .with_buffering(true)
        .with_maximum_packet_length(1432)
        .with_flush_interval(Duration::from_millis(250))
        .build()
        .expect("failed to build client");

    let api = client.with_namespace("example.api");

    // Pretend to serve some requests.
    for i in 0_u64..1_000 {
        api.incr("requests").expect("failed to queue metric");
        api.time("latency", Duration::from_micros(i * 37 % 5_000)).expect("failed to queue metric");
        api.gauge("inflight", (i % 10) as f64).expect("failed to queue metric");
    }

    client.close();

    let stats = client.stats();
    println!(
        "sent {} packets ({} bytes), dropped {} packets",
        stats.packets_sent, stats.bytes_sent, stats.packets_dropped
    );
}
