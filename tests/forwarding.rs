use std::{
    net::UdpSocket,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use squall::{Client, ClientBuilder, MetricError};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn udp_server() -> (UdpSocket, String) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind server socket");
    socket.set_read_timeout(Some(RECV_TIMEOUT)).expect("failed to set read timeout");
    let addr = socket.local_addr().expect("failed to get local address").to_string();
    (socket, addr)
}

fn recv_packet(socket: &UdpSocket) -> String {
    let mut buf = [0_u8; 65_536];
    let (len, _) = socket.recv_from(&mut buf).expect("timed out waiting for packet");
    String::from_utf8(buf[..len].to_vec()).expect("packet was not valid UTF-8")
}

fn buffered_client(addr: &str, max_packet_length: usize, flush_interval: Duration) -> Client {
    ClientBuilder::default()
        .with_remote_address(addr)
        .expect("failed to parse remote address")
        .with_buffering(true)
        .with_maximum_packet_length(max_packet_length)
        .with_flush_interval(flush_interval)
        .build()
        .expect("failed to build client")
}

fn wait_for<F>(cond: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + RECV_TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn direct_mode_sends_each_metric_immediately() {
    let (server, addr) = udp_server();
    let client = Client::udp(&addr).expect("failed to build client");

    client.incr("a").unwrap();
    assert_eq!(recv_packet(&server), "a:1|c");

    client.count("hits", 3).unwrap();
    assert_eq!(recv_packet(&server), "hits:3|c");

    client.gauge("depth", 4.5).unwrap();
    assert_eq!(recv_packet(&server), "depth:4.5|g");

    client.time("latency", Duration::from_secs(2)).unwrap();
    assert_eq!(recv_packet(&server), "latency:2000.0|ms");

    client.set("users", "alice").unwrap();
    assert_eq!(recv_packet(&server), "users:alice|s");
}

#[test]
fn buffered_payloads_joined_in_one_packet() {
    let (server, addr) = udp_server();
    let client = buffered_client(&addr, 20, Duration::from_secs(5));

    client.incr("a").unwrap();
    client.incr("b").unwrap();
    client.close();

    assert_eq!(recv_packet(&server), "a:1|c\nb:1|c");
}

#[test]
fn buffered_flushes_before_exceeding_packet_length() {
    let (server, addr) = udp_server();

    // "a:1|c" buffers; appending "b:1|c" would make 5 + 1 + 5 = 11 > 8, so
    // the first payload is flushed alone.
    let client = buffered_client(&addr, 8, Duration::from_secs(5));

    client.incr("a").unwrap();
    client.incr("b").unwrap();
    client.close();

    assert_eq!(recv_packet(&server), "a:1|c");
    assert_eq!(recv_packet(&server), "b:1|c");

    let stats = client.stats();
    assert_eq!(stats.packets_sent, 2);
    assert_eq!(stats.eager_flushes, 1);
}

#[test]
fn flush_interval_sends_partial_batch() {
    let (server, addr) = udp_server();
    let client = buffered_client(&addr, 1_000, Duration::from_millis(50));

    client.incr("a").unwrap();
    assert_eq!(recv_packet(&server), "a:1|c");

    // The first payload went out in its own batch; the next submission
    // starts a fresh one.
    client.incr("b").unwrap();
    assert_eq!(recv_packet(&server), "b:1|c");

    wait_for(|| client.stats().timed_flushes >= 2);
    client.close();
}

#[test]
fn flush_hook_runs_after_timed_flush() {
    let (server, addr) = udp_server();

    let flushes = Arc::new(AtomicUsize::new(0));
    let hook_flushes = Arc::clone(&flushes);

    let client = ClientBuilder::default()
        .with_remote_address(&addr)
        .expect("failed to parse remote address")
        .with_buffering(true)
        .with_flush_interval(Duration::from_millis(50))
        .with_flush_hook(move || {
            hook_flushes.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .expect("failed to build client");

    client.incr("a").unwrap();
    assert_eq!(recv_packet(&server), "a:1|c");

    wait_for(|| flushes.load(Ordering::SeqCst) >= 1);
    client.close();
}

#[test]
fn oversized_payload_sent_alone() {
    let (server, addr) = udp_server();
    let client = buffered_client(&addr, 4, Duration::from_secs(5));

    // Longer than the packet limit by itself: never rejected or truncated,
    // sent as its own oversized packet.
    client.count("oversized", 2).unwrap();
    client.incr("a").unwrap();
    client.close();

    assert_eq!(recv_packet(&server), "oversized:2|c");
    assert_eq!(recv_packet(&server), "a:1|c");
}

#[test]
fn close_delivers_queued_payloads_in_order() {
    let (server, addr) = udp_server();
    let client = buffered_client(&addr, 64, Duration::from_secs(30));

    for i in 0..100 {
        client.count("seq", i).unwrap();
    }
    client.close();

    let mut values = Vec::new();
    while values.len() < 100 {
        let packet = recv_packet(&server);
        for line in packet.split('\n') {
            let value = line
                .strip_prefix("seq:")
                .and_then(|rest| rest.strip_suffix("|c"))
                .expect("unexpected payload");
            values.push(value.parse::<i64>().unwrap());
        }
    }

    assert_eq!(values, (0..100).collect::<Vec<_>>());
}

#[test]
fn backpressure_blocks_instead_of_dropping() {
    let (server, addr) = udp_server();

    // A single-slot queue forces the submitting thread to wait for the
    // forwarder on nearly every call; every payload must still arrive,
    // in order.
    let client = ClientBuilder::default()
        .with_remote_address(&addr)
        .expect("failed to parse remote address")
        .with_buffering(true)
        .with_queue_capacity(1)
        .with_maximum_packet_length(64)
        .with_flush_interval(Duration::from_millis(10))
        .build()
        .expect("failed to build client");

    for i in 0..50 {
        client.count("seq", i).unwrap();
    }
    client.close();

    let mut values = Vec::new();
    while values.len() < 50 {
        let packet = recv_packet(&server);
        for line in packet.split('\n') {
            let value = line
                .strip_prefix("seq:")
                .and_then(|rest| rest.strip_suffix("|c"))
                .expect("unexpected payload");
            values.push(value.parse::<i64>().unwrap());
        }
    }

    assert_eq!(values, (0..50).collect::<Vec<_>>());
}

#[test]
fn namespaced_views_prefix_keys() {
    let (server, addr) = udp_server();
    let client = Client::udp(&addr).expect("failed to build client");

    let api = client.with_namespace("api");
    api.incr("requests").unwrap();
    assert_eq!(recv_packet(&server), "api.requests:1|c");

    let v1 = api.with_namespace("v1");
    v1.incr("requests").unwrap();
    assert_eq!(recv_packet(&server), "api.v1.requests:1|c");

    // A trailing dot in the segment is not doubled.
    let dotted = client.with_namespace("worker.");
    dotted.incr("jobs").unwrap();
    assert_eq!(recv_packet(&server), "worker.jobs:1|c");
}

#[test]
#[should_panic(expected = "namespace segment cannot be empty")]
fn empty_namespace_segment_panics() {
    let (_server, addr) = udp_server();
    let client = Client::udp(&addr).expect("failed to build client");
    let _ = client.with_namespace("");
}

#[test]
fn closing_any_view_closes_all() {
    let (server, addr) = udp_server();
    let client = buffered_client(&addr, 1_000, Duration::from_secs(5));

    let api = client.with_namespace("api");
    api.incr("requests").unwrap();
    api.close();

    assert_eq!(recv_packet(&server), "api.requests:1|c");

    assert!(matches!(client.incr("next"), Err(MetricError::Closed)));
    assert!(matches!(api.incr("again"), Err(MetricError::Closed)));

    // Closing again is a no-op.
    client.close();
}

#[test]
fn direct_close_is_idempotent() {
    let (server, addr) = udp_server();
    let client = Client::udp(&addr).expect("failed to build client");

    client.incr("a").unwrap();
    assert_eq!(recv_packet(&server), "a:1|c");

    client.close();
    assert!(matches!(client.incr("b"), Err(MetricError::Closed)));
    client.close();
}

#[test]
fn invalid_sampling_rate_reported_before_submission() {
    let (server, addr) = udp_server();
    let client = Client::udp(&addr).expect("failed to build client");

    for rate in [0.0, -0.5, 1.5] {
        assert!(matches!(
            client.count_sampled("hits", 1, rate),
            Err(MetricError::InvalidSampleRate)
        ));
        assert!(matches!(client.incr_sampled("hits", rate), Err(MetricError::InvalidSampleRate)));
    }

    // A rate of exactly 1 always emits, with no rate suffix.
    client.count_sampled("hits", 2, 1.0).unwrap();
    assert_eq!(recv_packet(&server), "hits:2|c");

    // The invalid rates above never reached the transport.
    assert_eq!(client.stats().packets_sent, 1);
}

#[test]
fn sampled_counts_carry_rate_suffix() {
    let (server, addr) = udp_server();
    let client = Client::udp(&addr).expect("failed to build client");

    for _ in 0..200 {
        client.incr_sampled("hits", 0.5).unwrap();
    }

    // At a rate of 0.5, 200 attempts that never emit (or never suppress) is
    // not a realistic outcome.
    assert_eq!(recv_packet(&server), "hits:1|c@0.5");
    assert!(client.stats().packets_sent < 200);
}
