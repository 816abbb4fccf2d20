//! A lightweight StatsD client with buffered datagram forwarding.
//!
//! # Usage
//!
//! Using the client is straightforward:
//!
//! ```no_run
//! use squall::Client;
//!
//! // A direct client sends each metric as its own datagram, on the calling
//! // thread, and reports transport errors to the caller.
//! let client = Client::udp("127.0.0.1:8125").expect("failed to build client");
//!
//! client.incr("requests").expect("failed to send");
//! client.gauge("queue.depth", 42.0).expect("failed to send");
//! ```
//!
//! For applications that emit metrics at a high rate, a buffered client
//! offloads the sending to a background thread and packs multiple metrics
//! into each datagram:
//!
//! ```no_run
//! use std::time::Duration;
//! use squall::ClientBuilder;
//!
//! let client = ClientBuilder::default()
//!     .with_remote_address("127.0.0.1:8125")
//!     .expect("failed to parse remote address")
//!     .with_buffering(true)
//!     .with_maximum_packet_length(1432)
//!     .with_flush_interval(Duration::from_secs(1))
//!     .build()
//!     .expect("failed to build client");
//!
//! // Namespaced views share the client's queue and forwarder; they only
//! // prepend a dotted prefix to the keys emitted through them.
//! let api = client.with_namespace("api");
//! api.incr("requests").expect("failed to queue");
//! api.time("latency", Duration::from_millis(35)).expect("failed to queue");
//!
//! // Closing any view drains the queue, flushes the final batch, and closes
//! // the shared transport for all of them.
//! client.close();
//! ```
//!
//! # Features
//!
//! ## Buffered forwarding
//!
//! In buffered mode, metric calls format their payload, hand it to a
//! dedicated forwarder thread over a bounded FIFO queue, and return. The
//! forwarder accumulates payloads into newline-delimited batches, flushing a
//! batch when the next payload would push it past the maximum packet length
//! or when the flush interval elapses, whichever comes first. Submission
//! order is preserved within and across batches, and closing the client
//! delivers every payload that was accepted before the close.
//!
//! When the queue is full, metric calls block until the forwarder catches
//! up: backpressure slows producers down rather than silently dropping
//! measurements.
//!
//! Note that a buffered client cannot report transport errors to its
//! callers -- by the time a send fails, the submitting call has already
//! returned. Failed packets are logged via [`tracing`] and counted in
//! [`ClientStats`], and are not retried. This is a deliberate trade of error
//! visibility for throughput; if it is not acceptable, use a direct client.
//!
//! ## Sampling
//!
//! Counts can be sampled client-side with a rate in `(0, 1]`: emissions are
//! randomly suppressed with probability `1 - rate`, and the payloads that do
//! go out carry an `@<rate>` suffix so the server can scale them back up.
//!
//! ## Transports
//!
//! Metrics are sent over UDP, or over datagram (`SOCK_DGRAM`) Unix domain
//! sockets on Linux using a `unixgram://<path>` address.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]

mod builder;
pub use self::builder::{BuildError, ClientBuilder};

mod client;
pub use self::client::{Client, MetricError};

mod forwarder;

mod telemetry;
pub use self::telemetry::ClientStats;

mod writer;
