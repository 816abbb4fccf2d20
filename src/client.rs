use std::{io, sync::Arc, thread::JoinHandle, time::Duration};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use rand::Rng as _;
use thiserror::Error;
use tracing::error;

use crate::{
    builder::{BuildError, ClientBuilder},
    forwarder::{sync::ControlFrame, Transport},
    telemetry::{ClientStats, Telemetry},
    writer::{format_metric, MetricType, MetricValue},
};

/// Errors that could occur while submitting a metric.
#[derive(Debug, Error)]
pub enum MetricError {
    /// The provided sampling rate was outside of `(0, 1]`.
    #[error("sampling rate must be in (0, 1]")]
    InvalidSampleRate,

    /// The client has already been closed.
    #[error("client has been closed")]
    Closed,

    /// The transport write failed.
    ///
    /// Only surfaced in direct mode. In buffered mode the submitting caller
    /// was already acknowledged when the payload was queued, so transport
    /// failures are absorbed by the forwarder instead.
    #[error("failed to send metric: {0}")]
    Io(#[from] io::Error),
}

pub(crate) struct BufferedHandle {
    pub payload_tx: Sender<Vec<u8>>,
    pub control_tx: Sender<ControlFrame>,
    pub worker: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) enum Mode {
    /// The transport is owned by the client handle and sends happen on the
    /// calling thread.
    Direct(RwLock<Option<Transport>>),

    /// The transport is owned by the forwarder thread and submissions are
    /// queued to it.
    Buffered(BufferedHandle),
}

pub(crate) struct Inner {
    pub mode: Mode,
    pub telemetry: Arc<Telemetry>,
}

/// A StatsD client.
///
/// A client either sends each metric as its own datagram on the calling
/// thread (direct mode), or hands formatted payloads to a background
/// forwarder thread that batches them into size-bounded packets (buffered
/// mode). See [`ClientBuilder`] for the tuning parameters, and the crate
/// documentation for the trade-offs between the two modes.
///
/// Clients are cheap to clone; clones and [namespaced views][Self::with_namespace]
/// share the same transport, submission queue, and forwarder.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
    namespace: String,
}

impl Client {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Client { inner, namespace: String::new() }
    }

    /// Creates a direct (unbuffered) client sending to the given address over
    /// UDP.
    ///
    /// # Errors
    ///
    /// If the address cannot be parsed or the socket cannot be opened, an
    /// error is returned.
    pub fn udp<A>(addr: A) -> Result<Client, BuildError>
    where
        A: AsRef<str>,
    {
        ClientBuilder::default().with_remote_address(addr)?.build()
    }

    /// Creates a buffered client sending to the given address over UDP, with
    /// default tuning parameters.
    ///
    /// # Errors
    ///
    /// If the address cannot be parsed, the socket cannot be opened, or the
    /// forwarder thread cannot be spawned, an error is returned.
    pub fn buffered_udp<A>(addr: A) -> Result<Client, BuildError>
    where
        A: AsRef<str>,
    {
        ClientBuilder::default().with_remote_address(addr)?.with_buffering(true).build()
    }

    /// Returns a view of this client with a nested namespace segment that is
    /// prepended, dot-separated, to the key of every metric emitted through
    /// it.
    ///
    /// The view shares the transport, submission queue, and forwarder with
    /// this client: only one of the family needs to be closed, and closing
    /// any view closes all of them.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is empty. An empty segment is a programming error,
    /// not a runtime-recoverable condition.
    pub fn with_namespace(&self, segment: &str) -> Client {
        assert!(!segment.is_empty(), "namespace segment cannot be empty");

        let mut namespace = format!("{}{segment}", self.namespace);
        if !namespace.ends_with('.') {
            namespace.push('.');
        }

        Client { inner: Arc::clone(&self.inner), namespace }
    }

    /// Submits a count of 1 for the given key.
    ///
    /// # Errors
    ///
    /// See [`MetricError`] for the conditions under which submission fails.
    pub fn incr(&self, key: &str) -> Result<(), MetricError> {
        self.emit(key, MetricValue::Integer(1), MetricType::Count, None)
    }

    /// Submits a count for the given key.
    ///
    /// # Errors
    ///
    /// See [`MetricError`] for the conditions under which submission fails.
    pub fn count(&self, key: &str, delta: i64) -> Result<(), MetricError> {
        self.emit(key, MetricValue::Integer(delta), MetricType::Count, None)
    }

    /// Submits a count of 1 for the given key with probability `rate`.
    ///
    /// Equivalent to [`count_sampled`][Self::count_sampled] with a delta of 1.
    ///
    /// # Errors
    ///
    /// Returns `MetricError::InvalidSampleRate` if `rate` is outside of
    /// `(0, 1]`, before anything is sent or queued.
    pub fn incr_sampled(&self, key: &str, rate: f64) -> Result<(), MetricError> {
        self.count_sampled(key, 1, rate)
    }

    /// Submits a count for the given key with probability `rate`.
    ///
    /// Sampling suppresses the emission client-side with probability
    /// `1 - rate` to reduce metric volume; payloads that are emitted carry an
    /// `@<rate>` suffix so the server can scale them back up.
    ///
    /// # Errors
    ///
    /// Returns `MetricError::InvalidSampleRate` if `rate` is outside of
    /// `(0, 1]`, before anything is sent or queued.
    pub fn count_sampled(&self, key: &str, delta: i64, rate: f64) -> Result<(), MetricError> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(MetricError::InvalidSampleRate);
        }

        if rand::rng().random::<f64>() >= rate {
            return Ok(());
        }

        let sample_rate = (rate != 1.0).then_some(rate);
        self.emit(key, MetricValue::Integer(delta), MetricType::Count, sample_rate)
    }

    /// Submits a timing for the given key, as fractional milliseconds.
    ///
    /// # Errors
    ///
    /// See [`MetricError`] for the conditions under which submission fails.
    pub fn time(&self, key: &str, duration: Duration) -> Result<(), MetricError> {
        let millis = duration.as_secs_f64() * 1000.0;
        self.emit(key, MetricValue::FloatingPoint(millis), MetricType::Timing, None)
    }

    /// Submits a gauge for the given key.
    ///
    /// # Errors
    ///
    /// See [`MetricError`] for the conditions under which submission fails.
    pub fn gauge(&self, key: &str, value: f64) -> Result<(), MetricError> {
        self.emit(key, MetricValue::FloatingPoint(value), MetricType::Gauge, None)
    }

    /// Submits a set element for the given key.
    ///
    /// # Errors
    ///
    /// See [`MetricError`] for the conditions under which submission fails.
    pub fn set(&self, key: &str, element: &str) -> Result<(), MetricError> {
        self.emit(key, MetricValue::Raw(element), MetricType::Set, None)
    }

    fn emit(
        &self,
        key: &str,
        value: MetricValue<'_>,
        metric_type: MetricType,
        sample_rate: Option<f64>,
    ) -> Result<(), MetricError> {
        let payload = format_metric(&self.namespace, key, value, metric_type, sample_rate);

        match &self.inner.mode {
            Mode::Direct(transport) => {
                let guard = transport.read();
                let transport = guard.as_ref().ok_or(MetricError::Closed)?;

                match transport.send(&payload) {
                    Ok(_) => {
                        self.inner.telemetry.track_packet_send_succeeded(payload.len());
                        Ok(())
                    }
                    Err(e) => {
                        self.inner.telemetry.track_packet_send_failed(payload.len());
                        Err(MetricError::Io(e))
                    }
                }
            }

            // Blocks while the queue is at capacity: producers are slowed,
            // never dropped.
            Mode::Buffered(handle) => {
                handle.payload_tx.send(payload).map_err(|_| MetricError::Closed)
            }
        }
    }

    /// Returns a snapshot of the client's internal telemetry.
    pub fn stats(&self) -> ClientStats {
        self.inner.telemetry.snapshot()
    }

    /// Closes the client, across every clone and namespaced view of it.
    ///
    /// In buffered mode this blocks until the forwarder has drained every
    /// payload that was accepted before the close, flushed the final batch,
    /// and exited; the transport is closed afterwards. In direct mode the
    /// transport is closed immediately.
    ///
    /// Closing an already-closed client is a no-op. Submissions after a close
    /// return `MetricError::Closed`.
    pub fn close(&self) {
        match &self.inner.mode {
            Mode::Direct(transport) => {
                // Dropping the socket closes it.
                *transport.write() = None;
            }

            Mode::Buffered(handle) => {
                // The lock is held across the join so that a concurrent close
                // returns only once the drain has completed.
                let mut worker = handle.worker.lock();
                let Some(worker) = worker.take() else {
                    return;
                };

                let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
                if handle.control_tx.send(ControlFrame::Shutdown(ack_tx)).is_ok() {
                    let _ = ack_rx.recv();
                }

                if worker.join().is_err() {
                    error!("Forwarder thread panicked during shutdown.");
                }
            }
        }
    }
}
