use std::{io, net::SocketAddr, sync::Arc, thread, time::Duration};

use crossbeam_channel::bounded;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

use crate::{
    client::{BufferedHandle, Client, Inner, Mode},
    forwarder::{
        sync::{FlushHook, Forwarder},
        ForwarderConfiguration, RemoteAddr, Transport,
    },
    telemetry::Telemetry,
};

/// Default capacity of the submission queue.
///
/// With a value of 10,000, if we assume 50 byte payloads, then a full queue
/// holds roughly 500KB.
const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default maximum packet length, comfortably under the datagram sizes that
/// work for local UDP on common platforms.
const DEFAULT_MAX_PACKET_LENGTH: usize = 1_000;

/// Default flush interval for a partially filled batch.
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that could occur while building a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// A tuning parameter was outside of its allowed range.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Details about the rejected value.
        reason: String,
    },

    /// Failed to open the transport.
    #[error("failed to open transport: {0}")]
    Transport(#[from] io::Error),

    /// Failed to spawn the background forwarder thread in buffered mode.
    #[error("failed to spawn background forwarder thread")]
    Backend,
}

/// Builder for a [`Client`].
pub struct ClientBuilder {
    remote_addr: RemoteAddr,
    buffered: bool,
    queue_capacity: usize,
    max_packet_length: usize,
    flush_interval: Duration,
    write_timeout: Duration,
    flush_hook: Option<FlushHook>,
}

impl ClientBuilder {
    /// Set the remote address to send metrics to.
    ///
    /// For UDP, the address simply needs to be in the format of
    /// `<host>:<port>`. On Linux, an address in the format of
    /// `unixgram://<path>` sends to a datagram (`SOCK_DGRAM`) Unix domain
    /// socket instead.
    ///
    /// Defaults to sending to `127.0.0.1:8125` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an
    /// error will be returned indicating the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set whether metrics are buffered and batched on a background thread.
    ///
    /// When enabled, metric calls format their payload and hand it to a
    /// dedicated forwarder thread over a bounded queue, and return as soon as
    /// the payload is queued. The forwarder accumulates payloads into
    /// newline-delimited batches no longer than the maximum packet length and
    /// sends each batch as a single transport write.
    ///
    /// Buffering trades error visibility for throughput: a transport failure
    /// can no longer be reported to the caller whose payload was lost, so it
    /// is only logged and counted in [`ClientStats`][crate::ClientStats].
    /// Default to an unbuffered client unless metric emission shows up as
    /// measurable overhead.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_buffering(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Set the capacity of the submission queue in buffered mode.
    ///
    /// This bounds the memory spent on queued payloads and how far producers
    /// can run ahead of the forwarder. When the queue is full, metric calls
    /// block until the forwarder drains a slot; producers are slowed, never
    /// dropped.
    ///
    /// Defaults to 10,000 payloads.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the maximum packet length in buffered mode.
    ///
    /// This controls the maximum size of a single batch sent to the remote
    /// server, and should stay below the transport's safe datagram size. A
    /// single payload longer than this limit is not rejected: it is sent
    /// alone, as its own oversized packet, on the assumption that the
    /// transport may still accept it.
    ///
    /// Defaults to 1,000 bytes.
    #[must_use]
    pub fn with_maximum_packet_length(mut self, max_packet_length: usize) -> Self {
        self.max_packet_length = max_packet_length;
        self
    }

    /// Set the flush interval in buffered mode.
    ///
    /// This is the maximum time a partially filled batch waits before being
    /// sent, counted from the moment the first payload of the batch was
    /// buffered. Appending to an existing batch does not reset the countdown.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the write timeout for transport sends.
    ///
    /// When the write timeout is reached, the write operation is aborted and
    /// the packet being sent at the time is dropped without retrying.
    ///
    /// Defaults to 1 second. Must be non-zero.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Set a hook to run after every timer-driven flush in buffered mode.
    ///
    /// The hook runs on the forwarder thread, so it must not block: the
    /// forwarder cannot accept submissions while the hook runs.
    #[must_use]
    pub fn with_flush_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.flush_hook = Some(Box::new(hook));
        self
    }

    /// Builds the client.
    ///
    /// The transport is connected immediately. In buffered mode, the
    /// forwarder thread is spawned and owns the transport until the client is
    /// closed.
    ///
    /// # Errors
    ///
    /// If a tuning parameter is out of range, the transport cannot be opened,
    /// or the forwarder thread cannot be spawned, an error is returned.
    pub fn build(self) -> Result<Client, BuildError> {
        if self.queue_capacity == 0 {
            return Err(BuildError::InvalidConfiguration {
                reason: "queue capacity must be greater than zero".to_string(),
            });
        }

        if self.max_packet_length == 0 {
            return Err(BuildError::InvalidConfiguration {
                reason: "maximum packet length must be greater than zero".to_string(),
            });
        }

        if self.write_timeout.is_zero() {
            return Err(BuildError::InvalidConfiguration {
                reason: "write timeout must be non-zero".to_string(),
            });
        }

        let telemetry = Arc::new(Telemetry::default());
        let transport = Transport::connect(&self.remote_addr, self.write_timeout)?;
        debug!(transport = self.remote_addr.transport_id(), "Transport connected.");

        let mode = if self.buffered {
            let (payload_tx, payload_rx) = bounded(self.queue_capacity);
            let (control_tx, control_rx) = bounded(1);

            let config = ForwarderConfiguration {
                max_packet_length: self.max_packet_length,
                flush_interval: self.flush_interval,
            };

            let forwarder = Forwarder::new(
                transport,
                config,
                payload_rx,
                control_rx,
                Arc::clone(&telemetry),
                self.flush_hook,
            );

            let worker = thread::Builder::new()
                .name("squall-forwarder".to_string())
                .spawn(move || forwarder.run())
                .map_err(|_| BuildError::Backend)?;

            Mode::Buffered(BufferedHandle {
                payload_tx,
                control_tx,
                worker: Mutex::new(Some(worker)),
            })
        } else {
            Mode::Direct(RwLock::new(Some(transport)))
        };

        Ok(Client::new(Arc::new(Inner { mode, telemetry })))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            remote_addr: RemoteAddr::Udp(vec![SocketAddr::from(([127, 0, 0, 1], 8125))]),
            buffered: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_packet_length: DEFAULT_MAX_PACKET_LENGTH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            flush_hook: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{BuildError, ClientBuilder};

    #[test]
    fn invalid_remote_address() {
        let result = ClientBuilder::default().with_remote_address("not an address");
        assert!(matches!(result, Err(BuildError::InvalidRemoteAddress { .. })));
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let result = ClientBuilder::default().with_queue_capacity(0).build();
        assert!(matches!(result, Err(BuildError::InvalidConfiguration { .. })));
    }

    #[test]
    fn rejects_zero_maximum_packet_length() {
        let result = ClientBuilder::default().with_maximum_packet_length(0).build();
        assert!(matches!(result, Err(BuildError::InvalidConfiguration { .. })));
    }

    #[test]
    fn rejects_zero_write_timeout() {
        let result = ClientBuilder::default().with_write_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(BuildError::InvalidConfiguration { .. })));
    }
}
