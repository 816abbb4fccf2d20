use std::{sync::Arc, time::Instant};

use bytes::BytesMut;
use crossbeam_channel::{at, never, select, Receiver, Sender};
use tracing::{debug, error};

use crate::telemetry::Telemetry;

use super::{ForwarderConfiguration, Transport};

/// Control frames injected into the forwarder's event loop.
pub(crate) enum ControlFrame {
    /// Drain the submission queue, flush whatever is buffered, acknowledge,
    /// and exit.
    Shutdown(Sender<()>),
}

/// Hook run by the forwarder after every timer-driven flush.
pub(crate) type FlushHook = Box<dyn FnMut() + Send>;

/// The dispatch worker for a buffered client.
///
/// The forwarder is the sole owner of the batch buffer, the flush deadline,
/// and the transport, so none of them need any synchronization: producers
/// only ever touch the submission channel. Payloads are accumulated into
/// batches separated by `\n` and flushed when the next payload would push the
/// batch past the maximum packet length, or when the flush interval elapses
/// after the first payload of a batch was buffered.
pub(crate) struct Forwarder {
    transport: Transport,
    config: ForwarderConfiguration,
    payload_rx: Receiver<Vec<u8>>,
    control_rx: Receiver<ControlFrame>,
    telemetry: Arc<Telemetry>,
    flush_hook: Option<FlushHook>,
}

impl Forwarder {
    pub fn new(
        transport: Transport,
        config: ForwarderConfiguration,
        payload_rx: Receiver<Vec<u8>>,
        control_rx: Receiver<ControlFrame>,
        telemetry: Arc<Telemetry>,
        flush_hook: Option<FlushHook>,
    ) -> Self {
        Forwarder { transport, config, payload_rx, control_rx, telemetry, flush_hook }
    }

    /// Run the forwarder until the client is closed or every handle to it has
    /// been dropped.
    pub fn run(self) {
        let Forwarder { transport, config, payload_rx, control_rx, telemetry, mut flush_hook } =
            self;

        let mut buf = BytesMut::with_capacity(config.max_packet_length);

        // Deadline for flushing the current batch. Set exactly when the
        // buffer transitions from empty to non-empty, cleared whenever the
        // buffer is emptied. The one-shot receiver is rebuilt from it on
        // every iteration, so a cleared deadline can never leave a stale
        // tick behind to trigger a spurious flush for a later batch.
        let mut flush_deadline: Option<Instant> = None;

        debug!(
            max_packet_length = config.max_packet_length,
            flush_interval = ?config.flush_interval,
            "Forwarder running."
        );

        loop {
            let flush_rx: Receiver<Instant> = flush_deadline.map_or_else(never, at);

            select! {
                recv(flush_rx) -> _ => {
                    if !buf.is_empty() {
                        send_batch(&transport, &mut buf, &telemetry);
                        telemetry.track_timed_flush();
                        if let Some(hook) = flush_hook.as_mut() {
                            hook();
                        }
                    }
                    flush_deadline = None;
                },
                recv(payload_rx) -> payload => match payload {
                    Ok(payload) => {
                        if !buf.is_empty()
                            && batch_would_overflow(&buf, &payload, config.max_packet_length)
                        {
                            send_batch(&transport, &mut buf, &telemetry);
                            telemetry.track_eager_flush();
                        }

                        if buf.is_empty() {
                            flush_deadline = Some(Instant::now() + config.flush_interval);
                        } else {
                            buf.extend_from_slice(b"\n");
                        }
                        buf.extend_from_slice(&payload);
                    }
                    // Every client handle was dropped without an explicit
                    // close. The channel is empty once `recv` fails, so all
                    // that remains is whatever is sitting in the buffer.
                    Err(_) => {
                        if !buf.is_empty() {
                            send_batch(&transport, &mut buf, &telemetry);
                        }
                        debug!("All client handles dropped. Forwarder exiting.");
                        return;
                    }
                },
                recv(control_rx) -> frame => {
                    let ack = match frame {
                        Ok(ControlFrame::Shutdown(ack)) => Some(ack),
                        Err(_) => None,
                    };

                    // Anything accepted into the queue before the shutdown
                    // was requested is already sitting in the channel; drain
                    // it with the same size-triggered flush rule as the live
                    // path.
                    while let Ok(payload) = payload_rx.try_recv() {
                        if !buf.is_empty()
                            && batch_would_overflow(&buf, &payload, config.max_packet_length)
                        {
                            send_batch(&transport, &mut buf, &telemetry);
                            telemetry.track_eager_flush();
                        }

                        if !buf.is_empty() {
                            buf.extend_from_slice(b"\n");
                        }
                        buf.extend_from_slice(&payload);
                    }

                    if !buf.is_empty() {
                        send_batch(&transport, &mut buf, &telemetry);
                    }

                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }

                    debug!("Forwarder shutting down.");
                    return;
                },
            }
        }
    }
}

/// Returns `true` if appending `payload` (plus its delimiter) to the batch
/// would exceed the maximum packet length.
///
/// Only meaningful for a non-empty batch: a payload longer than the limit by
/// itself still gets buffered, and later sent alone as an oversized packet.
fn batch_would_overflow(buf: &BytesMut, payload: &[u8], max_packet_length: usize) -> bool {
    buf.len() + payload.len() + 1 > max_packet_length
}

/// Sends the accumulated batch and resets the buffer.
///
/// A failed send is logged and counted, never retried: the payloads in the
/// batch were already acknowledged to their submitters when they were queued.
fn send_batch(transport: &Transport, buf: &mut BytesMut, telemetry: &Telemetry) {
    match transport.send(buf) {
        Ok(_) => telemetry.track_packet_send_succeeded(buf.len()),
        Err(e) => {
            error!(error = %e, "Failed to send payload.");
            telemetry.track_packet_send_failed(buf.len());
        }
    }

    buf.clear();
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::batch_would_overflow;

    #[test]
    fn overflow_accounts_for_delimiter() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"a:1|c");

        // 5 + 1 + 5 fits in 11 but not in 10.
        assert!(!batch_would_overflow(&buf, b"b:1|c", 11));
        assert!(batch_would_overflow(&buf, b"b:1|c", 10));
    }
}
