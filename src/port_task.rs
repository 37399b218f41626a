//! Drives a [DmxPort] from a single tokio task.
//!
//! The task owns the port exclusively. Uart events, timer fires and caller requests reach it
//! through channels and are handled one at a time, so no transition ever runs concurrently
//! with another. The uart driver only needs an [mpsc::UnboundedSender] for its events, which
//! can be fed from an interrupt or reader thread without blocking.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::dmx_frame::Dmx512Frame;
use crate::dmx_port::{
    DmxPort, DmxPortConfig, PortError, PortEvent, PortStats, TransactionOutcome, TransmitMode,
};
use crate::frame_sink::FrameSink;
use crate::rdm_transaction::{TimerToken, TransactionTimer};
use crate::uart_transport::{UartEvent, UartTransport};

/// Configuration of the task around a [DmxPort].
#[derive(Debug, Clone)]
pub struct PortTaskConfig {
    pub port: DmxPortConfig,
    /// Capacity of the request channel between handles and the task.
    pub request_queue_depth: usize,
    /// Requests waiting for the wire. Further requests fail with [PortError::ResourceExhausted].
    pub max_pending_transmits: usize,
    /// Received frames that may wait in the channel before new receptions are dropped.
    pub rx_frame_budget: usize,
}

impl Default for PortTaskConfig {
    fn default() -> Self {
        Self {
            port: DmxPortConfig::default(),
            request_queue_depth: 32,
            max_pending_transmits: 8,
            rx_frame_budget: 4,
        }
    }
}

/// [TransactionTimer] backed by a sleeping tokio task that posts the token back to the port task.
pub struct TokioTimer {
    runtime: Handle,
    fired: mpsc::UnboundedSender<TimerToken>,
    pending: Option<(TimerToken, AbortHandle)>,
}

impl TokioTimer {
    pub fn new(runtime: Handle, fired: mpsc::UnboundedSender<TimerToken>) -> Self {
        Self {
            runtime,
            fired,
            pending: None,
        }
    }
}

impl TransactionTimer for TokioTimer {
    fn arm(&mut self, token: TimerToken, duration_us: u32) {
        if let Some((_, sleeper)) = self.pending.take() {
            sleeper.abort();
        }

        let fired = self.fired.clone();
        let sleeper = self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_micros(duration_us as u64)).await;
            let _ = fired.send(token);
        });
        self.pending = Some((token, sleeper.abort_handle()));
    }

    fn cancel(&mut self, token: TimerToken) {
        if matches!(self.pending, Some((pending, _)) if pending == token) {
            if let Some((_, sleeper)) = self.pending.take() {
                sleeper.abort();
            }
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        if let Some((_, sleeper)) = self.pending.take() {
            sleeper.abort();
        }
    }
}

/// [FrameSink] that hands completed receptions to a bounded channel.
///
/// Frames that find the channel full are dropped, so a slow consumer costs receptions rather
/// than memory. Buffers for RDM replies never wait on the consumer.
pub struct ChannelSink {
    received: mpsc::Sender<Dmx512Frame>,
    dropped: u32,
}

impl ChannelSink {
    pub fn new(received: mpsc::Sender<Dmx512Frame>) -> Self {
        Self {
            received,
            dropped: 0,
        }
    }

    /// Completed frames the consumer had no room for.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl FrameSink for ChannelSink {
    fn acquire(&mut self, port: u8) -> Option<Dmx512Frame> {
        Some(Dmx512Frame::new(port))
    }

    fn push_received(&mut self, frame: Dmx512Frame) {
        match self.received.try_send(frame) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("receive channel full, dropping frame");
                self.dropped += 1;
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::trace!("nobody listens for received frames");
            },
        }
    }

    fn next_to_transmit(&mut self) -> Option<Dmx512Frame> {
        // queued requests are dispatched by the task
        None
    }

    fn release(&mut self, _frame: Dmx512Frame) {}
}

type TaskPort<U> = DmxPort<U, ChannelSink, TokioTimer>;

enum Request<U> {
    Transmit {
        frame: Dmx512Frame,
        reply: oneshot::Sender<Result<(), PortError>>,
    },
    Transact {
        frame: Dmx512Frame,
        reply: oneshot::Sender<Result<TransactionOutcome, PortError>>,
    },
    Stats {
        reply: oneshot::Sender<PortStats>,
    },
    Shutdown {
        reply: oneshot::Sender<U>,
    },
}

/// A request waiting for the wire.
enum PendingTransmit {
    OneWay {
        frame: Dmx512Frame,
        reply: oneshot::Sender<Result<(), PortError>>,
    },
    Exchange {
        frame: Dmx512Frame,
        reply: oneshot::Sender<Result<TransactionOutcome, PortError>>,
    },
}

impl PendingTransmit {
    fn fail(self, error: PortError) {
        match self {
            PendingTransmit::OneWay { reply, .. } => {
                let _ = reply.send(Err(error));
            },
            PendingTransmit::Exchange { reply, .. } => {
                let _ = reply.send(Err(error));
            },
        }
    }
}

/// Handle to a port task.
pub struct DmxPortHandle<U> {
    port: u8,
    requests: mpsc::Sender<Request<U>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<U> DmxPortHandle<U> {
    /// Number of the port, as put into [Dmx512Frame::port].
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Sends a frame that nobody replies to. Resolves once the frame is handed to the port.
    pub async fn transmit(&self, frame: Dmx512Frame) -> Result<(), PortError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Transmit { frame, reply })
            .await
            .map_err(|_| PortError::Closed)?;

        response.await.map_err(|_| PortError::Closed)?
    }

    /// Sends a request and waits for the reply, its timeout or the damaged reply.
    pub async fn transact(&self, frame: Dmx512Frame) -> Result<TransactionOutcome, PortError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Transact { frame, reply })
            .await
            .map_err(|_| PortError::Closed)?;

        response.await.map_err(|_| PortError::Closed)?
    }

    pub async fn stats(&self) -> Result<PortStats, PortError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Stats { reply })
            .await
            .map_err(|_| PortError::Closed)?;

        response.await.map_err(|_| PortError::Closed)
    }

    /// Stops the task without waiting for it. Pending requests fail with [PortError::Closed].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }

    /// Closes the port and gives back the uart.
    pub async fn shutdown(self) -> Result<U, PortError> {
        let (reply, response) = oneshot::channel();
        let _ = self.requests.send(Request::Shutdown { reply }).await;
        let uart = response.await.map_err(|_| PortError::Closed)?;
        let _ = self.task.await;

        Ok(uart)
    }
}

/// Spawns the task owning a [DmxPort] on the current tokio runtime.
///
/// Returns the handle for requests and the receiver for every frame the port receives.
pub fn spawn_port<U>(
    uart: U,
    uart_events: mpsc::UnboundedReceiver<UartEvent>,
    config: PortTaskConfig,
) -> Result<(DmxPortHandle<U>, mpsc::Receiver<Dmx512Frame>), PortError>
where
    U: UartTransport + Send + 'static,
{
    let runtime = Handle::try_current().map_err(|_| PortError::NoRuntime)?;

    let (request_tx, request_rx) = mpsc::channel(config.request_queue_depth.max(1));
    let (received_tx, received_rx) = mpsc::channel(config.rx_frame_budget.max(1));
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();

    let port = DmxPort::new(
        uart,
        ChannelSink::new(received_tx),
        TokioTimer::new(runtime.clone(), timer_tx),
        config.port.clone(),
    );

    let cancel = CancellationToken::new();
    let task = runtime.spawn(port_loop(
        port,
        uart_events,
        timer_rx,
        request_rx,
        config.max_pending_transmits,
        cancel.clone(),
    ));

    Ok((
        DmxPortHandle {
            port: config.port.port,
            requests: request_tx,
            cancel,
            task,
        },
        received_rx,
    ))
}

async fn port_loop<U: UartTransport>(
    mut port: TaskPort<U>,
    mut uart_events: mpsc::UnboundedReceiver<UartEvent>,
    mut timer_fired: mpsc::UnboundedReceiver<TimerToken>,
    mut requests: mpsc::Receiver<Request<U>>,
    max_pending_transmits: usize,
    cancel: CancellationToken,
) {
    let mut pending: VecDeque<PendingTransmit> = VecDeque::new();
    let mut in_flight: Option<oneshot::Sender<Result<TransactionOutcome, PortError>>> = None;
    let mut shutdown_reply = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::debug!("port {} task cancelled", port.config().port);
                break;
            }

            event = uart_events.recv() => {
                let Some(event) = event else {
                    log::debug!("uart event source of port {} closed", port.config().port);
                    break;
                };
                let outcome = port.handle_event(event.into());
                route_outcome(&mut in_flight, outcome);
            }

            Some(token) = timer_fired.recv() => {
                let outcome = port.handle_event(PortEvent::TimerFired(token));
                route_outcome(&mut in_flight, outcome);
            }

            request = requests.recv() => {
                match request {
                    Some(Request::Transmit { frame, reply }) => {
                        queue_transmit(
                            &mut pending,
                            PendingTransmit::OneWay { frame, reply },
                            max_pending_transmits,
                        );
                    }
                    Some(Request::Transact { frame, reply }) => {
                        queue_transmit(
                            &mut pending,
                            PendingTransmit::Exchange { frame, reply },
                            max_pending_transmits,
                        );
                    }
                    Some(Request::Stats { reply }) => {
                        let mut stats = port.stats();
                        stats.dropped_receptions += port.sink_mut().dropped();
                        let _ = reply.send(stats);
                    }
                    Some(Request::Shutdown { reply }) => {
                        log::debug!("port {} shutdown requested", port.config().port);
                        shutdown_reply = Some(reply);
                        break;
                    }
                    None => {
                        log::debug!("all handles of port {} dropped", port.config().port);
                        break;
                    }
                }
            }
        }

        dispatch_pending(&mut port, &mut pending, &mut in_flight);
    }

    route_outcome(&mut in_flight, port.close());
    if let Some(reply) = in_flight.take() {
        let _ = reply.send(Err(PortError::Closed));
    }
    for request in pending.drain(..) {
        request.fail(PortError::Closed);
    }

    if let Some(reply) = shutdown_reply {
        let (uart, _) = port.into_parts();
        let _ = reply.send(uart);
    }
}

fn queue_transmit(
    pending: &mut VecDeque<PendingTransmit>,
    request: PendingTransmit,
    max_pending_transmits: usize,
) {
    if pending.len() >= max_pending_transmits.max(1) {
        log::warn!("{} transmissions pending, rejecting request", pending.len());
        request.fail(PortError::ResourceExhausted);
        return;
    }

    pending.push_back(request);
}

/// Hands queued requests to the port while it accepts them.
fn dispatch_pending<U: UartTransport>(
    port: &mut TaskPort<U>,
    pending: &mut VecDeque<PendingTransmit>,
    in_flight: &mut Option<oneshot::Sender<Result<TransactionOutcome, PortError>>>,
) {
    while in_flight.is_none() {
        let Some(request) = pending.pop_front() else {
            return;
        };

        match request {
            PendingTransmit::OneWay { frame, reply } => match port.send_frame(frame) {
                Ok(_) => {
                    let _ = reply.send(Ok(()));
                },
                Err(PortError::TransactionConflict(frame)) => {
                    pending.push_front(PendingTransmit::OneWay { frame, reply });
                    return;
                },
                Err(error) => {
                    let _ = reply.send(Err(error));
                },
            },
            PendingTransmit::Exchange { frame, reply } => match port.send_frame(frame) {
                Ok(TransmitMode::TwoWay) => *in_flight = Some(reply),
                Ok(TransmitMode::OneWay) => {
                    let _ = reply.send(Err(PortError::NoReplyExpected));
                },
                Err(PortError::TransactionConflict(frame)) => {
                    pending.push_front(PendingTransmit::Exchange { frame, reply });
                    return;
                },
                Err(error) => {
                    let _ = reply.send(Err(error));
                },
            },
        }
    }
}

fn route_outcome(
    in_flight: &mut Option<oneshot::Sender<Result<TransactionOutcome, PortError>>>,
    outcome: Option<TransactionOutcome>,
) {
    let Some(outcome) = outcome else {
        return;
    };

    match in_flight.take() {
        Some(reply) => {
            let _ = reply.send(Ok(outcome));
        },
        None => log::debug!("outcome {:?} without a waiting request", outcome),
    }
}
