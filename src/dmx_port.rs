//! The per link state machine.
//!
//! [DmxPort] turns uart events into complete [Dmx512Frame]s, drives transmissions (break, then
//! data) and tracks the single RDM exchange that may be outstanding on a half duplex line.
//! It never blocks and never spawns anything: every transition happens inside
//! [DmxPort::handle_event] or [DmxPort::send_frame], so the owner decides how events get
//! serialized (an interrupt handler with a critical section, a single async task, ...).

use crate::command_class::{is_request_command_class, RequestCommandClass};
use crate::consts::{
    DMX_MAX_SLOTS, DMX_NULL_START, LINE_TX_ENABLE, RDM_CHECKSUM_SIZE, RDM_HEADER_SIZE,
    RDM_MAX_PACKAGE_SIZE, RDM_PDL_OFFSET, RDM_REPLY_TIMEOUT_MICROS, SC_RDM,
    SLOT_COUNT_REQUIRED_MATCHES, SLOT_MICROS, DISCOVERY_REPLY_TIMEOUT_MICROS,
};
use crate::discovery_reply::{DiscoveryReply, DiscoveryReplyBuffer};
use crate::dmx_frame::{Dmx512Frame, WireFrame};
use crate::frame_sink::FrameSink;
use crate::pids;
use crate::rdm_codec::RdmPacketView;
use crate::rdm_transaction::{RdmTransactionTimer, TimerToken, TransactionTimer};
use crate::slot_count_lock::SlotCountLock;
use crate::uart_transport::{UartEvent, UartTransport};

const READ_CHUNK_SIZE: usize = 32;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitMode {
    /// Nothing is expected back.
    OneWay,
    /// The port waits for a reply after the frame is out.
    TwoWay,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortState {
    Idle,
    /// Like [PortState::Idle], but a null start code frame just completed. Data arriving now means
    /// the slot count lock completed that frame too early.
    IdleAfterDmx00,
    ExpectStartcode,
    ReceiveData,
    TransmitBreak(TransmitMode),
    TransmitData(TransmitMode),
    RecvRdmDiscoveryReply,
    /// A second responder interfered; the reply window still runs out but resolves as a collision.
    RecvRdmDiscoveryReplyCollision,
    ExpectRdmReplyBreak,
    RecvRdmReplyData,
}

impl PortState {
    pub fn is_idle(&self) -> bool {
        matches!(self, PortState::Idle | PortState::IdleAfterDmx00)
    }

    /// True while the port waits for the answer to a two way exchange.
    pub fn awaits_reply(&self) -> bool {
        matches!(
            self,
            PortState::RecvRdmDiscoveryReply
                | PortState::RecvRdmDiscoveryReplyCollision
                | PortState::ExpectRdmReplyBreak
                | PortState::RecvRdmReplyData
        )
    }
}

/// Input of the state machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortEvent {
    Uart(UartEvent),
    TimerFired(TimerToken),
}

impl From<UartEvent> for PortEvent {
    fn from(event: UartEvent) -> Self {
        PortEvent::Uart(event)
    }
}

/// How a two way exchange ended.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransactionOutcome {
    /// Result of a DISC_UNIQUE_BRANCH reply window.
    Discovery(DiscoveryReply),
    /// A checksum valid RDM reply. The frame still holds the start code as `startcode`.
    Reply(Dmx512Frame),
    /// No reply started before the deadline.
    Timeout,
    /// Something answered, but not with a valid RDM package.
    DamagedReply,
    /// The port was closed while the exchange was pending.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The wire is owned by another transmission or reception. The frame is handed back.
    #[error("the port is busy, retry once it is idle")]
    TransactionConflict(Dmx512Frame),
    #[error("no free frame buffer")]
    ResourceExhausted,
    #[error("the port is closed")]
    Closed,
    #[error("no async runtime available to drive the port")]
    NoRuntime,
    /// A transaction was requested for a frame nothing answers to. The frame was sent.
    #[error("the frame was sent, but it does not expect a reply")]
    NoReplyExpected,
}

/// Events a state has no transition for. They are logged, counted and otherwise dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IgnoredEvent {
    /// A break while the port drives the line.
    BreakWhileTransmitting,
    /// Received bytes while the port drives the line.
    DataWhileTransmitting,
    /// Bytes without a preceding break.
    DataWithoutBreak,
    /// Transmitter events while nothing is being sent.
    TxEventWhileNotTransmitting,
    /// A live timer fired in a state that never arms one.
    TimerWithoutDeadline,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct PortStats {
    pub frames_received: u32,
    pub frames_transmitted: u32,
    /// Receptions lost because no frame buffer was available.
    pub dropped_receptions: u32,
    pub line_errors: u32,
    pub unexpected_events: u32,
    pub slot_count_unlocks: u32,
    pub last_ignored_event: Option<IgnoredEvent>,
}

#[derive(Debug, Clone)]
pub struct DmxPortConfig {
    /// Stamped into every frame this port receives.
    pub port: u8,
    /// How long the reply window of a DISC_UNIQUE_BRANCH request stays open.
    pub discovery_reply_timeout_us: u32,
    /// How long to wait for the break of a standard RDM reply.
    pub rdm_reply_timeout_us: u32,
    /// Equally sized null start code frames needed to lock the slot count.
    pub slot_count_required: u8,
    pub slot_count_lock_enabled: bool,
}

impl Default for DmxPortConfig {
    fn default() -> Self {
        Self {
            port: 0,
            discovery_reply_timeout_us: DISCOVERY_REPLY_TIMEOUT_MICROS,
            rdm_reply_timeout_us: RDM_REPLY_TIMEOUT_MICROS,
            slot_count_required: SLOT_COUNT_REQUIRED_MATCHES,
            slot_count_lock_enabled: true,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Exchange {
    OneWay,
    /// DISC_UNIQUE_BRANCH; answered without break in the discovery encoding.
    Discovery,
    /// Unicast request answered by a regular RDM package.
    Standard,
}

impl Exchange {
    fn mode(&self) -> TransmitMode {
        match self {
            Exchange::OneWay => TransmitMode::OneWay,
            Exchange::Discovery | Exchange::Standard => TransmitMode::TwoWay,
        }
    }
}

struct RxContext {
    frame: Dmx512Frame,
    /// Payload bytes that complete the frame without waiting for the next break.
    expected_slots: usize,
}

struct TxContext {
    frame: Dmx512Frame,
    wire: WireFrame,
    /// Wire bytes already handed to the uart.
    cursor: usize,
    exchange: Exchange,
}

impl TxContext {
    fn is_written(&self) -> bool {
        self.cursor >= self.wire.len()
    }
}

pub struct DmxPort<U: UartTransport, S: FrameSink, T: TransactionTimer> {
    config: DmxPortConfig,
    uart: U,
    sink: S,
    timer: RdmTransactionTimer<T>,
    state: PortState,
    slot_count_lock: SlotCountLock,
    rx: Option<RxContext>,
    tx: Option<TxContext>,
    discovery_reply: DiscoveryReplyBuffer,
    stats: PortStats,
    closed: bool,
}

impl<U: UartTransport, S: FrameSink, T: TransactionTimer> DmxPort<U, S, T> {
    pub fn new(uart: U, sink: S, timer: T, config: DmxPortConfig) -> Self {
        let mut slot_count_lock = SlotCountLock::new(config.slot_count_required);
        slot_count_lock.set_enabled(config.slot_count_lock_enabled);

        Self {
            config,
            uart,
            sink,
            timer: RdmTransactionTimer::new(timer),
            state: PortState::Idle,
            slot_count_lock,
            rx: None,
            tx: None,
            discovery_reply: DiscoveryReplyBuffer::new(),
            stats: PortStats::default(),
            closed: false,
        }
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn stats(&self) -> PortStats {
        self.stats
    }

    pub fn config(&self) -> &DmxPortConfig {
        &self.config
    }

    pub fn slot_count_lock(&self) -> &SlotCountLock {
        &self.slot_count_lock
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn timer_mut(&mut self) -> &mut T {
        self.timer.timer_mut()
    }

    /// Takes a buffer from the sink to fill and pass to [DmxPort::send_frame].
    pub fn acquire_frame(&mut self) -> Result<Dmx512Frame, PortError> {
        self.sink
            .acquire(self.config.port)
            .ok_or(PortError::ResourceExhausted)
    }

    /// Hands a frame buffer back to the sink.
    pub fn release_frame(&mut self, frame: Dmx512Frame) {
        self.sink.release(frame);
    }

    /// Starts transmitting `frame`.
    ///
    /// Only possible while the port is idle or waiting for a start code; a reception that has
    /// not received a single byte yet is abandoned. Everything else is rejected with
    /// [PortError::TransactionConflict] and leaves the port untouched.
    pub fn send_frame(&mut self, frame: Dmx512Frame) -> Result<TransmitMode, PortError> {
        if self.closed {
            self.sink.release(frame);
            return Err(PortError::Closed);
        }

        match self.state {
            PortState::Idle | PortState::IdleAfterDmx00 => {},
            PortState::ExpectStartcode => {
                if let Some(rx) = self.rx.take() {
                    self.sink.release(rx.frame);
                }
            },
            _ => return Err(PortError::TransactionConflict(frame)),
        }

        Ok(self.begin_transmit(frame))
    }

    /// Feeds one event into the state machine. Returns the outcome of a two way exchange once
    /// it is resolved.
    pub fn handle_event(&mut self, event: PortEvent) -> Option<TransactionOutcome> {
        if self.closed {
            log::trace!("port {} closed, dropping {:?}", self.config.port, event);
            return None;
        }

        match event {
            PortEvent::Uart(UartEvent::BreakDetected) => self.on_break(),
            PortEvent::Uart(UartEvent::DataAvailable(count)) => self.on_data(count),
            PortEvent::Uart(UartEvent::LineError(mask)) => self.on_line_error(mask),
            PortEvent::Uart(UartEvent::TxSpaceAvailable) => self.on_tx_space(),
            PortEvent::Uart(UartEvent::TxComplete) => self.on_tx_complete(),
            PortEvent::TimerFired(token) => self.on_timer(token),
        }
    }

    /// Shuts the port down: cancels the deadline, releases frames still held by the port and
    /// reports [TransactionOutcome::Cancelled] if an exchange was pending.
    pub fn close(&mut self) -> Option<TransactionOutcome> {
        if self.closed {
            return None;
        }

        self.timer.cancel();

        let mut pending_exchange = self.state.awaits_reply();

        if let Some(tx) = self.tx.take() {
            if matches!(self.state, PortState::TransmitBreak(_)) {
                self.uart.set_break(false);
            }
            self.uart.set_output_lines(LINE_TX_ENABLE, 0);
            pending_exchange |= tx.exchange != Exchange::OneWay;
            self.sink.release(tx.frame);
        }

        if let Some(rx) = self.rx.take() {
            self.sink.release(rx.frame);
        }

        self.discovery_reply.clear();
        self.set_state(PortState::Idle);
        self.closed = true;

        pending_exchange.then_some(TransactionOutcome::Cancelled)
    }

    /// Gives back uart and sink after [DmxPort::close].
    pub fn into_parts(mut self) -> (U, S) {
        self.close();
        (self.uart, self.sink)
    }

    fn on_break(&mut self) -> Option<TransactionOutcome> {
        match self.state {
            PortState::Idle | PortState::IdleAfterDmx00 => {
                if !self.start_reception(PortState::ExpectStartcode) {
                    log::warn!("port {}: no frame buffer, dropping reception", self.config.port);
                    self.transmit_next();
                }
                None
            },
            PortState::ExpectStartcode => {
                log::trace!("break without start code, restarting reception");
                None
            },
            PortState::ReceiveData => {
                self.complete_reception();
                if !self.start_reception(PortState::ExpectStartcode) {
                    log::warn!("port {}: no frame buffer, dropping reception", self.config.port);
                    self.transmit_next();
                }
                None
            },
            PortState::TransmitBreak(_) | PortState::TransmitData(_) => {
                self.ignore(IgnoredEvent::BreakWhileTransmitting);
                None
            },
            PortState::RecvRdmDiscoveryReply => {
                log::debug!("break during discovery reply, collision");
                self.set_state(PortState::RecvRdmDiscoveryReplyCollision);
                None
            },
            PortState::RecvRdmDiscoveryReplyCollision => None,
            PortState::ExpectRdmReplyBreak => {
                if self.start_reception(PortState::RecvRdmReplyData) {
                    // the deadline now covers the whole reply package
                    let reply_timeout = self.config.rdm_reply_timeout_us
                        + RDM_MAX_PACKAGE_SIZE as u32 * SLOT_MICROS;
                    self.timer.arm(reply_timeout);
                } else {
                    // the pending deadline still ends the exchange as a timeout
                    log::warn!(
                        "port {}: no frame buffer for the rdm reply, reply lost",
                        self.config.port
                    );
                }
                None
            },
            PortState::RecvRdmReplyData => {
                log::debug!("break inside rdm reply");
                self.fail_reply()
            },
        }
    }

    fn on_data(&mut self, count: usize) -> Option<TransactionOutcome> {
        let mut outcome = None;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut remaining = count;

        while remaining > 0 {
            let read = self.uart.read_bytes(&mut chunk[..remaining.min(READ_CHUNK_SIZE)]);
            if read == 0 {
                break;
            }
            remaining = remaining.saturating_sub(read);

            for &byte in &chunk[..read] {
                if let Some(result) = self.on_byte(byte) {
                    outcome.get_or_insert(result);
                }
            }
        }

        outcome
    }

    fn on_byte(&mut self, byte: u8) -> Option<TransactionOutcome> {
        match self.state {
            PortState::Idle | PortState::ExpectRdmReplyBreak => {
                self.ignore(IgnoredEvent::DataWithoutBreak);
                None
            },
            PortState::IdleAfterDmx00 => {
                if self.slot_count_lock.is_locked()
                    && (self.slot_count_lock.matching_slot_count() as usize) < DMX_MAX_SLOTS
                {
                    log::debug!(
                        "data after a {} slot frame, unlocking slot count",
                        self.slot_count_lock.matching_slot_count()
                    );
                    self.slot_count_lock.unlock();
                    self.stats.slot_count_unlocks += 1;
                }
                self.set_state(PortState::Idle);
                None
            },
            PortState::ExpectStartcode => {
                self.receive_startcode(byte);
                None
            },
            PortState::ReceiveData => {
                if self.receive_slot(byte) {
                    self.complete_reception();
                    self.transmit_next();
                }
                None
            },
            PortState::TransmitBreak(_) | PortState::TransmitData(_) => {
                self.ignore(IgnoredEvent::DataWhileTransmitting);
                None
            },
            PortState::RecvRdmDiscoveryReply => {
                self.discovery_reply.push(byte);
                if self.discovery_reply.is_complete() {
                    let reply = self.discovery_reply.decode();
                    return self.finish_transaction(TransactionOutcome::Discovery(reply));
                }
                None
            },
            PortState::RecvRdmDiscoveryReplyCollision => None,
            PortState::RecvRdmReplyData => self.receive_reply_byte(byte),
        }
    }

    fn on_line_error(&mut self, mask: u8) -> Option<TransactionOutcome> {
        self.stats.line_errors += 1;
        log::debug!("line error {:#04X} in {:?}", mask, self.state);

        if self.state == PortState::RecvRdmDiscoveryReply {
            self.set_state(PortState::RecvRdmDiscoveryReplyCollision);
        }

        None
    }

    fn on_tx_space(&mut self) -> Option<TransactionOutcome> {
        match self.state {
            PortState::TransmitData(_) => self.write_pending(),
            PortState::TransmitBreak(_) => {},
            _ => self.ignore(IgnoredEvent::TxEventWhileNotTransmitting),
        }

        None
    }

    fn on_tx_complete(&mut self) -> Option<TransactionOutcome> {
        match self.state {
            PortState::TransmitData(_) => {
                if self.tx.as_ref().is_some_and(|tx| !tx.is_written()) {
                    self.write_pending();
                } else {
                    self.finish_transmit();
                }
            },
            _ => self.ignore(IgnoredEvent::TxEventWhileNotTransmitting),
        }

        None
    }

    fn on_timer(&mut self, token: TimerToken) -> Option<TransactionOutcome> {
        if !self.timer.expire(token) {
            log::trace!("stale timer {:?}", token);
            return None;
        }

        match self.state {
            PortState::TransmitBreak(mode) => {
                self.uart.set_break(false);
                self.set_state(PortState::TransmitData(mode));
                self.write_pending();
                None
            },
            PortState::RecvRdmDiscoveryReply => {
                let reply = self.discovery_reply.decode();
                self.finish_transaction(TransactionOutcome::Discovery(reply))
            },
            PortState::RecvRdmDiscoveryReplyCollision => {
                self.finish_transaction(TransactionOutcome::Discovery(DiscoveryReply::Collision))
            },
            PortState::ExpectRdmReplyBreak => self.finish_transaction(TransactionOutcome::Timeout),
            PortState::RecvRdmReplyData => self.fail_reply(),
            _ => {
                self.ignore(IgnoredEvent::TimerWithoutDeadline);
                None
            },
        }
    }

    /// Returns false if no buffer was available. The caller reports the lost reception.
    fn start_reception(&mut self, next_state: PortState) -> bool {
        match self.sink.acquire(self.config.port) {
            Some(frame) => {
                self.rx = Some(RxContext {
                    frame,
                    expected_slots: DMX_MAX_SLOTS,
                });
                self.set_state(next_state);
                true
            },
            None => {
                self.stats.dropped_receptions += 1;
                false
            },
        }
    }

    fn receive_startcode(&mut self, startcode: u8) {
        let expected_slots = match startcode {
            DMX_NULL_START => self.slot_count_lock.expected_slots(),
            // narrowed once the parameter data length is known
            SC_RDM => RDM_MAX_PACKAGE_SIZE - 1,
            _ => DMX_MAX_SLOTS,
        };

        let Some(rx) = self.rx.as_mut() else {
            self.set_state(PortState::Idle);
            return;
        };
        rx.frame.startcode = startcode;
        rx.frame.flags.set_is_rdm(startcode == SC_RDM);
        rx.expected_slots = expected_slots;

        self.set_state(PortState::ReceiveData);
        if expected_slots == 0 {
            self.complete_reception();
            self.transmit_next();
        }
    }

    /// Stores one slot. Returns true once the frame holds all the slots it is expected to have.
    fn receive_slot(&mut self, byte: u8) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };

        if rx.frame.payload.push(byte).is_err() {
            return true;
        }

        if rx.frame.startcode == SC_RDM && rx.frame.payload.len() == RDM_PDL_OFFSET {
            let parameter_data_length = byte as usize;
            rx.expected_slots = RDM_HEADER_SIZE + parameter_data_length + RDM_CHECKSUM_SIZE - 1;
        }

        rx.frame.payload.len() >= rx.expected_slots
    }

    fn complete_reception(&mut self) {
        let Some(rx) = self.rx.take() else {
            self.set_state(PortState::Idle);
            return;
        };

        self.stats.frames_received += 1;
        log::trace!(
            "port {}: received frame with start code {:#04X} and {} slots",
            self.config.port,
            rx.frame.startcode,
            rx.frame.payload_size()
        );

        if rx.frame.startcode == DMX_NULL_START {
            if self.slot_count_lock.update(rx.frame.payload_size()) {
                self.stats.slot_count_unlocks += 1;
            }
            self.set_state(PortState::IdleAfterDmx00);
        } else {
            self.set_state(PortState::Idle);
        }

        self.sink.push_received(rx.frame);
    }

    fn receive_reply_byte(&mut self, byte: u8) -> Option<TransactionOutcome> {
        let Some(rx) = self.rx.as_mut() else {
            return self.fail_reply();
        };

        if rx.expected_slots == DMX_MAX_SLOTS && rx.frame.startcode == DMX_NULL_START {
            // first byte after the break
            if byte != SC_RDM {
                log::debug!("reply with start code {:#04X}", byte);
                return self.fail_reply();
            }

            rx.frame.startcode = SC_RDM;
            rx.frame.flags.set_is_rdm(true);
            rx.expected_slots = RDM_MAX_PACKAGE_SIZE - 1;
            return None;
        }

        if !self.receive_slot(byte) {
            return None;
        }

        let rx = self.rx.take()?;
        let is_valid = RdmPacketView::decode(&rx.frame.to_wire()).is_ok();
        self.stats.frames_received += 1;

        if is_valid {
            self.finish_transaction(TransactionOutcome::Reply(rx.frame))
        } else {
            log::debug!("damaged rdm reply");
            self.sink.release(rx.frame);
            self.finish_transaction(TransactionOutcome::DamagedReply)
        }
    }

    fn fail_reply(&mut self) -> Option<TransactionOutcome> {
        if let Some(rx) = self.rx.take() {
            self.sink.release(rx.frame);
        }

        self.finish_transaction(TransactionOutcome::DamagedReply)
    }

    fn finish_transaction(&mut self, outcome: TransactionOutcome) -> Option<TransactionOutcome> {
        self.timer.complete();
        self.discovery_reply.clear();
        self.set_state(PortState::Idle);
        log::debug!("port {}: exchange finished with {:?}", self.config.port, outcome);

        self.transmit_next();
        Some(outcome)
    }

    fn begin_transmit(&mut self, mut frame: Dmx512Frame) -> TransmitMode {
        let exchange = classify(&frame);
        let mode = exchange.mode();

        frame.flags.set_is_transmit(true);
        if frame.startcode == SC_RDM {
            frame.flags.set_is_rdm(true);
        }
        if exchange == Exchange::Discovery {
            frame.flags.set_is_rdm_discovery(true);
        }

        let no_break = frame.flags.no_break();
        let break_micros = frame.break_micros();

        self.tx = Some(TxContext {
            wire: frame.to_wire(),
            frame,
            cursor: 0,
            exchange,
        });
        self.uart.set_output_lines(LINE_TX_ENABLE, LINE_TX_ENABLE);

        if no_break {
            self.set_state(PortState::TransmitData(mode));
            self.write_pending();
        } else {
            self.uart.set_break(true);
            self.timer.arm(break_micros);
            self.set_state(PortState::TransmitBreak(mode));
        }

        mode
    }

    fn write_pending(&mut self) {
        let Some(tx) = self.tx.as_mut() else {
            return;
        };

        while !tx.is_written() {
            let written = self.uart.write_bytes(&tx.wire[tx.cursor..]);
            if written == 0 {
                break;
            }
            tx.cursor += written;
        }
    }

    fn finish_transmit(&mut self) {
        self.uart.set_output_lines(LINE_TX_ENABLE, 0);

        let Some(tx) = self.tx.take() else {
            self.set_state(PortState::Idle);
            return;
        };

        self.stats.frames_transmitted += 1;
        let exchange = tx.exchange;
        self.sink.release(tx.frame);

        match exchange {
            Exchange::OneWay => {
                self.set_state(PortState::Idle);
                self.transmit_next();
            },
            Exchange::Discovery => {
                self.discovery_reply.clear();
                self.set_state(PortState::RecvRdmDiscoveryReply);
                self.timer.arm(self.config.discovery_reply_timeout_us);
            },
            Exchange::Standard => {
                self.set_state(PortState::ExpectRdmReplyBreak);
                self.timer.arm(self.config.rdm_reply_timeout_us);
            },
        }
    }

    /// Starts the next frame the sink has queued, if the wire is free.
    fn transmit_next(&mut self) {
        if !self.state.is_idle() || self.tx.is_some() {
            return;
        }

        if let Some(frame) = self.sink.next_to_transmit() {
            self.begin_transmit(frame);
        }
    }

    fn ignore(&mut self, ignored: IgnoredEvent) {
        log::warn!(
            "port {}: ignoring {:?} in {:?}",
            self.config.port,
            ignored,
            self.state
        );
        self.stats.unexpected_events += 1;
        self.stats.last_ignored_event = Some(ignored);
    }

    fn set_state(&mut self, state: PortState) {
        if self.state != state {
            log::trace!("port {}: {:?} -> {:?}", self.config.port, self.state, state);
            self.state = state;
        }
    }
}

fn classify(frame: &Dmx512Frame) -> Exchange {
    if frame.startcode != SC_RDM || frame.flags.no_break() {
        return Exchange::OneWay;
    }

    let wire = frame.to_wire();
    let Ok(package) = RdmPacketView::decode(&wire) else {
        return Exchange::OneWay;
    };

    let command_class = package.command_class();
    if command_class == RequestCommandClass::DiscoveryCommand as u8
        && package.pid() == pids::DISC_UNIQUE_BRANCH
    {
        Exchange::Discovery
    } else if is_request_command_class(command_class) && !package.destination().is_broadcast() {
        Exchange::Standard
    } else {
        Exchange::OneWay
    }
}
