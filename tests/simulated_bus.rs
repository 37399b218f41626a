//! Discovery and RDM exchanges through the port task against responders on a simulated RS485 bus.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use dmx_rdm_port::consts::DMX_NULL_START;
use dmx_rdm_port::dmx_controller::{RdmController, RdmControllerConfig};
use dmx_rdm_port::dmx_frame::Dmx512Frame;
use dmx_rdm_port::port_task::{spawn_port, PortTaskConfig};
use dmx_rdm_port::rdm_discovery::{DiscoveryConfig, RdmDiscoveryEngine};
use dmx_rdm_port::rdm_responder::{RdmResponder, RdmResponderConfig};
use dmx_rdm_port::uart_transport::{line_error, UartEvent, UartTransport};
use dmx_rdm_port::unique_identifier::{PackageAddress, Uid};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Every frame the controller writes reaches all responders. Their answers come back as
/// received bytes, merged bitwise when they overlap.
struct SimulatedBus {
    events: mpsc::UnboundedSender<UartEvent>,
    responders: Vec<RdmResponder>,
    incoming: Arc<Mutex<VecDeque<u8>>>,
    collisions: usize,
    /// Overlapping replies also raise a framing error.
    line_errors: bool,
    /// Responder `n` leaves out the first `n % 8` preamble bytes of its discovery replies.
    short_preambles: bool,
}

impl SimulatedBus {
    fn answer(&mut self, request: &Dmx512Frame) {
        let short_preambles = self.short_preambles;
        let answers: Vec<(bool, Vec<u8>)> = self
            .responders
            .iter_mut()
            .enumerate()
            .filter_map(|(index, responder)| {
                let answer = responder.handle_frame(request, &mut ()).ok().flatten()?;
                let wire = answer.to_wire();
                let skip = if short_preambles && answer.flags.no_break() {
                    index % 8
                } else {
                    0
                };
                Some((answer.flags.no_break(), wire[skip..].to_vec()))
            })
            .collect();

        let Some((no_break, first)) = answers.first() else {
            return;
        };

        let (no_break, mut wire) = (*no_break, first.clone());
        if answers.len() > 1 {
            self.collisions += 1;
            for (_, other) in &answers[1..] {
                for (byte, other_byte) in wire.iter_mut().zip(other.iter()) {
                    *byte |= *other_byte;
                }
            }
            if self.line_errors {
                let _ = self.events.send(UartEvent::LineError(line_error::FRAMING));
            }
        }

        if let Ok(mut incoming) = self.incoming.lock() {
            incoming.extend(wire.iter().copied());
        }
        if !no_break {
            let _ = self.events.send(UartEvent::BreakDetected);
        }
        let _ = self.events.send(UartEvent::DataAvailable(wire.len()));
    }
}

impl UartTransport for SimulatedBus {
    fn write_bytes(&mut self, buffer: &[u8]) -> usize {
        let _ = self.events.send(UartEvent::TxComplete);

        if let Some((startcode, payload)) = buffer.split_first() {
            let request = Dmx512Frame::with_startcode(0, *startcode, payload);
            self.answer(&request);
        }

        buffer.len()
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> usize {
        let Ok(mut incoming) = self.incoming.lock() else {
            return 0;
        };

        let count = buffer.len().min(incoming.len());
        for (slot, byte) in buffer.iter_mut().zip(incoming.drain(..count)) {
            *slot = byte;
        }
        count
    }

    fn set_break(&mut self, _on: bool) {}

    fn set_output_lines(&mut self, _mask: u32, _values: u32) {}
}

struct Setup {
    controller: RdmController<SimulatedBus>,
    received: mpsc::Receiver<Dmx512Frame>,
    events: mpsc::UnboundedSender<UartEvent>,
    incoming: Arc<Mutex<VecDeque<u8>>>,
}

fn setup(devices: &[Uid], config: PortTaskConfig) -> Setup {
    setup_bus(devices, config, true)
}

/// Without line errors, overlapping discovery replies are only told apart by their bytes.
fn setup_bus(devices: &[Uid], config: PortTaskConfig, line_errors: bool) -> Setup {
    let (events, uart_events) = mpsc::unbounded_channel();
    let incoming = Arc::new(Mutex::new(VecDeque::new()));
    let bus = SimulatedBus {
        events: events.clone(),
        responders: devices
            .iter()
            .map(|uid| RdmResponder::new(RdmResponderConfig::new(*uid)))
            .collect(),
        incoming: incoming.clone(),
        collisions: 0,
        line_errors,
        short_preambles: !line_errors,
    };

    let (port, received) = spawn_port(bus, uart_events, config).unwrap();
    Setup {
        controller: RdmController::new(port, &RdmControllerConfig::default()),
        received,
        events,
        incoming,
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_discovery() {
    let devices = [
        Uid::new(0x0001, 0x0000_0001),
        Uid::new(0x4D41, 0x0000_1000),
        Uid::new(0x4D41, 0x0000_1001),
        Uid::new(0x7FF0, 0x1234_5678),
        Uid::new(0xFFFF, 0xFFFF_FFFE),
    ];
    let setup = setup(&devices, PortTaskConfig::default());
    let mut engine = RdmDiscoveryEngine::new(setup.controller, DiscoveryConfig::default());

    let found = engine.full_discovery(&CancellationToken::new()).await.unwrap();

    assert_eq!(found, BTreeSet::from(devices));
    let bus = engine.into_bus().into_port().shutdown().await.unwrap();
    assert!(bus.collisions > 0);
    assert!(bus.responders.iter().all(RdmResponder::is_muted));
}

#[tokio::test(start_paused = true)]
async fn test_full_discovery_from_reply_bytes() {
    let devices = [
        Uid::new(0x0001, 0x0000_0001),
        Uid::new(0x0001, 0x0000_0002),
        Uid::new(0x4D41, 0x0000_1000),
        Uid::new(0x4D41, 0x0000_1001),
        Uid::new(0x4D41, 0x0000_1003),
        Uid::new(0x7FF0, 0x1234_5678),
        Uid::new(0x7FF0, 0x1234_5679),
        Uid::new(0xFFFF, 0xFFFF_FFFE),
    ];
    let setup = setup_bus(&devices, PortTaskConfig::default(), false);
    let mut engine = RdmDiscoveryEngine::new(setup.controller, DiscoveryConfig::default());

    let found = engine.full_discovery(&CancellationToken::new()).await.unwrap();

    assert_eq!(found, BTreeSet::from(devices));
    let port = engine.into_bus().into_port();
    assert_eq!(port.stats().await.unwrap().line_errors, 0);
    let bus = port.shutdown().await.unwrap();
    assert!(bus.collisions > 0);
    assert!(bus.responders.iter().all(RdmResponder::is_muted));
}

#[tokio::test(start_paused = true)]
async fn test_collision_in_small_range() {
    let devices = [Uid::from_u64(0x3), Uid::from_u64(0xC)];
    let setup = setup(&devices, PortTaskConfig::default());
    let mut engine = RdmDiscoveryEngine::new(setup.controller, DiscoveryConfig::default());

    let found = engine
        .discover(
            Uid::from_u64(0x0),
            Uid::from_u64(0xF),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(found, BTreeSet::from(devices));
    let bus = engine.into_bus().into_port().shutdown().await.unwrap();
    assert_eq!(bus.collisions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_identify_found_devices() {
    let devices = [Uid::new(0x4D41, 0x10), Uid::new(0x4D41, 0x20)];
    let setup = setup(&devices, PortTaskConfig::default());
    let mut engine = RdmDiscoveryEngine::new(setup.controller, DiscoveryConfig::default());

    let found = engine.full_discovery(&CancellationToken::new()).await.unwrap();

    let controller = engine.bus_mut();
    for device in &found {
        controller
            .rdm_set_identify(PackageAddress::Device(*device), true)
            .await
            .unwrap();
        assert!(controller.rdm_get_identify(*device).await.unwrap());
    }

    let bus = engine.into_bus().into_port().shutdown().await.unwrap();
    assert!(bus.responders.iter().all(RdmResponder::is_identifying));
}

#[tokio::test(start_paused = true)]
async fn test_un_mute_lets_devices_answer_again() {
    let devices = [Uid::new(0x4D41, 0x10)];
    let setup = setup(&devices, PortTaskConfig::default());
    let mut engine = RdmDiscoveryEngine::new(setup.controller, DiscoveryConfig::default());
    let cancel = CancellationToken::new();

    assert_eq!(engine.full_discovery(&cancel).await.unwrap().len(), 1);
    // everything is muted now
    let (first, last) = (Uid::from_u64(0x1), Uid::from_u64(0xFFFF_FFFF_FFFE));
    assert!(engine.discover(first, last, &cancel).await.unwrap().is_empty());
    assert_eq!(engine.full_discovery(&cancel).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_receives_locked_dmx_frames() {
    let config = PortTaskConfig {
        rx_frame_budget: 16,
        ..Default::default()
    };
    let mut setup = setup(&[], config);

    let mut frame = vec![DMX_NULL_START];
    frame.extend((0..100).map(|slot| slot as u8));
    for _ in 0..12 {
        setup.incoming.lock().unwrap().extend(frame.iter().copied());
        setup.events.send(UartEvent::BreakDetected).unwrap();
        setup.events.send(UartEvent::DataAvailable(frame.len())).unwrap();
    }

    // the last two frames complete without a following break
    for _ in 0..12 {
        let received = setup.received.recv().await.unwrap();
        assert_eq!(received.startcode, DMX_NULL_START);
        assert_eq!(received.payload.len(), 100);
    }

    let stats = setup.controller.port().stats().await.unwrap();
    assert_eq!(stats.frames_received, 12);
    assert_eq!(stats.dropped_receptions, 0);
}
