//! DMX512 (ANSI E1.11) and RDM (ANSI E1.20) link layer for half duplex RS485 uarts.
//!
//! The core is `no_std` and `no_alloc`: [dmx_port::DmxPort] turns uart events into frames and
//! runs the single outstanding RDM exchange of a line, [rdm_codec] reads and writes RDM packages
//! and [rdm_responder::RdmResponder] answers requests on the device side. Timers and the uart
//! are traits, so the same state machine runs from an interrupt handler or an async task.
//!
//! With the `std` feature a tokio task owns the port ([port_task]), and
//! [dmx_controller::RdmController] plus [rdm_discovery::RdmDiscoveryEngine] build on it.
//!
//! Please refer to the [official specifications](https://tsp.esta.org/) published by the ESTA.
//!
//! <div class="warning">This library is wip, it has not yet received extensive testing and the api
//! might not be final.</div>
//!
//! # Usage
//!
//! ## Controller
//!
//! ```no_run
//! use dmx_rdm_port::dmx_controller::{RdmController, RdmControllerConfig};
//! use dmx_rdm_port::port_task::{spawn_port, PortTaskConfig};
//! use dmx_rdm_port::rdm_discovery::{DiscoveryConfig, RdmDiscoveryEngine};
//! use dmx_rdm_port::uart_transport::{UartEvent, UartTransport};
//! use dmx_rdm_port::unique_identifier::PackageAddress;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Rs485;
//!
//! impl UartTransport for Rs485 {
//!     fn write_bytes(&mut self, buffer: &[u8]) -> usize {
//!         buffer.len()
//!     }
//!
//!     fn read_bytes(&mut self, _buffer: &mut [u8]) -> usize {
//!         0
//!     }
//!
//!     fn set_break(&mut self, _on: bool) {}
//!
//!     fn set_output_lines(&mut self, _mask: u32, _values: u32) {}
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Fed by the interrupt handler of the uart.
//! let (_uart_events, events) = mpsc::unbounded_channel::<UartEvent>();
//! let (port, _received) = spawn_port(Rs485, events, PortTaskConfig::default())?;
//!
//! let controller = RdmController::new(port, &RdmControllerConfig::default());
//! let mut discovery = RdmDiscoveryEngine::new(controller, DiscoveryConfig::default());
//!
//! // Unmutes all responders, then searches the whole uid space.
//! let devices = discovery.full_discovery(&CancellationToken::new()).await?;
//!
//! let controller = discovery.bus_mut();
//! for device in devices {
//!     controller
//!         .rdm_set_identify(PackageAddress::Device(device), true)
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Responder
//!
//! ```rust
//! use dmx_rdm_port::dmx_frame::Dmx512Frame;
//! use dmx_rdm_port::rdm_responder::{RdmResponder, RdmResponderConfig};
//! use dmx_rdm_port::unique_identifier::Uid;
//!
//! let mut responder = RdmResponder::new(RdmResponderConfig::new(Uid::new(0x7FF0, 1)));
//!
//! // Null start code frames carry no requests.
//! let frame = Dmx512Frame::dmx(0, &[255, 0, 0]);
//! assert!(responder.handle_frame(&frame, &mut ()).unwrap().is_none());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod command_class;
pub mod consts;
/// Decoding of DISC_UNIQUE_BRANCH replies.
pub mod discovery_reply;
/// Async RDM controller on top of a port task.
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod dmx_controller;
pub mod dmx_frame;
pub mod dmx_port;
pub mod frame_sink;
mod layouts;
pub mod pids;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod port_task;
pub mod rdm_codec;
pub mod rdm_data;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod rdm_discovery;
/// Parser for handling rdm requests on the device side.
pub mod rdm_responder;
pub mod rdm_transaction;
pub mod rdm_types;
pub mod slot_count_lock;
pub mod types;
pub mod uart_transport;
pub mod unique_identifier;
