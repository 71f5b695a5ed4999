// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB control endpoint, IN direction.
//!
//! This crate drives the data and status stages of control reads on EP0: it
//! takes a response that something else has decided on, splits it into
//! packets of at most `bMaxPacketSize0` bytes, and ends the transfer the way
//! the host expects. That includes the trailing zero-length packet needed when
//! the response is short of what the host asked for and happens to end on a
//! packet boundary.
//!
//! It does not talk to hardware and it does not decide what to send. Those are
//! the `Transport` and `ControlHandler` traits respectively. Feed it bus events
//! through `ControlEndpoint::service` from wherever you notice them (an
//! interrupt handler, or a polling loop), one at a time.
//!
//! ```
//! use usb_control_in::{ControlEndpoint, ControlHandler, Decision, Ep0Event, SetupRequest, Transport};
//!
//! struct Bus;
//! impl Transport for Bus {
//!     fn transmit(&mut self, packet: &[u8]) -> usize { packet.len() }
//!     fn stall(&mut self) {}
//!     fn nak(&mut self, _enable: bool) {}
//!     fn set_device_address(&mut self, _addr: u8) {}
//! }
//!
//! struct Descriptors;
//! impl ControlHandler for Descriptors {
//!     fn dispatch(&mut self, _req: &SetupRequest) -> Decision { Decision::accept(18) }
//!     fn response(&self) -> &[u8] { &[0; 18] }
//! }
//!
//! let mut ep0 = ControlEndpoint::new(Bus, Descriptors, 8).unwrap();
//! ep0.service(Ep0Event::Setup([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]));
//! ep0.service(Ep0Event::InComplete);
//! ```

#![no_std]

mod trace;

pub mod control;
pub mod setup;

pub use control::{ConfigError, ControlEndpoint, ControlHandler, ControlState, Decision, Ep0Event, Phase, Transport};
pub use setup::{SetupRequest, UsbDir, UsbSetupPacket, UsbSetupRequest};
