// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The control endpoint state machine, IN direction.
//!
//! A control read goes SETUP, then one or more DATA IN packets, then a
//! zero-length status packet from the host (STATUS OUT). A control request
//! with no data stage goes SETUP, then a zero-length status packet from _us_
//! (STATUS IN).
//!
//! The subtle part is ending the data stage. The host stops asking for data
//! when it has either received `length` bytes, or received a packet shorter
//! than the endpoint's max packet size. If we're sending less than the host
//! asked for, and what we're sending is an exact multiple of the max packet
//! size, the last real packet is full-size and the host can't tell that it was
//! the last one. In that case we have to follow it with a zero-length packet
//! (USB 2.0 section 8.5.3.2).
//!
//! Whether that ZLP is needed isn't decided up front. At setup time we only
//! record whether there's a shortfall (`may_need_zlp`). The chunker then
//! notices, at the moment it's about to send a packet that exactly empties the
//! response, that a ZLP has to follow, and holds the transfer open for one more
//! packet.

use core::fmt;

use crate::setup::{SetupRequest, UsbDir};
use crate::trace::{ep0_debug, ep0_trace, ep0_warn};

/// Where the control endpoint is in a transfer.
///
/// Only the IN-side phases are ever entered by this crate; the OUT data phases
/// exist so that a state shared with an OUT-side implementation has somewhere
/// to go, and are treated as protocol violations here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    /// No transfer in progress. Ready for SETUP.
    #[default]
    Idle,
    /// The endpoint is stalled. Only a new SETUP (or bus reset) gets us out.
    Stalled,
    /// Data stage, more packets (possibly a ZLP) to follow.
    DataIn,
    /// The final data packet has been handed to the transport.
    LastDataIn,
    /// Zero-length status packet handed to the transport.
    StatusIn,
    /// OUT data stage. Never entered here; events in it stall.
    DataOut,
    /// Last OUT data packet. Never entered here; events in it stall.
    LastDataOut,
    /// Waiting for the host's zero-length status packet.
    StatusOut,
}

/// Progress of the in-flight transfer.
///
/// This is created fresh by every accepted SETUP. Nothing in it is carried
/// from one transfer to the next.
#[derive(Copy, Clone, Debug, Default)]
pub struct ControlState {
    pub(crate) phase: Phase,
    /// Copy of the request being served.
    pub(crate) request: SetupRequest,
    /// Offset into the handler's response of the next byte to send, or `None`
    /// once the final chunk has gone out.
    pub(crate) cursor: Option<usize>,
    /// Response bytes not yet sent.
    pub(crate) remaining: usize,
    /// Set at setup time if the response is shorter than the host asked for.
    /// Cleared when the final packet goes out.
    pub(crate) may_need_zlp: bool,
    /// The handler asked to hear about completion, and hasn't yet.
    pub(crate) completion: bool,
}

impl ControlState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn request(&self) -> &SetupRequest {
        &self.request
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn may_need_zlp(&self) -> bool {
        self.may_need_zlp
    }
}

/// The hardware side of the control endpoint.
pub trait Transport {
    /// Queues one packet on EP0 IN and returns the number of bytes accepted.
    /// An empty `packet` is a ZLP and must be sent as such.
    fn transmit(&mut self, packet: &[u8]) -> usize;

    /// Stalls EP0, so that the host sees a STALL handshake on its next token.
    fn stall(&mut self);

    /// Sets or clears NAK on EP0 OUT.
    fn nak(&mut self, enable: bool);

    /// Moves the device to a new bus address.
    fn set_device_address(&mut self, addr: u8);
}

/// What the handler decided to do about a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Respond with the first `len` bytes of `ControlHandler::response`. If
    /// `notify` is set, `ControlHandler::on_complete` is called once the status
    /// stage is reached.
    Accept { len: u16, notify: bool },
    /// Not supported. The endpoint will be stalled.
    Reject,
}

impl Decision {
    pub const fn accept(len: u16) -> Self {
        Self::Accept { len, notify: false }
    }

    pub const fn accept_and_notify(len: u16) -> Self {
        Self::Accept { len, notify: true }
    }
}

/// Decides what to send in response to each request. This is where
/// descriptors, vendor requests and so on live.
pub trait ControlHandler {
    fn dispatch(&mut self, request: &SetupRequest) -> Decision;

    /// The bytes backing the most recently accepted response. These must not
    /// change until the transfer finishes, since the chunker reads them a
    /// packet at a time. If they shrink under the cursor, the endpoint stalls.
    fn response(&self) -> &[u8];

    /// Called once at the status stage of a request accepted with `notify`.
    fn on_complete(&mut self, _request: &SetupRequest) {}
}

/// Bus events on the control endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ep0Event {
    /// A SETUP packet arrived, in wire format.
    Setup([u8; 8]),
    /// The host collected the packet we last queued on EP0 IN.
    InComplete,
    /// The host sent us a packet on EP0 OUT. During a control read this is the
    /// zero-length status packet.
    OutComplete,
    /// The host reset the bus.
    BusReset,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// EP0 can't carry zero-byte packets and nothing else.
    ZeroMaxPacketSize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMaxPacketSize => f.write_str("EP0 max packet size must be nonzero"),
        }
    }
}

/// One control endpoint and everything needed to drive it.
pub struct ControlEndpoint<T, H> {
    transport: T,
    handler: H,
    max_packet_size: usize,
    state: ControlState,
}

impl<T: Transport, H: ControlHandler> ControlEndpoint<T, H> {
    /// Creates an idle control endpoint. `max_packet_size0` is the
    /// `bMaxPacketSize0` from the device descriptor.
    pub fn new(transport: T, handler: H, max_packet_size0: u8) -> Result<Self, ConfigError> {
        if max_packet_size0 == 0 {
            return Err(ConfigError::ZeroMaxPacketSize);
        }
        Ok(Self {
            transport,
            handler,
            max_packet_size: usize::from(max_packet_size0),
            state: ControlState::default(),
        })
    }

    /// Handles one bus event.
    pub fn service(&mut self, event: Ep0Event) {
        match event {
            Ep0Event::Setup(packet) => self.setup(&packet),
            Ep0Event::InComplete => self.control_in(),
            Ep0Event::OutComplete => self.control_out(),
            Ep0Event::BusReset => {
                ep0_debug!("ep0: bus reset in {:?}", self.state.phase);
                self.state = ControlState::default();
            }
        }
    }

    /// Starts a request the handler has already ruled on. This either stalls,
    /// queues the zero-length status packet, or queues the first data packet.
    ///
    /// Whatever transfer was in progress is abandoned.
    pub fn begin_control_in(&mut self, request: SetupRequest, decision: Decision) {
        let (len, notify) = match decision {
            Decision::Accept { len, notify } => (len, notify),
            Decision::Reject => {
                ep0_debug!("ep0: request {:?} rejected", request);
                self.stall();
                return;
            }
        };

        self.state = ControlState {
            phase: Phase::Idle,
            request,
            cursor: None,
            remaining: 0,
            may_need_zlp: false,
            completion: notify,
        };

        if request.length == 0 {
            // No data stage. Acknowledge straight away.
            self.transport.transmit(&[]);
            self.state.phase = Phase::StatusIn;
            return;
        }

        // Never send more than the host asked for, nor more than the handler
        // actually has.
        let len = usize::from(len)
            .min(usize::from(request.length))
            .min(self.handler.response().len());

        self.state.cursor = Some(0);
        self.state.remaining = len;
        self.state.may_need_zlp = len < usize::from(request.length);

        self.next_chunk();
    }

    /// Sends the next data packet, or stalls if the handler's response no
    /// longer covers what's left to send.
    fn next_chunk(&mut self) {
        let sent = send_chunk(
            &mut self.state,
            &mut self.transport,
            self.handler.response(),
            self.max_packet_size,
        );
        if !sent {
            ep0_warn!("ep0: response shrank under the cursor, stalling");
            self.stall();
        }
    }

    fn setup(&mut self, packet: &[u8]) {
        let Some(request) = SetupRequest::parse(packet) else {
            self.stall();
            return;
        };
        ep0_trace!("ep0: setup {:?}", request);

        if request.direction() == UsbDir::Out && request.length != 0 {
            // Control writes need an OUT data stage, which we don't do.
            ep0_debug!("ep0: control write not supported");
            self.stall();
            return;
        }

        let decision = self.handler.dispatch(&request);
        self.begin_control_in(request, decision);
    }

    fn control_in(&mut self) {
        match self.state.phase {
            Phase::DataIn => self.next_chunk(),
            Phase::LastDataIn => {
                // All data collected. Let the host's status packet in.
                self.state.phase = Phase::StatusOut;
                self.transport.nak(false);
            }
            Phase::StatusIn => {
                self.complete();

                // The status stage went out on our old address; only now can
                // we move.
                let request = self.state.request;
                if request.is_set_address() {
                    ep0_debug!("ep0: address -> {}", request.value as u8);
                    self.transport.set_device_address(request.value as u8);
                }
                self.state.phase = Phase::Idle;
            }
            _ => self.stall_transaction(),
        }
    }

    fn control_out(&mut self) {
        match self.state.phase {
            Phase::StatusOut => {
                self.complete();
                self.state.phase = Phase::Idle;
            }
            _ => self.stall_transaction(),
        }
    }

    fn complete(&mut self) {
        if core::mem::take(&mut self.state.completion) {
            self.handler.on_complete(&self.state.request);
        }
    }

    /// Stalls because the transfer can't go on, leaving the endpoint stalled
    /// until the next SETUP.
    fn stall(&mut self) {
        self.transport.stall();
        self.state.phase = Phase::Stalled;
    }

    /// Stalls because an event arrived that doesn't fit the current phase. The
    /// phase is left as-is.
    fn stall_transaction(&mut self) {
        ep0_debug!("ep0: unexpected event in {:?}, stalling", self.state.phase);
        self.transport.stall();
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_parts(self) -> (T, H) {
        (self.transport, self.handler)
    }
}

/// Queues exactly one packet of the data stage and updates `state` to match.
///
/// `data` is the handler's response. Returns `false`, having sent nothing and
/// left `state` alone, if the range described by `state.cursor` and
/// `state.remaining` isn't inside it.
fn send_chunk(state: &mut ControlState, transport: &mut impl Transport, data: &[u8], max_packet: usize) -> bool {
    let offset = state.cursor.unwrap_or(data.len());

    let (len, last) = if state.remaining > max_packet {
        // More to come after this one.
        (max_packet, false)
    } else if state.may_need_zlp && state.remaining == max_packet {
        // Last real packet, but it's full-size and short of what the host
        // wanted. Stay in DataIn; the next call lands below with nothing left
        // and sends the ZLP.
        (max_packet, false)
    } else {
        // Short packet, or the ZLP.
        (state.remaining, true)
    };

    let Some(packet) = data.get(offset..offset + len) else {
        return false;
    };
    transmit(transport, packet, state.phase);

    if last {
        state.phase = Phase::LastDataIn;
        state.may_need_zlp = false;
        state.remaining = 0;
        state.cursor = None;
    } else {
        state.phase = Phase::DataIn;
        state.cursor = Some(offset + len);
        state.remaining -= len;
    }
    true
}

fn transmit(transport: &mut impl Transport, packet: &[u8], phase: Phase) {
    ep0_trace!("ep0: in {} bytes ({:?})", packet.len(), phase);
    let sent = transport.transmit(packet);
    if sent != packet.len() {
        ep0_warn!("ep0: transport took {} of {} bytes", sent, packet.len());
    }
}
