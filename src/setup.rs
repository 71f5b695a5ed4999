// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SETUP packet structure and the handful of constants needed to interpret it.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In a SETUP packet's `request_type`, the direction
/// is the top bit: clear for OUT, set (`0x80`) for IN.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbDir {
    Out = 0,
    In = 0x80,
}

impl UsbDir {
    /// Endpoint address for endpoint number `num` in this direction.
    pub const fn endpoint(self, num: u8) -> u8 {
        num | self as u8
    }

    pub const fn of_endpoint_addr(addr: u8) -> Self {
        if addr & Self::In as u8 != 0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Standard SETUP requests this crate needs to recognize.
///
/// Everything else is passed through to the `ControlHandler` untouched; this
/// enum exists so that the core can spot `SetAddress`, whose effect must be
/// deferred past the status stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbSetupRequest {
    /// Control read of a descriptor. The usual source of short responses.
    GetDescriptor = 0x06,
    /// New bus address in the low bits of `value`. No data stage.
    SetAddress = 0x05,
    SetConfiguration = 0x09,
}

/// Layout of an 8-byte USB SETUP packet, as it arrives off the wire.
#[repr(C)]
#[derive(Debug, AsBytes, FromBytes, Unaligned)]
pub struct UsbSetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: U16<LittleEndian>,
    pub index: U16<LittleEndian>,
    pub length: U16<LittleEndian>,
}

/// A decoded SETUP request.
///
/// This is a copy of the packet, not a reference into it, because the buffer
/// the packet arrived in is typically reused by the hardware long before the
/// transfer it describes has finished.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupRequest {
    /// Direction in the top bit, then type and recipient. `0` is a standard,
    /// device-directed OUT request.
    pub request_type: u8,
    /// Request number. Standard requests are in `UsbSetupRequest`.
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: u16,
    pub index: u16,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: u16,
}

impl SetupRequest {
    pub const fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// Decodes a SETUP packet. Returns `None` if `bytes` isn't exactly the
    /// size of a SETUP packet.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let packet = LayoutVerified::<_, UsbSetupPacket>::new(bytes)?.into_ref();
        Some(Self::from(packet))
    }

    /// Re-encodes this request in wire format.
    pub fn to_bytes(&self) -> [u8; 8] {
        let packet = UsbSetupPacket {
            request_type: self.request_type,
            request: self.request,
            value: U16::new(self.value),
            index: U16::new(self.index),
            length: U16::new(self.length),
        };
        let mut out = [0; 8];
        out.copy_from_slice(packet.as_bytes());
        out
    }

    pub fn direction(&self) -> UsbDir {
        UsbDir::of_endpoint_addr(self.request_type)
    }

    /// Decodes the request number, if it's one we know.
    pub fn standard_request(&self) -> Option<UsbSetupRequest> {
        UsbSetupRequest::from_u8(self.request)
    }

    /// Checks for a standard, device-directed `SetAddress`. The new address
    /// must not be applied until after the status stage, since the status
    /// stage itself still goes out on the old address.
    pub fn is_set_address(&self) -> bool {
        self.request_type == 0 && self.standard_request() == Some(UsbSetupRequest::SetAddress)
    }
}

impl From<&UsbSetupPacket> for SetupRequest {
    fn from(p: &UsbSetupPacket) -> Self {
        Self {
            request_type: p.request_type,
            request: p.request,
            value: p.value.get(),
            index: p.index.get(),
            length: p.length.get(),
        }
    }
}
