// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet sequences produced by whole control reads, checked against a
//! straightforward model of how a control read should end.

use proptest::prelude::*;
use usb_control_in::{ControlEndpoint, ControlHandler, Decision, Ep0Event, Phase, SetupRequest, Transport};

#[derive(Default)]
struct Wire {
    packets: Vec<Vec<u8>>,
    stalls: usize,
    naks: Vec<bool>,
    addresses: Vec<u8>,
}

impl Transport for Wire {
    fn transmit(&mut self, packet: &[u8]) -> usize {
        self.packets.push(packet.to_vec());
        packet.len()
    }
    fn stall(&mut self) {
        self.stalls += 1;
    }
    fn nak(&mut self, enable: bool) {
        self.naks.push(enable);
    }
    fn set_device_address(&mut self, addr: u8) {
        self.addresses.push(addr);
    }
}

/// Always answers with its whole buffer.
struct Fixed {
    bytes: Vec<u8>,
}

impl ControlHandler for Fixed {
    fn dispatch(&mut self, _request: &SetupRequest) -> Decision {
        Decision::accept(self.bytes.len() as u16)
    }
    fn response(&self) -> &[u8] {
        &self.bytes
    }
}

/// Packet lengths a correct device sends for a `response`-byte answer to a
/// `requested`-byte read with max packet size `mps`.
fn model(response: usize, requested: usize, mps: usize) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut left = response;
    while left > mps {
        lengths.push(mps);
        left -= mps;
    }
    lengths.push(left);
    if response > 0 && response < requested && response % mps == 0 {
        lengths.push(0);
    }
    lengths
}

/// Runs a control read to the end of its data stage.
fn run(response: u16, requested: u16, mps: u8) -> ControlEndpoint<Wire, Fixed> {
    let bytes = (0..response).map(|i| i as u8).collect();
    let mut ep = ControlEndpoint::new(Wire::default(), Fixed { bytes }, mps).unwrap();
    let req = SetupRequest::new(0x80, 0x06, 0x0200, 0, requested);
    ep.service(Ep0Event::Setup(req.to_bytes()));

    let mut guard = 0;
    while ep.phase() == Phase::DataIn {
        ep.service(Ep0Event::InComplete);
        guard += 1;
        assert!(guard <= usize::from(requested) + 2, "data stage never finished");
    }
    assert_eq!(ep.phase(), Phase::LastDataIn);
    ep.service(Ep0Event::InComplete);
    ep
}

fn read_shape() -> impl Strategy<Value = (u16, u16, u8)> {
    (1u16..600, 1u8..=64).prop_flat_map(|(requested, mps)| (0..=requested, Just(requested), Just(mps)))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0x0D_A7_A1),
        .. ProptestConfig::default()
    })]

    #[test]
    fn packets_match_model((response, requested, mps) in read_shape()) {
        let ep = run(response, requested, mps);
        let wire = ep.transport();
        let lengths: Vec<usize> = wire.packets.iter().map(Vec::len).collect();

        prop_assert_eq!(
            &lengths,
            &model(usize::from(response), usize::from(requested), usize::from(mps))
        );
        prop_assert_eq!(lengths.iter().sum::<usize>(), usize::from(response));
        prop_assert_eq!(wire.packets.concat(), ep.handler().bytes.clone());
        prop_assert_eq!(wire.stalls, 0);
        prop_assert_eq!(&wire.naks, &vec![false]);
        prop_assert_eq!(ep.phase(), Phase::StatusOut);
    }

    #[test]
    fn every_packet_but_the_last_is_full((response, requested, mps) in read_shape()) {
        let ep = run(response, requested, mps);
        let packets = &ep.transport().packets;
        let (last, rest) = packets.split_last().unwrap();
        prop_assert!(rest.iter().all(|p| p.len() == usize::from(mps)));
        prop_assert!(last.len() <= usize::from(mps));
        // The host must see a short packet, unless it got everything it
        // asked for.
        if response < requested {
            prop_assert!(last.len() < usize::from(mps));
        }
    }

    #[test]
    fn no_zlp_without_shortfall(requested in 1u16..600, mps in 1u8..=64) {
        let ep = run(requested, requested, mps);
        let packets = &ep.transport().packets;
        prop_assert!(packets.iter().all(|p| !p.is_empty()));
        prop_assert!(!ep.state().may_need_zlp());
    }

    #[test]
    fn idle_endpoint_only_stalls((response, requested, mps) in read_shape(), extra in 1usize..5) {
        let mut ep = run(response, requested, mps);
        ep.service(Ep0Event::OutComplete);
        prop_assert_eq!(ep.phase(), Phase::Idle);

        let sent = ep.transport().packets.len();
        for _ in 0..extra {
            ep.service(Ep0Event::InComplete);
        }
        prop_assert_eq!(ep.phase(), Phase::Idle);
        prop_assert_eq!(ep.transport().packets.len(), sent);
        prop_assert_eq!(ep.transport().stalls, extra);
    }
}

#[test]
fn scenarios() {
    let lengths = |response, requested, mps| -> Vec<usize> {
        run(response, requested, mps).transport().packets.iter().map(Vec::len).collect()
    };
    assert_eq!(lengths(7, 12, 4), [4, 3]);
    assert_eq!(lengths(8, 12, 4), [4, 4, 0]);
    assert_eq!(lengths(9, 12, 4), [4, 4, 1]);
    assert_eq!(lengths(8, 8, 4), [4, 4]);
    assert_eq!(lengths(0, 12, 4), [0]);
}

#[test]
fn set_address_applied_after_status_in() {
    let mut ep = ControlEndpoint::new(Wire::default(), Fixed { bytes: Vec::new() }, 64).unwrap();
    ep.service(Ep0Event::Setup(SetupRequest::new(0, 5, 7, 0, 0).to_bytes()));
    assert_eq!(ep.phase(), Phase::StatusIn);
    assert_eq!(ep.transport().packets, [Vec::<u8>::new()]);
    assert!(ep.transport().addresses.is_empty());

    ep.service(Ep0Event::InComplete);
    assert_eq!(ep.phase(), Phase::Idle);
    assert_eq!(ep.transport().addresses, [7]);
}

#[test]
fn independent_endpoints() {
    let mut a = ControlEndpoint::new(Wire::default(), Fixed { bytes: vec![1; 8] }, 4).unwrap();
    let mut b = ControlEndpoint::new(Wire::default(), Fixed { bytes: vec![2; 3] }, 4).unwrap();
    let req = SetupRequest::new(0x80, 0x06, 0x0100, 0, 12);
    a.service(Ep0Event::Setup(req.to_bytes()));
    b.service(Ep0Event::Setup(req.to_bytes()));
    assert_eq!(a.phase(), Phase::DataIn);
    assert_eq!(b.phase(), Phase::LastDataIn);
    assert_eq!(b.transport().packets, [vec![2, 2, 2]]);
}
