// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! One direct radio link
//!
//! A [`Pipe`] is the software record for one hardware receive slot: its
//! state machine, the peer it is bound to, and the 5-byte address the slot
//! listens on. Setters only update the record; [`Pipe::flush`] reconciles
//! the record with the radio.
//!
//! Pipe 0 is special: it is the broadcast/discovery channel, permanently
//! accepted, and the radio class this stack targets can only transmit from
//! slot 0's configured address. Unicast transmission therefore borrows
//! slot 0 for the duration of the send and restores it afterwards.

use crate::message::{NodeId, BROADCAST};
use crate::radio::{reg, status, Address, Mode, RadioDevice, ADDRESS_LEN};

/// Number of hardware receive slots
pub const PIPE_COUNT: usize = 6;

/// Connection state of one direct link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No link; the hardware slot is disabled
    #[default]
    Disconnected,
    /// Listening on an unused address for an inbound RESPOND
    Waiting,
    /// We answered a PRESENT and await the peer's ACCEPT
    Responded,
    /// Bidirectional link, ready for traffic
    Accepted,
}

/// Software record of one hardware receive slot
#[derive(Debug, Clone, Copy)]
pub struct Pipe {
    index: u8,
    state: LinkState,
    peer: NodeId,
    address: Address,
}

impl Pipe {
    /// Create a disconnected pipe for hardware slot `index`
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self {
            index,
            state: LinkState::Disconnected,
            peer: BROADCAST,
            address: [0; ADDRESS_LEN],
        }
    }

    /// Hardware slot index (0..[`PIPE_COUNT`])
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Current link state
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Peer bound to this pipe; [`BROADCAST`] when unbound
    ///
    /// A pipe in [`LinkState::Waiting`] records the local node id here as a
    /// marker, since no peer is known yet.
    #[must_use]
    pub const fn peer(&self) -> NodeId {
        self.peer
    }

    /// Address the slot listens on
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Update the recorded state; the radio is untouched
    pub fn set_state(&mut self, state: LinkState) {
        self.state = state;
    }

    /// Update the recorded peer; the radio is untouched
    pub fn set_peer(&mut self, peer: NodeId) {
        self.peer = peer;
    }

    /// Update the recorded address; the radio is untouched
    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    /// Reconcile this record with the radio
    ///
    /// Disconnected pipes disable their slot; every other state programs
    /// the slot address and enables it. Pipe 0 additionally owns the
    /// transmit address, since broadcasts leave through it.
    pub fn flush<R: RadioDevice>(&self, radio: &mut R) {
        let saved = radio.mode();
        radio.set_mode(Mode::Idle);
        match self.state {
            LinkState::Disconnected => radio.rx_enabled(self.index, false),
            LinkState::Waiting | LinkState::Responded | LinkState::Accepted => {
                radio.rx_set_address(self.index, &self.address);
                radio.rx_enabled(self.index, true);
                if self.index == 0 {
                    radio.tx_set_address(&self.address);
                }
            }
        }
        radio.set_mode(saved);
    }

    /// Transmit `bytes` through the pipe at `index`
    ///
    /// Pipe 0 sends as a no-ACK broadcast and succeeds once the frame has
    /// been clocked out. Any other pipe borrows hardware slot 0 for an
    /// auto-ACK unicast to its address and restores both slot
    /// configurations before returning. Returns whether the frame was
    /// acknowledged (unicast) or sent (broadcast); the retry loop here is
    /// the radio's own, software retries live a layer up.
    pub fn transmit<R: RadioDevice>(
        pipes: &[Pipe; PIPE_COUNT],
        index: usize,
        radio: &mut R,
        bytes: &[u8],
    ) -> bool {
        let saved = radio.mode();
        radio.set_mode(Mode::PrimaryTx);

        let broadcast = index == 0;
        if !broadcast {
            let pipe = &pipes[index];
            radio.rx_enabled(pipe.index, false);
            radio.rx_set_address(0, &pipe.address);
            radio.tx_set_address(&pipe.address);
        }

        radio.tx_flush();
        radio.write_register(reg::STATUS, status::TX_DS | status::MAX_RT);
        radio.tx_write_payload(bytes, broadcast);

        let acknowledged = loop {
            let st = radio.poll_status();
            if st & status::MAX_RT != 0 {
                radio.write_register(reg::STATUS, status::MAX_RT);
                break false;
            }
            if st & status::TX_DS != 0 {
                radio.write_register(reg::STATUS, status::TX_DS);
                break true;
            }
        };

        if !broadcast {
            pipes[index].flush(radio);
            pipes[0].flush(radio);
        }
        radio.set_mode(saved);
        acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::sim::SimMedium;
    use crate::radio::with_discriminator;

    const BASE: Address = [0x72, 0x72, 0x72, 0x72, 0x70];

    fn pipes() -> [Pipe; PIPE_COUNT] {
        [
            Pipe::new(0),
            Pipe::new(1),
            Pipe::new(2),
            Pipe::new(3),
            Pipe::new(4),
            Pipe::new(5),
        ]
    }

    #[test]
    fn flush_disables_disconnected_slot() {
        let medium = SimMedium::new();
        let mut radio = medium.radio();
        let handle = radio.clone();

        let mut pipe = Pipe::new(2);
        pipe.set_address(with_discriminator(BASE, 0x14));
        pipe.set_state(LinkState::Waiting);
        pipe.flush(&mut radio);
        assert!(handle.slot_enabled(2));
        assert_eq!(handle.slot_address(2), with_discriminator(BASE, 0x14));

        pipe.set_state(LinkState::Disconnected);
        pipe.flush(&mut radio);
        assert!(!handle.slot_enabled(2));
    }

    #[test]
    fn flush_of_pipe_zero_owns_tx_address() {
        let medium = SimMedium::new();
        let mut radio = medium.radio();
        let mut listener = medium.radio();

        let mut pipe = Pipe::new(0);
        pipe.set_address([0x70; 5]);
        pipe.set_state(LinkState::Accepted);
        pipe.flush(&mut radio);

        // A broadcast now leaves on the discovery address.
        listener.rx_set_address(0, &[0x70; 5]);
        listener.rx_enabled(0, true);
        listener.set_mode(Mode::PrimaryRx);
        radio.tx_write_payload(&[1], true);
        assert_eq!(listener.fifo_status() & crate::radio::fifo::RX_EMPTY, 0);
        let mut buf = [0u8; 4];
        assert_eq!(listener.rx_read_payload(&mut buf), 1);
    }

    #[test]
    fn unicast_restores_slot_zero() {
        let medium = SimMedium::new();
        let mut radio = medium.radio();
        let handle = radio.clone();
        let mut peer = medium.radio();

        let mut all = pipes();
        all[0].set_address([0x70; 5]);
        all[0].set_state(LinkState::Accepted);
        all[0].flush(&mut radio);
        all[3].set_address(with_discriminator(BASE, 0x22));
        all[3].set_peer(0x20);
        all[3].set_state(LinkState::Accepted);
        all[3].flush(&mut radio);

        peer.rx_set_address(1, &with_discriminator(BASE, 0x22));
        peer.rx_enabled(1, true);
        peer.set_mode(Mode::PrimaryRx);

        radio.set_mode(Mode::PrimaryRx);
        assert!(Pipe::transmit(&all, 3, &mut radio, &[9, 9]));

        // Slot 0 carries the discovery address again, slot 3 is re-enabled,
        // and the radio is back in its previous mode.
        assert_eq!(handle.slot_address(0), [0x70; 5]);
        assert!(handle.slot_enabled(3));
        assert_eq!(radio.mode(), Mode::PrimaryRx);
    }

    #[test]
    fn unacknowledged_unicast_reports_failure() {
        let medium = SimMedium::new();
        let mut radio = medium.radio();

        let mut all = pipes();
        all[0].set_address([0x70; 5]);
        all[0].set_state(LinkState::Accepted);
        all[0].flush(&mut radio);
        all[1].set_address(with_discriminator(BASE, 0x12));
        all[1].set_peer(0x10);
        all[1].set_state(LinkState::Accepted);
        all[1].flush(&mut radio);

        assert!(!Pipe::transmit(&all, 1, &mut radio, &[1]));
    }

    #[test]
    fn broadcast_succeeds_without_listeners() {
        let medium = SimMedium::new();
        let mut radio = medium.radio();

        let mut all = pipes();
        all[0].set_address([0x70; 5]);
        all[0].set_state(LinkState::Accepted);
        all[0].flush(&mut radio);

        assert!(Pipe::transmit(&all, 0, &mut radio, &[0xAB]));
    }
}
