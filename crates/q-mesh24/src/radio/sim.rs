// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Software-simulated radio medium for hosted testing
//!
//! [`SimMedium`] models the shared air: every [`SimRadio`] attached to it
//! can reach every other, unless a link is cut to shape a topology. An
//! auto-ACK transmission succeeds when at least one reachable, powered
//! radio in receive mode has an enabled slot programmed with the transmit
//! address; a no-ACK transmission always reports data-sent.
//!
//! The simulator is deliberately register-faithful (status bits are
//! write-1-to-clear, the FIFO status mirrors the receive queue) so the
//! connectivity layer runs unmodified against it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use super::{fifo, reg, status, Address, Mode, RadioDevice, ADDRESS_LEN};

const SLOT_COUNT: usize = 6;
const REGISTER_COUNT: usize = 0x20;

struct RadioState {
    rx_address: [Address; SLOT_COUNT],
    rx_enabled: [bool; SLOT_COUNT],
    tx_address: Address,
    mode: Mode,
    last_status: u8,
    registers: [u8; REGISTER_COUNT],
    rx_fifo: VecDeque<Vec<u8>>,
    powered: bool,
    tx_count: u32,
}

impl RadioState {
    fn new() -> Self {
        Self {
            rx_address: [[0; ADDRESS_LEN]; SLOT_COUNT],
            rx_enabled: [false; SLOT_COUNT],
            tx_address: [0; ADDRESS_LEN],
            mode: Mode::Idle,
            last_status: 0,
            registers: [0; REGISTER_COUNT],
            rx_fifo: VecDeque::new(),
            powered: true,
            tx_count: 0,
        }
    }
}

struct MediumState {
    radios: Vec<RadioState>,
    /// Severed radio pairs, stored with the lower index first
    cuts: Vec<(usize, usize)>,
}

impl MediumState {
    fn reachable(&self, a: usize, b: usize) -> bool {
        let pair = if a < b { (a, b) } else { (b, a) };
        !self.cuts.contains(&pair)
    }
}

/// The shared air all simulated radios transmit into
#[derive(Clone)]
pub struct SimMedium {
    inner: Rc<RefCell<MediumState>>,
}

impl SimMedium {
    /// Create an empty medium
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(MediumState {
                radios: Vec::new(),
                cuts: Vec::new(),
            })),
        }
    }

    /// Attach a new radio to the medium
    #[must_use]
    pub fn radio(&self) -> SimRadio {
        let mut state = self.inner.borrow_mut();
        state.radios.push(RadioState::new());
        SimRadio {
            medium: Rc::clone(&self.inner),
            index: state.radios.len() - 1,
        }
    }

    /// Cut or restore the link between two radios (by attachment index)
    ///
    /// Cutting a link makes the radios mutually unreachable, which is how
    /// tests shape line or partial-mesh topologies out of one shared air.
    pub fn set_link(&self, a: usize, b: usize, up: bool) {
        let mut state = self.inner.borrow_mut();
        let pair = if a < b { (a, b) } else { (b, a) };
        if up {
            state.cuts.retain(|c| *c != pair);
        } else if !state.cuts.contains(&pair) {
            state.cuts.push(pair);
        }
    }
}

impl Default for SimMedium {
    fn default() -> Self {
        Self::new()
    }
}

/// One simulated radio attached to a [`SimMedium`]
///
/// Cloning yields another handle to the same radio, which tests keep for
/// introspection after handing the original to the connectivity layer.
#[derive(Clone)]
pub struct SimRadio {
    medium: Rc<RefCell<MediumState>>,
    index: usize,
}

impl SimRadio {
    /// Attachment index of this radio in its medium
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Cut the power; the radio stops receiving and acknowledging
    pub fn power_off(&self) {
        self.medium.borrow_mut().radios[self.index].powered = false;
    }

    /// Restore power
    pub fn power_on(&self) {
        self.medium.borrow_mut().radios[self.index].powered = true;
    }

    /// Push a raw frame straight into this radio's receive FIFO
    pub fn inject(&self, bytes: &[u8]) {
        let mut state = self.medium.borrow_mut();
        let radio = &mut state.radios[self.index];
        radio.rx_fifo.push_back(bytes.to_vec());
        radio.last_status |= status::RX_DR;
    }

    /// The address currently programmed on a receive slot
    #[must_use]
    pub fn slot_address(&self, slot: usize) -> Address {
        self.medium.borrow().radios[self.index].rx_address[slot]
    }

    /// Whether a receive slot is enabled
    #[must_use]
    pub fn slot_enabled(&self, slot: usize) -> bool {
        self.medium.borrow().radios[self.index].rx_enabled[slot]
    }

    /// Number of payloads this radio has clocked out
    #[must_use]
    pub fn tx_count(&self) -> u32 {
        self.medium.borrow().radios[self.index].tx_count
    }
}

impl RadioDevice for SimRadio {
    fn write_register(&mut self, register: u8, value: u8) {
        let mut state = self.medium.borrow_mut();
        let radio = &mut state.radios[self.index];
        if register == reg::STATUS {
            // Write-1-to-clear
            radio.last_status &= !value;
        } else if usize::from(register) < REGISTER_COUNT {
            radio.registers[usize::from(register)] = value;
        }
    }

    fn read_register(&mut self, register: u8) -> u8 {
        let state = self.medium.borrow();
        let radio = &state.radios[self.index];
        match register {
            reg::STATUS => radio.last_status,
            r if usize::from(r) < REGISTER_COUNT => radio.registers[usize::from(r)],
            _ => 0,
        }
    }

    fn rx_enabled(&mut self, slot: u8, enabled: bool) {
        let mut state = self.medium.borrow_mut();
        state.radios[self.index].rx_enabled[usize::from(slot)] = enabled;
    }

    fn rx_set_address(&mut self, slot: u8, address: &Address) {
        let mut state = self.medium.borrow_mut();
        state.radios[self.index].rx_address[usize::from(slot)] = *address;
    }

    fn tx_set_address(&mut self, address: &Address) {
        let mut state = self.medium.borrow_mut();
        state.radios[self.index].tx_address = *address;
    }

    fn tx_flush(&mut self) {}

    fn tx_write_payload(&mut self, bytes: &[u8], no_ack: bool) {
        let mut state = self.medium.borrow_mut();
        let target = state.radios[self.index].tx_address;
        state.radios[self.index].tx_count += 1;

        let mut delivered = false;
        for other in 0..state.radios.len() {
            if other == self.index || !state.reachable(self.index, other) {
                continue;
            }
            let receiver = &mut state.radios[other];
            if !receiver.powered || receiver.mode != Mode::PrimaryRx {
                continue;
            }
            let hit = (0..SLOT_COUNT)
                .any(|s| receiver.rx_enabled[s] && receiver.rx_address[s] == target);
            if hit {
                receiver.rx_fifo.push_back(bytes.to_vec());
                receiver.last_status |= status::RX_DR;
                delivered = true;
            }
        }

        let sender = &mut state.radios[self.index];
        if no_ack || delivered {
            sender.last_status |= status::TX_DS;
        } else {
            sender.last_status |= status::MAX_RT;
        }
    }

    fn rx_payload_width(&mut self) -> u8 {
        let state = self.medium.borrow();
        state.radios[self.index]
            .rx_fifo
            .front()
            .map_or(0, |p| p.len() as u8)
    }

    fn rx_read_payload(&mut self, buf: &mut [u8]) -> usize {
        let mut state = self.medium.borrow_mut();
        let radio = &mut state.radios[self.index];
        let Some(payload) = radio.rx_fifo.pop_front() else {
            return 0;
        };
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        n
    }

    fn fifo_status(&mut self) -> u8 {
        let state = self.medium.borrow();
        if state.radios[self.index].rx_fifo.is_empty() {
            fifo::RX_EMPTY
        } else {
            0
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        self.medium.borrow_mut().radios[self.index].mode = mode;
    }

    fn mode(&self) -> Mode {
        self.medium.borrow().radios[self.index].mode
    }

    fn poll_status(&mut self) -> u8 {
        self.medium.borrow().radios[self.index].last_status
    }

    fn last_status(&self) -> u8 {
        self.medium.borrow().radios[self.index].last_status
    }
}
