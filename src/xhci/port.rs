//! The [`Port`] handle and the [`PortState`] of each root hub port

use log::trace;

use super::registers::port::{PortRegisters, PortStatusAndControl};

/// How far a root hub port has got through bringing up the device connected to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortState {
    /// Nothing is connected, or the port's device was evicted after an error
    #[default]
    Disconnected,
    /// A device is connected, but another port is being addressed so this one has to wait its turn
    WaitingAddressed,
    /// A port reset has been started
    ResetRequested,
    /// The port reset finished and an _Enable Slot_ command has been issued
    ResetComplete,
    /// A slot has been allocated for the device
    Enabled,
    /// An _Address Device_ command has been issued
    Addressing,
    /// The device's descriptors are being read
    Initializing,
    /// A _Configure Endpoint_ command has been issued
    ConfiguringEndpoints,
    /// The device is ready for use
    Configured,
}

impl PortState {
    /// Whether the port is between being reset and having its device addressed. Only one port may
    /// be in this part of the sequence at once, as the device answers to USB address 0.
    pub fn is_addressing(&self) -> bool {
        matches!(
            self,
            Self::ResetRequested | Self::ResetComplete | Self::Enabled | Self::Addressing
        )
    }
}

/// A root hub port: its 1-based number and its registers
#[derive(Debug)]
pub struct Port {
    /// The port number
    number: u8,
    /// The port's register set
    registers: PortRegisters,
}

impl Port {
    /// Wraps a port's registers
    pub fn new(number: u8, registers: PortRegisters) -> Self {
        Self { number, registers }
    }

    /// The port number, starting at 1
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Reads the port's status register
    pub fn status(&self) -> PortStatusAndControl {
        self.registers.read_status_and_control()
    }

    /// Whether a device is connected
    pub fn is_connected(&self) -> bool {
        self.status().current_connect_status()
    }

    /// Whether the port is enabled
    pub fn is_enabled(&self) -> bool {
        self.status().port_enabled()
    }

    /// Whether a device has been connected or disconnected since the change was last cleared
    pub fn is_connect_status_changed(&self) -> bool {
        self.status().connect_status_change()
    }

    /// Whether a port reset has finished since the change was last cleared
    pub fn is_port_reset_changed(&self) -> bool {
        self.status().port_reset_change()
    }

    /// The speed of the connected device
    pub fn speed(&self) -> u8 {
        self.status().port_speed()
    }

    /// Starts a port reset, clearing the connect status change.
    /// The controller reports the end of the reset with a _Port Status Change_ event.
    pub fn reset(&mut self) {
        let status = self
            .status()
            .normalised()
            .with_connect_status_change(true)
            .with_port_reset(true);
        trace!("Port {}: writing {:#x} to PORTSC", self.number, u32::from(status));
        self.registers.write_status_and_control(status);
    }

    /// Clears any change bits which are set, returning the status from before they were cleared
    pub fn clear_changes(&mut self) -> PortStatusAndControl {
        let status = self.status();
        if status.has_changes() {
            let value = status.normalised().into_bits() | status.change_bits().into_bits();
            self.registers
                .write_status_and_control(PortStatusAndControl::from_bits(value));
        }
        status
    }
}
