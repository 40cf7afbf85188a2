//! The [`CommandTrb`] type

use self::{
    address_device::AddressDeviceTrb,
    configure_endpoint::ConfigureEndpointTrb,
    slot::{DisableSlotTrb, EnableSlotTrb},
};
use super::{GenericTrbFlags, TrbType};

pub mod address_device;
pub mod configure_endpoint;
pub mod slot;

/// A TRB on the command ring, which gives the controller a command to execute.
/// Commands are used to manage slots, devices and endpoints.
///
/// Each command produces a command completion event which points back at the command's TRB.
#[derive(Debug, Clone, Copy)]
pub enum CommandTrb {
    /// Allocates a device slot
    EnableSlot(EnableSlotTrb),
    /// Releases a device slot
    DisableSlot(DisableSlotTrb),
    /// Assigns a USB address to the device in a slot
    AddressDevice(AddressDeviceTrb),
    /// Sets up the endpoints of a device
    ConfigureEndpoint(ConfigureEndpointTrb),
    /// A command which does nothing except produce a completion event.
    /// This is used to check that the command and event rings are working.
    NoOp,
}

impl CommandTrb {
    /// Gets the type of the TRB
    pub fn trb_type(&self) -> TrbType {
        match self {
            CommandTrb::EnableSlot(_) => TrbType::EnableSlotCommand,
            CommandTrb::DisableSlot(_) => TrbType::DisableSlotCommand,
            CommandTrb::AddressDevice(_) => TrbType::AddressDeviceCommand,
            CommandTrb::ConfigureEndpoint(_) => TrbType::ConfigureEndpointCommand,
            CommandTrb::NoOp => TrbType::NoOpCommand,
        }
    }

    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let parts = match self {
            CommandTrb::EnableSlot(enable_slot) => enable_slot.to_parts(cycle),
            CommandTrb::DisableSlot(disable_slot) => disable_slot.to_parts(cycle),
            CommandTrb::AddressDevice(address_device) => address_device.to_parts(cycle),
            CommandTrb::ConfigureEndpoint(configure_endpoint) => configure_endpoint.to_parts(cycle),
            CommandTrb::NoOp => [
                0,
                0,
                0,
                GenericTrbFlags::new()
                    .with_cycle(cycle)
                    .with_trb_type(TrbType::NoOpCommand)
                    .into(),
            ],
        };

        debug_assert_eq!(super::type_of(&parts), self.trb_type());

        parts
    }
}
