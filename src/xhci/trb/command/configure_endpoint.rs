//! The [`ConfigureEndpointTrb`] type

use x86_64::PhysAddr;

use crate::xhci::trb::{split_pointer, TrbType};

/// The flags dword of a [`ConfigureEndpointTrb`]
#[bitfield(u32)]
pub struct ConfigureEndpointTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(8)]
    __: u8,
    /// Whether to drop all endpoints except endpoint 0, ignoring the input context
    pub deconfigure: bool,
    /// The TRB type
    #[bits(6, default = TrbType::ConfigureEndpointCommand)]
    pub trb_type: TrbType,
    #[bits(8)]
    __: u8,
    /// The slot of the device being configured
    pub slot_id: u8,
}

/// A _Configure Endpoint_ command, which adds and drops endpoints of a device according to the add
/// and drop flags of an input context.
#[derive(Debug, Clone, Copy)]
pub struct ConfigureEndpointTrb {
    /// The address of the input context describing the endpoints
    pub input_context_pointer: PhysAddr,
    /// The slot of the device being configured
    pub slot_id: u8,
    /// Whether to drop all endpoints except endpoint 0
    pub deconfigure: bool,
}

impl ConfigureEndpointTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        assert!(self.input_context_pointer.is_aligned(16u64));

        let (low, high) = split_pointer(self.input_context_pointer.as_u64());
        let flags = ConfigureEndpointTrbFlags::new()
            .with_cycle(cycle)
            .with_deconfigure(self.deconfigure)
            .with_slot_id(self.slot_id);

        [low, high, 0, flags.into()]
    }
}
