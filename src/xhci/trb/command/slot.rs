//! The [`EnableSlotTrb`] and [`DisableSlotTrb`] types

use crate::xhci::trb::TrbType;

/// The flags dword of an [`EnableSlotTrb`]
#[bitfield(u32)]
pub struct EnableSlotTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(9)]
    __: u16,
    /// The TRB type
    #[bits(6, default = TrbType::EnableSlotCommand)]
    pub trb_type: TrbType,
    /// The protocol slot type, from the supported protocol capability of the port
    #[bits(5)]
    pub slot_type: u8,
    #[bits(11)]
    __: u16,
}

/// Asks the controller for a free device slot.
/// The slot ID is returned in the command completion event.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnableSlotTrb {
    /// The protocol slot type. 0 for USB2 and USB3 ports.
    pub slot_type: u8,
}

impl EnableSlotTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let flags = EnableSlotTrbFlags::new()
            .with_cycle(cycle)
            .with_slot_type(self.slot_type);

        [0, 0, 0, flags.into()]
    }
}

/// The flags dword of a [`DisableSlotTrb`]
#[bitfield(u32)]
pub struct DisableSlotTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(9)]
    __: u16,
    /// The TRB type
    #[bits(6, default = TrbType::DisableSlotCommand)]
    pub trb_type: TrbType,
    #[bits(8)]
    __: u8,
    /// The slot to release
    pub slot_id: u8,
}

/// Releases a device slot, stopping all of its endpoints
#[derive(Debug, Clone, Copy)]
pub struct DisableSlotTrb {
    /// The slot to release
    pub slot_id: u8,
}

impl DisableSlotTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let flags = DisableSlotTrbFlags::new()
            .with_cycle(cycle)
            .with_slot_id(self.slot_id);

        [0, 0, 0, flags.into()]
    }
}
