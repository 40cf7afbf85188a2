//! The [`NormalTrb`] type

use x86_64::PhysAddr;

use super::TransferTrbStatus;
use crate::xhci::trb::{split_pointer, TrbType};

/// The flags dword of a [`NormalTrb`]
#[bitfield(u32)]
pub struct NormalTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    /// Whether the controller should fetch the next TRB before finishing this one
    pub evaluate_next_trb: bool,
    /// Whether to raise an event if the device sends less data than requested
    pub interrupt_on_short_packet: bool,
    /// Whether the controller may skip cache snooping for the buffer
    pub no_snoop: bool,
    /// Whether the next TRB is part of the same TD
    pub chain: bool,
    /// Whether to raise an event when this TRB completes
    pub interrupt_on_completion: bool,
    /// Whether the data is stored in the TRB's pointer field
    pub immediate_data: bool,
    #[bits(2)]
    __: u8,
    /// Whether to suppress the interrupt for this TRB's event
    pub block_event_interrupt: bool,
    /// The TRB type
    #[bits(6, default = TrbType::Normal)]
    pub trb_type: TrbType,
    #[bits(16)]
    __: u16,
}

/// A _Normal TRB_, which transfers a buffer to or from a bulk or interrupt endpoint.
/// The direction comes from the endpoint.
#[derive(Debug, Clone, Copy)]
pub struct NormalTrb {
    /// The address of the data buffer
    pub data_buffer: PhysAddr,
    /// The length of the data buffer
    pub transfer_length: u32,
    /// Whether to raise an event if the device sends less data than requested
    pub interrupt_on_short_packet: bool,
    /// Whether to raise an event when the transfer completes
    pub interrupt_on_completion: bool,
}

impl NormalTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let (low, high) = split_pointer(self.data_buffer.as_u64());
        let status = TransferTrbStatus::new().with_transfer_length(self.transfer_length);
        let flags = NormalTrbFlags::new()
            .with_cycle(cycle)
            .with_interrupt_on_short_packet(self.interrupt_on_short_packet)
            .with_interrupt_on_completion(self.interrupt_on_completion);

        [low, high, status.into(), flags.into()]
    }
}
