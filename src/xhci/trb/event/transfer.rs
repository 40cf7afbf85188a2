//! The [`TransferEventTrb`] type

use x86_64::PhysAddr;

use super::CompletionCode;
use crate::xhci::trb::{join_pointer, split_pointer, TrbType};

/// The status dword of a [`TransferEventTrb`]
#[bitfield(u32)]
pub struct TransferEventStatus {
    /// The number of bytes which were not transferred
    #[bits(24)]
    pub trb_transfer_length: u32,
    /// The result of the transfer
    #[bits(8)]
    pub completion_code: CompletionCode,
}

/// The flags dword of a [`TransferEventTrb`]
#[bitfield(u32)]
pub struct TransferEventFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(1)]
    __: u8,
    /// Whether the pointer field holds event data rather than a TRB pointer
    pub event_data: bool,
    #[bits(7)]
    __: u8,
    /// The TRB type
    #[bits(6, default = TrbType::TransferEvent)]
    pub trb_type: TrbType,
    /// The _Device Context Index_ of the endpoint
    #[bits(5)]
    pub endpoint_id: u8,
    #[bits(3)]
    __: u8,
    /// The slot of the device
    pub slot_id: u8,
}

/// An event reporting the completion of a transfer TRB which had
/// _Interrupt On Completion_ set, or which ended with an error or short packet.
#[derive(Debug, Clone, Copy)]
pub struct TransferEventTrb {
    /// The address of the transfer TRB which generated the event
    pub trb_pointer: PhysAddr,
    /// The number of bytes of the TRB's buffer which were not transferred
    pub residual_length: u32,
    /// The result of the transfer
    pub completion_code: CompletionCode,
    /// The _Device Context Index_ of the endpoint
    pub endpoint_id: u8,
    /// The slot of the device
    pub slot_id: u8,
}

impl TransferEventTrb {
    /// Decodes the TRB from the data read from the event ring
    pub fn new(data: [u32; 4]) -> Self {
        let status = TransferEventStatus::from(data[2]);
        let flags = TransferEventFlags::from(data[3]);

        Self {
            trb_pointer: PhysAddr::new_truncate(join_pointer(data[0], data[1])),
            residual_length: status.trb_transfer_length(),
            completion_code: status.completion_code(),
            endpoint_id: flags.endpoint_id(),
            slot_id: flags.slot_id(),
        }
    }

    /// Encodes the TRB as the controller would write it to the event ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let (low, high) = split_pointer(self.trb_pointer.as_u64());
        let status = TransferEventStatus::new()
            .with_trb_transfer_length(self.residual_length)
            .with_completion_code(self.completion_code);
        let flags = TransferEventFlags::new()
            .with_cycle(cycle)
            .with_endpoint_id(self.endpoint_id)
            .with_slot_id(self.slot_id);

        [low, high, status.into(), flags.into()]
    }
}
