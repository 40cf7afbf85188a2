//! The [`CommandCompletionTrb`] type

use x86_64::PhysAddr;

use super::CompletionCode;
use crate::xhci::trb::{join_pointer, split_pointer, TrbType};

/// The status dword of a [`CommandCompletionTrb`]
#[bitfield(u32)]
pub struct CommandCompletionStatus {
    /// Command-specific output
    #[bits(24)]
    pub command_completion_parameter: u32,
    /// The result of the command
    #[bits(8)]
    pub completion_code: CompletionCode,
}

/// The flags dword of a [`CommandCompletionTrb`]
#[bitfield(u32)]
pub struct CommandCompletionFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(9)]
    __: u16,
    /// The TRB type
    #[bits(6, default = TrbType::CommandCompletionEvent)]
    pub trb_type: TrbType,
    /// The virtual function which issued the command
    pub vf_id: u8,
    /// The slot the command was for. For an _Enable Slot_ command, this is the newly allocated
    /// slot.
    pub slot_id: u8,
}

/// An event reporting that the controller has finished executing a command
#[derive(Debug, Clone, Copy)]
pub struct CommandCompletionTrb {
    /// The address of the command TRB on the command ring
    pub command_trb_pointer: PhysAddr,
    /// Command-specific output
    pub parameter: u32,
    /// The result of the command
    pub completion_code: CompletionCode,
    /// The slot the command was for
    pub slot_id: u8,
}

impl CommandCompletionTrb {
    /// Decodes the TRB from the data read from the event ring
    pub fn new(data: [u32; 4]) -> Self {
        let status = CommandCompletionStatus::from(data[2]);
        let flags = CommandCompletionFlags::from(data[3]);

        Self {
            command_trb_pointer: PhysAddr::new_truncate(join_pointer(data[0], data[1]) & !0xf),
            parameter: status.command_completion_parameter(),
            completion_code: status.completion_code(),
            slot_id: flags.slot_id(),
        }
    }

    /// Encodes the TRB as the controller would write it to the event ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let (low, high) = split_pointer(self.command_trb_pointer.as_u64());
        let status = CommandCompletionStatus::new()
            .with_command_completion_parameter(self.parameter)
            .with_completion_code(self.completion_code);
        let flags = CommandCompletionFlags::new()
            .with_cycle(cycle)
            .with_slot_id(self.slot_id);

        [low, high, status.into(), flags.into()]
    }
}
