//! The [`LinkTrb`] type

use x86_64::PhysAddr;

use super::{split_pointer, TrbType};

/// The status dword of a [`LinkTrb`]
#[bitfield(u32)]
pub struct LinkTrbStatus {
    #[bits(22)]
    __: u32,
    /// The interrupter to notify if
    /// [`interrupt_on_completion`][LinkTrbFlags::interrupt_on_completion] is set
    #[bits(10)]
    pub interrupter_target: u16,
}

/// The flags dword of a [`LinkTrb`]
#[bitfield(u32)]
pub struct LinkTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    /// Whether the controller should switch its cycle state after this TRB
    pub toggle_cycle: bool,
    #[bits(2)]
    __: u8,
    /// Whether the TRB after the link is part of the same TD as the TRB before it
    pub chain: bool,
    /// Whether the controller should raise an event when it follows the link
    pub interrupt_on_completion: bool,
    #[bits(4)]
    __: u8,
    /// The TRB type
    #[bits(6, default = TrbType::Link)]
    pub trb_type: TrbType,
    #[bits(16)]
    __: u16,
}

/// A TRB on a command or transfer ring which sends the controller back to the start of the ring.
///
/// The TRB also carries the [`toggle_cycle`] flag, which makes the controller switch its cycle
/// state. TRBs which were written on the previous pass around the ring then won't match the
/// controller's cycle state, so software never has to erase TRBs after the controller has read
/// them.
///
/// [`toggle_cycle`]: LinkTrbFlags::toggle_cycle
#[derive(Debug, Clone, Copy)]
pub struct LinkTrb {
    /// The start address of the next ring segment
    pub pointer: PhysAddr,
    /// The status dword
    pub status: LinkTrbStatus,
    /// The flags dword
    pub flags: LinkTrbFlags,
}

impl LinkTrb {
    /// Constructs a link TRB pointing at `pointer`
    pub fn new(pointer: PhysAddr, toggle_cycle: bool, chain: bool) -> Self {
        Self {
            pointer,
            status: LinkTrbStatus::new(),
            flags: LinkTrbFlags::new()
                .with_toggle_cycle(toggle_cycle)
                .with_chain(chain),
        }
    }

    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        assert!(self.pointer.is_aligned(16u64));

        let (low, high) = split_pointer(self.pointer.as_u64());
        [
            low,
            high,
            self.status.into(),
            self.flags.with_cycle(cycle).into(),
        ]
    }

    /// Decodes a link TRB from the data on a TRB ring
    pub fn from_parts(parts: [u32; 4]) -> Self {
        Self {
            pointer: PhysAddr::new(super::join_pointer(parts[0], parts[1])),
            status: parts[2].into(),
            flags: parts[3].into(),
        }
    }
}
