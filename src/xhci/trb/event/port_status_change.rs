//! The [`PortStatusChangeTrb`] type

use super::{completion_code_of, CompletionCode};
use crate::xhci::trb::{GenericTrbFlags, TrbType};

/// A _Port Status Change_ event. This is generated whenever one of the change bits of a port's
/// [`PortStatusAndControl`] register is set, and stays unacknowledged until software clears the
/// bit.
///
/// [`PortStatusAndControl`]: crate::xhci::registers::port::PortStatusAndControl
#[derive(Debug, Clone, Copy)]
pub struct PortStatusChangeTrb {
    /// The number of the port which changed
    pub port_id: u8,
    /// The completion code of the TRB
    pub completion_code: CompletionCode,
}

impl PortStatusChangeTrb {
    /// Decodes the TRB from the data read from the event ring
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(data: [u32; 4]) -> Self {
        Self {
            port_id: (data[0] >> 24) as u8,
            completion_code: completion_code_of(&data),
        }
    }

    /// Encodes the TRB as the controller would write it to the event ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let flags = GenericTrbFlags::new()
            .with_cycle(cycle)
            .with_trb_type(TrbType::PortStatusChangeEvent);

        [
            u32::from(self.port_id) << 24,
            0,
            u32::from(self.completion_code.into_bits()) << 24,
            flags.into(),
        ]
    }
}
