//! The [`AddressDeviceTrb`] type

use x86_64::PhysAddr;

use crate::xhci::trb::{split_pointer, TrbType};

/// The flags dword of an [`AddressDeviceTrb`]
#[bitfield(u32)]
pub struct AddressDeviceTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(8)]
    __: u8,
    /// Whether to stop the controller from sending a `SET_ADDRESS` request to the device
    pub block_set_address_request: bool,
    /// The TRB type
    #[bits(6, default = TrbType::AddressDeviceCommand)]
    pub trb_type: TrbType,
    #[bits(8)]
    __: u8,
    /// The slot of the device being addressed
    pub slot_id: u8,
}

/// An _Address Device_ command, which moves a device slot from the `Default` to the `Addressed`
/// state. The controller picks an address for the device and sends it a `SET_ADDRESS` request.
///
/// The input context must have the add flags for the slot context and endpoint 0 set.
#[derive(Debug, Clone, Copy)]
pub struct AddressDeviceTrb {
    /// The address of the input context to read the slot and endpoint 0 contexts from
    pub input_context_pointer: PhysAddr,
    /// The slot of the device being addressed
    pub slot_id: u8,
    /// Whether to stop the controller from sending a `SET_ADDRESS` request
    pub block_set_address_request: bool,
}

impl AddressDeviceTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        assert!(
            self.input_context_pointer.is_aligned(16u64),
            "Input contexts passed in an AddressDeviceTrb must be 16-byte aligned"
        );

        let (low, high) = split_pointer(self.input_context_pointer.as_u64());
        let flags = AddressDeviceTrbFlags::new()
            .with_cycle(cycle)
            .with_block_set_address_request(self.block_set_address_request)
            .with_slot_id(self.slot_id);

        [low, high, 0, flags.into()]
    }
}
