//! The [`SlotContext`] type

use super::update_methods;

/// The first dword of a [`SlotContext`]
#[bitfield(u32)]
struct SlotContextDword0 {
    /// Routes packets through hubs to the device. 0 for devices on a root port.
    #[bits(20)]
    route_string: u32,
    /// The speed of the device, using the same IDs as the root port's speed field
    #[bits(4)]
    speed: u8,
    #[bits(1)]
    __: u8,
    /// Whether the _Multiple TT_ interface is enabled
    multi_tt: bool,
    /// Whether the device is a hub
    is_hub: bool,
    /// The index of the last valid endpoint context
    #[bits(5)]
    context_entries: u8,
}

/// The second dword of a [`SlotContext`]
#[bitfield(u32)]
struct SlotContextDword1 {
    /// Worst case wake-up time in microseconds
    max_exit_latency: u16,
    /// The root port the device is connected through
    root_hub_port_number: u8,
    /// The number of downstream ports, if the device is a hub
    num_ports: u8,
}

/// The third dword of a [`SlotContext`]
#[bitfield(u32)]
struct SlotContextDword2 {
    /// The slot of the parent high-speed hub, for low and full speed devices behind one
    parent_hub_slot_id: u8,
    /// The port of the parent high-speed hub
    parent_port_number: u8,
    /// The _TT Think Time_ of a hub
    #[bits(2)]
    tt_think_time: u8,
    #[bits(4)]
    __: u8,
    /// The interrupter which receives events for this device
    #[bits(10)]
    interrupter_target: u16,
}

/// The fourth dword of a [`SlotContext`]
#[bitfield(u32)]
struct SlotContextDword3 {
    /// The USB address the controller assigned to the device
    usb_device_address: u8,
    #[bits(19)]
    __: u32,
    /// The state of the slot
    #[bits(5)]
    slot_state: SlotState,
}

/// The current state of an enabled _Device Slot_ (xHCI 1.2, section 4.5.3).
///
/// The `Disabled` state shares its encoding with [`Enabled`][SlotState::Enabled], so is not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// The slot was allocated by an _Enable Slot_ command but not yet addressed
    Enabled,
    /// The device is in the USB `Default` state
    Default,
    /// The device has been given a USB address
    Addressed,
    /// The device's endpoints have been configured
    Configured,
    /// Reserved
    Reserved(u8),
}

impl SlotState {
    /// Constructs a [`SlotState`] from its bit representation
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Enabled,
            1 => Self::Default,
            2 => Self::Addressed,
            3 => Self::Configured,
            _ => Self::Reserved(bits),
        }
    }

    /// Converts a [`SlotState`] into its bit representation
    const fn into_bits(self) -> u8 {
        match self {
            Self::Enabled => 0,
            Self::Default => 1,
            Self::Addressed => 2,
            Self::Configured => 3,
            Self::Reserved(bits) => bits,
        }
    }
}

/// Information relating to a device as a whole (xHCI 1.2, section 6.2.2)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotContext {
    /// The first dword
    dword_0: SlotContextDword0,
    /// The second dword
    dword_1: SlotContextDword1,
    /// The third dword
    dword_2: SlotContextDword2,
    /// The fourth dword
    dword_3: SlotContextDword3,
    #[doc(hidden)]
    _reserved: [u32; 4],
}

#[rustfmt::skip]
impl SlotContext {
    update_methods!(
        dword_0,
        route_string, u32,
        route_string, set_route_string, with_route_string
    );
    update_methods!(
        dword_0,
        speed, u8,
        speed, set_speed, with_speed
    );
    update_methods!(
        dword_0,
        is_hub, bool,
        is_hub, set_is_hub, with_is_hub
    );
    update_methods!(
        dword_0,
        context_entries, u8,
        context_entries, set_context_entries, with_context_entries
    );
    update_methods!(
        dword_1,
        root_hub_port_number, u8,
        root_hub_port_number, set_root_hub_port_number, with_root_hub_port_number
    );
    update_methods!(
        dword_2,
        interrupter_target, u16,
        interrupter_target, set_interrupter_target, with_interrupter_target
    );
    update_methods!(
        dword_3,
        usb_device_address, u8,
        usb_device_address, set_usb_device_address, with_usb_device_address
    );
    update_methods!(
        dword_3,
        slot_state, SlotState,
        slot_state, set_slot_state, with_slot_state
    );
}
