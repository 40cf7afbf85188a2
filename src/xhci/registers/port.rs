//! The [`PortRegisters`] type, which controls a single root hub port

use core::ptr::NonNull;

use x86_64::VirtAddr;

use crate::xhci::volatile_accessors;

/// The link state of a root hub port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortLinkState {
    /// The link is active
    U0,
    /// Low power state
    U1,
    /// Lower power state
    U2,
    /// Suspended
    U3,
    /// The port is disabled
    Disabled,
    /// The port is powered but nothing is connected
    RxDetect,
    /// The link is not operational
    Inactive,
    /// Polling for a connected device
    Polling,
    /// Recovering the link
    Recovery,
    /// Performing a hot reset
    HotReset,
    /// Compliance mode
    ComplianceMode,
    /// Test mode
    TestMode,
    /// Resuming from suspend
    Resume,
    /// Any other value
    Reserved(u8),
}

impl PortLinkState {
    /// Constructs a [`PortLinkState`] from its bit representation
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::U0,
            1 => Self::U1,
            2 => Self::U2,
            3 => Self::U3,
            4 => Self::Disabled,
            5 => Self::RxDetect,
            6 => Self::Inactive,
            7 => Self::Polling,
            8 => Self::Recovery,
            9 => Self::HotReset,
            10 => Self::ComplianceMode,
            11 => Self::TestMode,
            15 => Self::Resume,
            _ => Self::Reserved(bits),
        }
    }

    /// Converts a [`PortLinkState`] into its bit representation
    const fn into_bits(self) -> u8 {
        match self {
            Self::U0 => 0,
            Self::U1 => 1,
            Self::U2 => 2,
            Self::U3 => 3,
            Self::Disabled => 4,
            Self::RxDetect => 5,
            Self::Inactive => 6,
            Self::Polling => 7,
            Self::Recovery => 8,
            Self::HotReset => 9,
            Self::ComplianceMode => 10,
            Self::TestMode => 11,
            Self::Resume => 15,
            Self::Reserved(bits) => bits,
        }
    }
}

/// The `PORTSC` register of a port (xHCI 1.2, section 5.4.8).
///
/// Change bits and [`port_enabled`] are cleared by writing `true`, so a value read from the
/// register should be [normalised] before being written back.
///
/// [`port_enabled`]: PortStatusAndControl::port_enabled
/// [normalised]: PortStatusAndControl::normalised
#[bitfield(u32)]
pub struct PortStatusAndControl {
    /// Whether a device is connected
    pub current_connect_status: bool,
    /// Whether the port is enabled. Writing `true` disables the port.
    pub port_enabled: bool,
    #[bits(1)]
    __: u8,
    /// Whether the port has an over-current condition
    pub over_current_active: bool,
    /// Writing `true` starts a port reset. The controller clears the bit when the reset is done.
    pub port_reset: bool,
    /// The link state of the port
    #[bits(4)]
    pub port_link_state: PortLinkState,
    /// Whether the port is powered
    pub port_power: bool,
    /// The speed of the connected device. See [`port_speed`].
    #[bits(4)]
    pub port_speed: u8,
    /// Port indicator control
    #[bits(2)]
    pub port_indicator_control: u8,
    /// Must be set for a write to [`port_link_state`][Self::port_link_state] to take effect
    pub port_link_state_write_strobe: bool,
    /// Set when [`current_connect_status`][Self::current_connect_status] changes
    pub connect_status_change: bool,
    /// Set when the port is disabled because of an error
    pub port_enabled_change: bool,
    /// Set when a warm reset completes
    pub warm_port_reset_change: bool,
    /// Set when [`over_current_active`][Self::over_current_active] changes
    pub over_current_change: bool,
    /// Set when a port reset completes
    pub port_reset_change: bool,
    /// Set when the link state changes
    pub port_link_state_change: bool,
    /// Set when the port fails to configure its link partner
    pub port_config_error_change: bool,
    /// Whether the device is connected but the port can't describe its state
    pub cold_attach_status: bool,
    /// Whether connects are wake events
    pub wake_on_connect_enable: bool,
    /// Whether disconnects are wake events
    pub wake_on_disconnect_enable: bool,
    /// Whether over-current conditions are wake events
    pub wake_on_over_current_enable: bool,
    #[bits(2)]
    __: u8,
    /// Whether the device is non-removable
    pub device_removable: bool,
    /// Writing `true` starts a warm reset on USB3 ports
    pub warm_port_reset: bool,
}

impl PortStatusAndControl {
    /// The bits which keep their value when written back: link state, power, indicator control and
    /// wake enables
    const PRESERVED_BITS: u32 = 0x0e00_c3e0;

    /// Clears every bit which has a side effect when written as `true` (and the link state write
    /// strobe), so that the value can be modified and written back.
    pub fn normalised(self) -> Self {
        Self::from(u32::from(self) & Self::PRESERVED_BITS)
    }

    /// Whether any of the change bits are set
    pub fn has_changes(&self) -> bool {
        self.connect_status_change()
            || self.port_enabled_change()
            || self.warm_port_reset_change()
            || self.over_current_change()
            || self.port_reset_change()
            || self.port_link_state_change()
            || self.port_config_error_change()
    }

    /// A value which, written back to the register, clears all the change bits which are set in
    /// `self`
    pub fn change_bits(&self) -> Self {
        Self::new()
            .with_connect_status_change(self.connect_status_change())
            .with_port_enabled_change(self.port_enabled_change())
            .with_warm_port_reset_change(self.warm_port_reset_change())
            .with_over_current_change(self.over_current_change())
            .with_port_reset_change(self.port_reset_change())
            .with_port_link_state_change(self.port_link_state_change())
            .with_port_config_error_change(self.port_config_error_change())
    }
}

/// Values of [`PortStatusAndControl::port_speed`] under the default protocol speed ID mapping
pub mod port_speed {
    /// USB 1.1 full speed, 12Mb/s
    pub const FULL_SPEED: u8 = 1;
    /// USB 1.1 low speed, 1.5Mb/s
    pub const LOW_SPEED: u8 = 2;
    /// USB 2.0 high speed, 480Mb/s
    pub const HIGH_SPEED: u8 = 3;
    /// USB 3.0 super speed, 5Gb/s
    pub const SUPER_SPEED: u8 = 4;
    /// USB 3.1 super speed plus, 10Gb/s
    pub const SUPER_SPEED_PLUS: u8 = 5;
}

/// The layout of a port register set in memory
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct PortRegistersFields {
    /// The `PORTSC` register
    status_and_control: PortStatusAndControl,
    /// The `PORTPMSC` register
    power_management_status_and_control: u32,
    /// The `PORTLI` register
    link_info: u32,
    /// The `PORTHLPMC` register
    hardware_lpm_control: u32,
}

/// The register set of a single root hub port
#[derive(Debug)]
pub struct PortRegisters {
    /// The pointer to the registers
    ptr: NonNull<PortRegistersFields>,
}

#[rustfmt::skip]
impl PortRegisters {
    volatile_accessors!(
        PortRegistersFields,
        status_and_control, PortStatusAndControl,
        (pub fn read_status_and_control), (pub fn write_status_and_control)
    );
}

impl PortRegisters {
    /// Wraps the port register set at the given address
    ///
    /// # Safety
    /// `address` must point to a port register set of an xHCI controller,
    /// which must stay mapped for the lifetime of the returned value.
    pub unsafe fn new(address: VirtAddr) -> Self {
        Self {
            ptr: NonNull::new(address.as_mut_ptr()).expect("port registers should not be at null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions() {
        let status = PortStatusAndControl::from(0x0020_0603);

        assert!(status.current_connect_status());
        assert!(status.port_enabled());
        assert!(status.port_power());
        assert_eq!(status.port_speed(), port_speed::FULL_SPEED);
        assert!(status.port_reset_change());
        assert!(!status.connect_status_change());
    }

    #[test]
    fn normalised_clears_write_one_bits() {
        let status = PortStatusAndControl::new()
            .with_current_connect_status(true)
            .with_port_enabled(true)
            .with_port_power(true)
            .with_port_link_state(PortLinkState::U0)
            .with_connect_status_change(true)
            .with_port_reset_change(true);

        let normalised = status.normalised();

        assert!(normalised.port_power());
        assert!(!normalised.port_enabled());
        assert!(!normalised.connect_status_change());
        assert!(!normalised.port_reset_change());
        assert!(!normalised.has_changes());
    }

    #[test]
    fn change_bits_only_holds_changes() {
        let status = PortStatusAndControl::new()
            .with_current_connect_status(true)
            .with_port_power(true)
            .with_connect_status_change(true);

        assert_eq!(u32::from(status.change_bits()), 1 << 17);
    }
}
