//! The [`OperationalRegisters`] type, which controls the running state of a controller

use core::ptr::NonNull;

use x86_64::{PhysAddr, VirtAddr};

use super::port::PortRegisters;
use crate::xhci::{volatile_accessors, volatile_getter};

/// The offset of the port register sets from the start of the operational registers
const PORT_REGISTERS_OFFSET: u64 = 0x400;

/// The `USBCMD` field of an [`OperationalRegisters`] structure (xHCI 1.2, section 5.4.1)
#[bitfield(u32)]
pub struct UsbCommand {
    /// Whether the controller is running. Writing `false` stops the controller after its current
    /// transactions, and [`UsbStatus::host_controller_halted`] indicates when it has stopped.
    pub run_stop: bool,
    /// Writing `true` resets the controller. The controller clears the bit once the reset is
    /// complete.
    pub host_controller_reset: bool,
    /// Whether the controller raises system interrupts for interrupters which have them enabled
    pub interrupter_enable: bool,
    /// Whether the controller signals host system errors out of band
    pub host_system_error_enable: bool,
    #[bits(3)]
    __: u8,
    /// Writing `true` performs a light reset which doesn't affect port state
    pub light_host_controller_reset: bool,
    /// Writing `true` makes the controller save its internal state
    pub controller_save_state: bool,
    /// Writing `true` makes the controller restore its internal state
    pub controller_restore_state: bool,
    /// Whether the controller generates an event when MFINDEX wraps
    pub enable_wrap_event: bool,
    /// Whether the controller may stop MFINDEX while all ports are in U3 or disconnected
    pub enable_u3_mfindex_stop: bool,
    #[bits(20)]
    __: u32,
}

/// The `USBSTS` field of an [`OperationalRegisters`] structure (xHCI 1.2, section 5.4.2).
///
/// The change bits are cleared by writing `true` to them.
#[bitfield(u32)]
pub struct UsbStatus {
    /// Whether the controller has stopped running
    pub host_controller_halted: bool,
    #[bits(1)]
    __: u8,
    /// Set when the controller hits a serious error
    pub host_system_error: bool,
    /// Set when any interrupter has a pending interrupt
    pub event_interrupt: bool,
    /// Set when any port has a change bit set
    pub port_change_detect: bool,
    #[bits(3)]
    __: u8,
    /// Set while a save state operation is in progress
    pub save_state_status: bool,
    /// Set while a restore state operation is in progress
    pub restore_state_status: bool,
    /// Set if a save or restore state operation failed
    pub save_restore_error: bool,
    /// Set while the controller is not ready for its operational registers to be written, e.g.
    /// during a reset
    pub controller_not_ready: bool,
    /// Set when the controller has detected an internal error and needs to be reset
    pub host_controller_error: bool,
    #[bits(19)]
    __: u32,
}

/// The `CRCR` field of an [`OperationalRegisters`] structure (xHCI 1.2, section 5.4.5)
#[bitfield(u64)]
pub struct CommandRingControl {
    /// The initial cycle state of the command ring. Only written while the ring is stopped.
    pub ring_cycle_state: bool,
    /// Writing `true` stops the command ring after the current command
    pub command_stop: bool,
    /// Writing `true` aborts the current command and stops the command ring
    pub command_abort: bool,
    /// Whether the command ring is running
    pub command_ring_running: bool,
    #[bits(2)]
    __: u8,
    /// The high 58 bits of the dequeue pointer of the command ring
    #[bits(58)]
    command_ring_pointer_high: u64,
}

impl CommandRingControl {
    /// Sets the command ring's dequeue pointer.
    ///
    /// # Panics
    /// If `pointer` is not 64 byte aligned
    pub fn with_command_ring_pointer(self, pointer: PhysAddr) -> Self {
        assert!(pointer.is_aligned(64u64));
        self.with_command_ring_pointer_high(pointer.as_u64() >> 6)
    }

    /// Gets the command ring's dequeue pointer
    pub fn command_ring_pointer(&self) -> PhysAddr {
        PhysAddr::new(self.command_ring_pointer_high() << 6)
    }
}

/// The `CONFIG` field of an [`OperationalRegisters`] structure (xHCI 1.2, section 5.4.7)
#[bitfield(u32)]
pub struct ConfigureRegister {
    /// The number of device slots software allows the controller to use
    pub max_device_slots_enabled: u8,
    /// Whether the controller asserts U3 entry for suspended ports
    pub u3_entry_enable: bool,
    /// Whether the extended input control context fields are used
    pub configuration_information_enable: bool,
    #[bits(22)]
    __: u32,
}

/// The layout of the operational registers in memory (xHCI 1.2, section 5.4)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct OperationalRegistersFields {
    /// The `USBCMD` register
    usb_command: UsbCommand,
    /// The `USBSTS` register
    usb_status: UsbStatus,
    /// The `PAGESIZE` register: bit `n` set means pages of `2^(n+12)` bytes are supported
    page_size: u32,
    /// Reserved
    _reserved0: [u32; 2],
    /// The `DNCTRL` register
    device_notification_control: u32,
    /// The `CRCR` register
    command_ring_control: CommandRingControl,
    /// Reserved
    _reserved1: [u32; 4],
    /// The `DCBAAP` register. The low 6 bits are reserved.
    device_context_base_address_array_pointer: u64,
    /// The `CONFIG` register
    configure: ConfigureRegister,
}

/// The operational registers of an xHCI controller
#[derive(Debug)]
pub struct OperationalRegisters {
    /// The pointer to the registers
    ptr: NonNull<OperationalRegistersFields>,
    /// The number of root hub ports, from [`StructuralParameters1::max_ports`]
    ///
    /// [`StructuralParameters1::max_ports`]: super::capability::StructuralParameters1::max_ports
    max_ports: u8,
}

#[rustfmt::skip]
impl OperationalRegisters {
    volatile_accessors!(
        OperationalRegistersFields,
        usb_command, UsbCommand,
        (pub fn read_usb_command), (pub fn write_usb_command)
    );
    volatile_accessors!(
        OperationalRegistersFields,
        usb_status, UsbStatus,
        (pub fn read_usb_status), (pub fn write_usb_status)
    );
    volatile_getter!(
        OperationalRegistersFields,
        page_size, u32,
        (fn read_page_size_bits)
    );
    volatile_accessors!(
        OperationalRegistersFields,
        command_ring_control, CommandRingControl,
        (pub fn read_command_ring_control), (pub fn write_command_ring_control)
    );
    volatile_accessors!(
        OperationalRegistersFields,
        device_context_base_address_array_pointer, u64,
        (fn read_dcbaap_raw), (fn write_dcbaap_raw)
    );
    volatile_accessors!(
        OperationalRegistersFields,
        configure, ConfigureRegister,
        (pub fn read_configure), (pub fn write_configure)
    );
}

impl OperationalRegisters {
    /// Wraps the operational registers at the given address
    ///
    /// # Safety
    /// `address` must be the start of the operational registers of an xHCI controller with
    /// `max_ports` ports, which must stay mapped for the lifetime of the returned value.
    pub unsafe fn new(address: VirtAddr, max_ports: u8) -> Self {
        Self {
            ptr: NonNull::new(address.as_mut_ptr())
                .expect("xHCI operational registers should not be at null"),
            max_ports,
        }
    }

    /// The smallest page size supported by the controller, in bytes
    pub fn read_page_size(&self) -> u64 {
        let bits = self.read_page_size_bits() & 0xffff;

        // A controller must support at least one page size, so fall back to 4K if the register is
        // empty
        if bits == 0 {
            0x1000
        } else {
            1 << (bits.trailing_zeros() + 12)
        }
    }

    /// Sets the address of the _Device Context Base Address Array_
    ///
    /// # Panics
    /// If `pointer` is not 64 byte aligned
    pub fn write_device_context_base_address_array_pointer(&mut self, pointer: PhysAddr) {
        assert!(pointer.is_aligned(64u64));
        self.write_dcbaap_raw(pointer.as_u64());
    }

    /// Gets the address of the _Device Context Base Address Array_
    pub fn read_device_context_base_address_array_pointer(&self) -> PhysAddr {
        PhysAddr::new(self.read_dcbaap_raw() & !0x3f)
    }

    /// The number of root hub ports
    pub fn max_ports(&self) -> u8 {
        self.max_ports
    }

    /// Gets the register set of the given port. Ports are numbered from 1.
    pub fn port(&self, port_number: u8) -> Option<PortRegisters> {
        if port_number == 0 || port_number > self.max_ports {
            return None;
        }

        let offset = PORT_REGISTERS_OFFSET + 0x10 * u64::from(port_number - 1);

        // SAFETY: the port number was checked to be in range,
        // so the register set is inside the operational registers' MMIO region
        unsafe {
            let address = VirtAddr::from_ptr(self.ptr.as_ptr()) + offset;
            Some(PortRegisters::new(address))
        }
    }
}
