//! The [`CapabilityRegisters`] type, which describes the limits and features of a controller

use core::ptr::NonNull;

use x86_64::VirtAddr;

use crate::xhci::{contexts::ContextSize, volatile_getter};

/// The `HCSPARAMS1` field of a [`CapabilityRegisters`] structure (xHCI 1.2, section 5.3.3)
#[bitfield(u32)]
pub struct StructuralParameters1 {
    /// The number of device slots the controller supports. This is the maximum slot ID.
    pub max_device_slots: u8,
    /// The number of interrupters the controller implements
    #[bits(11)]
    pub max_interrupters: u16,
    #[bits(5)]
    __: u8,
    /// The number of root hub ports. This is the highest port number.
    pub max_ports: u8,
}

/// The `HCSPARAMS2` field of a [`CapabilityRegisters`] structure (xHCI 1.2, section 5.3.4)
#[bitfield(u32)]
pub struct StructuralParameters2 {
    /// The minimum distance in frames to stay ahead of the controller when scheduling isochronous
    /// TRBs
    #[bits(4)]
    pub isochronous_scheduling_threshold: u8,
    /// The power of 2 of the maximum number of event ring segment table entries
    #[bits(4)]
    pub erst_max: u8,
    #[bits(13)]
    __: u16,
    /// The high 5 bits of the number of scratchpad buffers
    #[bits(5)]
    max_scratchpad_buffers_high: u16,
    /// Whether scratchpad buffers must be preserved across power events
    pub scratchpad_restore: bool,
    /// The low 5 bits of the number of scratchpad buffers
    #[bits(5)]
    max_scratchpad_buffers_low: u16,
}

impl StructuralParameters2 {
    /// Gets the number of scratchpad buffers which software must provide for the controller
    pub fn max_scratchpad_buffers(&self) -> u16 {
        self.max_scratchpad_buffers_high() << 5 | self.max_scratchpad_buffers_low()
    }
}

impl ContextSize {
    /// Constructs a [`ContextSize`] from its bit representation in [`CapabilityParameters1`]
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Small,
            _ => Self::Large,
        }
    }

    /// Converts a [`ContextSize`] into its bit representation in [`CapabilityParameters1`]
    const fn into_bits(self) -> u8 {
        match self {
            Self::Small => 0,
            Self::Large => 1,
        }
    }
}

/// The `HCCPARAMS1` field of a [`CapabilityRegisters`] structure (xHCI 1.2, section 5.3.6)
#[bitfield(u32)]
pub struct CapabilityParameters1 {
    /// Whether the controller can be given 64 bit pointers
    pub is_64_bit: bool,
    /// Whether the controller supports bandwidth negotiation
    pub supports_bandwidth_negotiation: bool,
    /// Whether the controller uses 32 or 64 byte context data structures
    #[bits(1)]
    pub context_size: ContextSize,
    /// Whether the controller supports port power control
    pub supports_port_power_control: bool,
    /// Whether the root hub ports support port indicator control
    pub supports_port_indicator_control: bool,
    /// Whether the controller supports a _Light Host Controller Reset_
    pub supports_lhcr: bool,
    /// Whether the controller supports _Latency Tolerance Messaging_
    pub supports_ltm: bool,
    /// Inverted: set when secondary stream IDs are not supported
    pub secondary_stream_ids_not_supported: bool,
    /// Whether all Event Data TRBs are parsed after a short packet
    pub parses_all_event_data_trbs: bool,
    /// Whether the controller can generate a _Stopped - Short Packet_ completion code
    pub can_produce_stop_short_packet: bool,
    /// Whether stream contexts support a _Stopped EDTLA_ field
    pub supports_stopped_edtla: bool,
    /// Whether the controller can match the frame ID of consecutive isochronous TDs
    pub can_match_consecutive_isoch_frame_id: bool,
    /// The exponent of the maximum _Primary Stream Array_ size
    #[bits(4)]
    pub max_primary_stream_array_size_exponent: u8,
    /// A pointer to the extended capabilities list, in 32 bit words, relative to the MMIO base
    pub extended_capabilities_pointer: u16,
}

/// The `DBOFF` field of a [`CapabilityRegisters`] structure
#[bitfield(u32)]
struct DoorbellOffsetRegister {
    #[bits(2)]
    __: u8,
    /// The offset of the doorbell array from the MMIO base, in 32 bit words
    #[bits(30)]
    doorbell_array_offset_dwords: u32,
}

/// The `RTSOFF` field of a [`CapabilityRegisters`] structure
#[bitfield(u32)]
struct RuntimeRegisterSpaceOffsetRegister {
    #[bits(5)]
    __: u8,
    /// The offset of the runtime registers from the MMIO base, in units of 32 bytes
    #[bits(27)]
    runtime_register_space_offset_32_bytes: u32,
}

/// The layout of the capability registers in memory (xHCI 1.2, section 5.3)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CapabilityRegistersFields {
    /// The length of the capability registers.
    /// The operational registers start this number of bytes after the capability registers.
    capability_register_length: u8,
    /// Reserved
    _reserved0: u8,
    /// The interface version number in binary coded decimal, e.g. `0x0110` is `1.1.0`
    version: u16,
    /// The first structural parameters register
    structural_parameters_1: StructuralParameters1,
    /// The second structural parameters register
    structural_parameters_2: StructuralParameters2,
    /// The third structural parameters register
    structural_parameters_3: u32,
    /// The first capability parameters register
    capability_parameters_1: CapabilityParameters1,
    /// The doorbell offset register
    doorbell_offset: DoorbellOffsetRegister,
    /// The runtime register space offset register
    runtime_register_space_offset: RuntimeRegisterSpaceOffsetRegister,
    /// The second capability parameters register
    capability_parameters_2: u32,
}

/// The capability registers of an xHCI controller, which are at the start of its MMIO region. These
/// registers are read-only.
#[derive(Debug)]
pub struct CapabilityRegisters {
    /// The pointer to the registers
    ptr: NonNull<CapabilityRegistersFields>,
}

#[rustfmt::skip]
impl CapabilityRegisters {
    volatile_getter!(
        CapabilityRegistersFields,
        capability_register_length, u8,
        (pub fn capability_register_length)
    );
    volatile_getter!(
        CapabilityRegistersFields,
        version, u16,
        (pub fn version)
    );
    volatile_getter!(
        CapabilityRegistersFields,
        structural_parameters_1, StructuralParameters1,
        (pub fn structural_parameters_1)
    );
    volatile_getter!(
        CapabilityRegistersFields,
        structural_parameters_2, StructuralParameters2,
        (pub fn structural_parameters_2)
    );
    volatile_getter!(
        CapabilityRegistersFields,
        capability_parameters_1, CapabilityParameters1,
        (pub fn capability_parameters_1)
    );
    volatile_getter!(
        CapabilityRegistersFields,
        doorbell_offset, DoorbellOffsetRegister,
        (fn doorbell_offset_register)
    );
    volatile_getter!(
        CapabilityRegistersFields,
        runtime_register_space_offset, RuntimeRegisterSpaceOffsetRegister,
        (fn runtime_register_space_offset_register)
    );
}

impl CapabilityRegisters {
    /// Wraps the capability registers at the start of a controller's MMIO region.
    ///
    /// # Safety
    /// `mmio_base` must point to the mapped MMIO region of an xHCI controller,
    /// which must stay mapped for the lifetime of the returned value.
    pub unsafe fn new(mmio_base: VirtAddr) -> Self {
        Self {
            ptr: NonNull::new(mmio_base.as_mut_ptr())
                .expect("xHCI MMIO base should not be null"),
        }
    }

    /// The offset of the doorbell array from the MMIO base, in bytes
    pub fn doorbell_offset(&self) -> u64 {
        u64::from(self.doorbell_offset_register().doorbell_array_offset_dwords()) << 2
    }

    /// The offset of the runtime registers from the MMIO base, in bytes
    pub fn runtime_register_space_offset(&self) -> u64 {
        u64::from(
            self.runtime_register_space_offset_register()
                .runtime_register_space_offset_32_bytes(),
        ) * 32
    }

    /// Splits a binary coded decimal version number into its three parts
    pub fn parse_version(version: u16) -> (u8, u8, u8) {
        let nibble = |shift: u16| ((version >> shift) & 0xf) as u8;

        (nibble(12) * 10 + nibble(8), nibble(4), nibble(0))
    }
}
