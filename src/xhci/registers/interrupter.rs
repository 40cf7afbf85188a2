//! The [`InterrupterRegisters`] type, and the runtime registers which hold the interrupter register
//! sets

use core::ptr::NonNull;

use x86_64::{PhysAddr, VirtAddr};

use crate::xhci::volatile_accessors;

/// The offset of the first interrupter register set from the start of the runtime registers
const INTERRUPTER_REGISTERS_OFFSET: u64 = 0x20;

/// The size of each interrupter register set
const INTERRUPTER_REGISTERS_SIZE: u64 = 0x20;

/// The _Interrupter Management Register_ (xHCI 1.2, section 5.5.2.1)
#[bitfield(u32)]
pub struct InterrupterManagement {
    /// Whether an interrupt is pending for this interrupter. Cleared by writing `true`.
    pub interrupt_pending: bool,
    /// Whether the interrupter is allowed to generate interrupts
    pub interrupt_enable: bool,
    #[bits(30)]
    __: u32,
}

/// The _Interrupter Moderation Register_ (xHCI 1.2, section 5.5.2.2)
#[bitfield(u32)]
pub struct InterrupterModeration {
    /// The minimum interval between interrupts, in 250ns increments. 0 disables throttling.
    pub interrupt_moderation_interval: u16,
    /// Counts down from [`interrupt_moderation_interval`][Self::interrupt_moderation_interval]
    pub interrupt_moderation_counter: u16,
}

/// The _Event Ring Segment Table Size Register_ (xHCI 1.2, section 5.5.2.3.1)
#[bitfield(u32)]
pub struct EventRingSegmentTableSize {
    /// The number of entries in the event ring segment table
    pub event_ring_segment_table_size: u16,
    #[bits(16)]
    __: u16,
}

/// The _Event Ring Dequeue Pointer Register_ (xHCI 1.2, section 5.5.2.3.3)
#[bitfield(u64)]
pub struct EventRingDequeuePointer {
    /// The index of the segment containing the dequeue pointer
    #[bits(3)]
    pub dequeue_erst_segment_index: u8,
    /// Set by the controller when it raises an interrupt. Cleared by writing `true`.
    pub event_handler_busy: bool,
    /// The high 60 bits of the dequeue pointer
    #[bits(60)]
    event_ring_dequeue_pointer_high: u64,
}

impl EventRingDequeuePointer {
    /// The address of the next TRB software will read from the event ring
    pub fn event_ring_dequeue_pointer(&self) -> PhysAddr {
        PhysAddr::new(self.event_ring_dequeue_pointer_high() << 4)
    }

    /// Sets the address of the next TRB software will read from the event ring
    pub fn with_event_ring_dequeue_pointer(self, value: PhysAddr) -> Self {
        self.with_event_ring_dequeue_pointer_high(value.as_u64() >> 4)
    }
}

/// The layout of an interrupter register set in memory (xHCI 1.2, section 5.5.2)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct InterrupterRegistersFields {
    /// The `IMAN` register
    interrupter_management: InterrupterManagement,
    /// The `IMOD` register
    interrupter_moderation: InterrupterModeration,
    /// The `ERSTSZ` register
    event_ring_segment_table_size: EventRingSegmentTableSize,
    /// Reserved
    _reserved0: u32,
    /// The `ERSTBA` register. The low 6 bits are reserved.
    event_ring_segment_table_base_address: u64,
    /// The `ERDP` register
    event_ring_dequeue_pointer: EventRingDequeuePointer,
}

/// The registers of one interrupter, which delivers events from the controller to software
#[derive(Debug)]
pub struct InterrupterRegisters {
    /// The pointer to the registers
    ptr: NonNull<InterrupterRegistersFields>,
}

// SAFETY: the registers are MMIO, so they can be accessed from any thread
unsafe impl Send for InterrupterRegisters {}

#[rustfmt::skip]
impl InterrupterRegisters {
    volatile_accessors!(
        InterrupterRegistersFields,
        interrupter_management, InterrupterManagement,
        (pub fn read_interrupter_management), (pub fn write_interrupter_management)
    );
    volatile_accessors!(
        InterrupterRegistersFields,
        interrupter_moderation, InterrupterModeration,
        (pub fn read_interrupter_moderation), (pub fn write_interrupter_moderation)
    );
    volatile_accessors!(
        InterrupterRegistersFields,
        event_ring_segment_table_size, EventRingSegmentTableSize,
        (pub fn read_event_ring_segment_table_size), (pub fn write_event_ring_segment_table_size)
    );
    volatile_accessors!(
        InterrupterRegistersFields,
        event_ring_segment_table_base_address, u64,
        (fn read_erstba_raw), (fn write_erstba_raw)
    );
    volatile_accessors!(
        InterrupterRegistersFields,
        event_ring_dequeue_pointer, EventRingDequeuePointer,
        (pub fn read_event_ring_dequeue_pointer), (pub fn write_event_ring_dequeue_pointer)
    );
}

impl InterrupterRegisters {
    /// Wraps the interrupter register set at the given address
    ///
    /// # Safety
    /// `address` must point to an interrupter register set which stays mapped for the lifetime of
    /// the returned value, and no other [`InterrupterRegisters`] may exist for the same registers.
    pub unsafe fn new(address: VirtAddr) -> Self {
        Self {
            ptr: NonNull::new(address.as_mut_ptr())
                .expect("interrupter registers should not be at null"),
        }
    }

    /// Reads the address of the _Event Ring Segment Table_
    pub fn read_event_ring_segment_table_base_address(&self) -> PhysAddr {
        PhysAddr::new(self.read_erstba_raw() & !0x3f)
    }

    /// Sets the address of the _Event Ring Segment Table_. This enables the event ring,
    /// so the table size and dequeue pointer must be written first.
    ///
    /// # Panics
    /// If `value` is not 64 byte aligned
    pub fn write_event_ring_segment_table_base_address(&mut self, value: PhysAddr) {
        assert!(value.is_aligned(64u64));
        self.write_erstba_raw(value.as_u64());
    }
}

/// The runtime registers of a controller, which hold the interrupter register sets
#[derive(Debug)]
pub struct RuntimeRegisters {
    /// The start of the runtime registers
    base: VirtAddr,
    /// The number of interrupters the controller implements
    max_interrupters: u16,
}

impl RuntimeRegisters {
    /// Wraps the runtime registers at the given address
    ///
    /// # Safety
    /// `base` must be the start of the runtime registers of a controller with `max_interrupters`
    /// interrupters, which must stay mapped for the lifetime of the returned value.
    pub unsafe fn new(base: VirtAddr, max_interrupters: u16) -> Self {
        Self {
            base,
            max_interrupters,
        }
    }

    /// Gets the register set of the interrupter with the given index.
    ///
    /// # Safety
    /// Only one [`InterrupterRegisters`] may exist for each interrupter at once
    pub unsafe fn interrupter(&self, index: u16) -> Option<InterrupterRegisters> {
        if index >= self.max_interrupters {
            return None;
        }

        let address = self.base
            + INTERRUPTER_REGISTERS_OFFSET
            + INTERRUPTER_REGISTERS_SIZE * u64::from(index);

        // SAFETY: the index is in range so the address is inside the runtime registers.
        // The caller guarantees the registers aren't aliased.
        Some(unsafe { InterrupterRegisters::new(address) })
    }
}
