//! The [`DeviceContextBaseAddressArray`] struct for associating xHCI Device Slots
//! with their respective device context data structures.

use x86_64::PhysAddr;

use super::scratchpad::ScratchpadBufferArray;
use crate::memory::DmaBox;

/// The _Device Context Base Address Array_ (DCBAA) data structure is used to
/// associate an xHCI _Device Slot_ with its output device context.
/// Entry `n` holds the address of the device context for slot `n`, or 0 if the slot is not in use.
///
/// Entry 0 holds the address of the [`ScratchpadBufferArray`], if the controller asked for one.
///
/// The DCBAA is 64-byte aligned and may not span page boundaries.
#[derive(Debug)]
pub struct DeviceContextBaseAddressArray {
    /// The memory holding the array
    memory: DmaBox,
    /// The number of device slots, not including entry 0
    max_slots: u8,
    /// The scratchpad buffers, which must live as long as the controller can use them
    scratchpad: Option<ScratchpadBufferArray>,
}

impl DeviceContextBaseAddressArray {
    /// Allocates a new DCBAA with entries for `max_slots` slots, and installs the scratchpad
    /// buffers if any are given
    pub fn new(max_slots: u8, scratchpad: Option<ScratchpadBufferArray>) -> Self {
        let mut dcbaa = Self {
            memory: DmaBox::new_zeroed((usize::from(max_slots) + 1) * 8, 0x1000),
            max_slots,
            scratchpad,
        };

        if let Some(addr) = dcbaa.scratchpad.as_ref().map(|s| s.array_addr()) {
            dcbaa.write_entry(0, addr.as_u64());
        }

        dcbaa
    }

    /// Gets the address of the DCBAA
    pub fn array_addr(&self) -> PhysAddr {
        self.memory.phys_addr()
    }

    /// Reads the address of the scratchpad buffer array, or [`None`] if there isn't one
    pub fn scratchpad_buffer_array(&self) -> Option<PhysAddr> {
        let v = self.read_entry(0);
        (v != 0).then(|| PhysAddr::new(v & !0b11111))
    }

    /// Gets the device context address for the given slot, or [`None`] if the slot is not in use
    ///
    /// # Panics
    /// If `slot_id` is 0 or more than the number of slots
    pub fn slot_addr(&self, slot_id: u8) -> Option<PhysAddr> {
        assert!((1..=self.max_slots).contains(&slot_id), "Index outside of table");

        let v = self.read_entry(slot_id.into());
        (v != 0).then(|| PhysAddr::new(v & !0b111111))
    }

    /// Points the given slot's entry at a device context
    ///
    /// # Panics
    /// * If the index is outside the range of the table
    /// * If `address` is not 64 byte aligned
    pub fn set_slot_addr(&mut self, slot_id: u8, address: PhysAddr) {
        assert!((1..=self.max_slots).contains(&slot_id), "Index outside of table");
        assert!(address.is_aligned(64u64), "Address must be 64-byte aligned");

        self.write_entry(slot_id.into(), address.as_u64());
    }

    /// Clears the given slot's entry
    pub fn clear_slot(&mut self, slot_id: u8) {
        assert!((1..=self.max_slots).contains(&slot_id), "Index outside of table");

        self.write_entry(slot_id.into(), 0);
    }

    /// Reads entry `i`
    fn read_entry(&self, i: usize) -> u64 {
        // SAFETY: callers check that `i <= max_slots`, so the entry is in the array
        unsafe { self.memory.as_ptr::<u64>().add(i).read_volatile() }
    }

    /// Writes entry `i`
    fn write_entry(&mut self, i: usize, value: u64) {
        // SAFETY: callers check that `i <= max_slots`, so the entry is in the array
        unsafe { self.memory.as_mut_ptr::<u64>().add(i).write_volatile(value) }
    }
}
