//! The [`DoorbellArray`] and [`DoorbellRegister`] types, which software uses to tell the controller
//! that there are new TRBs on a ring.

use core::ptr::NonNull;

use volatile::VolatilePtr;
use x86_64::VirtAddr;

use crate::endpoint::EndpointId;

/// The value written to a doorbell register (xHCI 1.2, section 5.6)
#[bitfield(u32)]
pub struct DoorbellValue {
    /// For the host controller doorbell, 0 to signal the command ring.
    /// For device doorbells, the _Device Context Index_ of the endpoint with new transfers.
    pub target: u8,
    #[bits(8)]
    __: u8,
    /// The stream the new transfers are on, for endpoints with streams enabled
    pub stream_id: u16,
}

/// The array of doorbell registers. Doorbell 0 belongs to the controller and
/// doorbell `n` belongs to device slot `n`.
#[derive(Debug)]
pub struct DoorbellArray {
    /// The first doorbell register
    base: NonNull<u32>,
    /// The number of doorbells, which is one more than the number of device slots
    len: usize,
}

impl DoorbellArray {
    /// Wraps the doorbell array at the given address
    ///
    /// # Safety
    /// `base` must be the address of the doorbell array of a controller with `max_device_slots`
    /// slots, which must stay mapped for the lifetime of the returned value.
    pub unsafe fn new(base: VirtAddr, max_device_slots: u8) -> Self {
        Self {
            base: NonNull::new(base.as_mut_ptr()).expect("doorbell array should not be at null"),
            len: usize::from(max_device_slots) + 1,
        }
    }

    /// Gets the doorbell register with the given index, or [`None`] if the index is out of range
    pub fn get(&self, index: u8) -> Option<DoorbellRegister> {
        let index = usize::from(index);
        if index >= self.len {
            return None;
        }

        // SAFETY: the index is in range so the pointer is inside the doorbell array
        let ptr = unsafe { self.base.add(index) };
        Some(DoorbellRegister { ptr })
    }
}

/// A single doorbell register
#[derive(Debug)]
pub struct DoorbellRegister {
    /// The pointer to the register
    ptr: NonNull<u32>,
}

// SAFETY: the register is MMIO, so it can be written from any thread
unsafe impl Send for DoorbellRegister {}

impl DoorbellRegister {
    /// Wraps a doorbell register at the given pointer
    ///
    /// # Safety
    /// `ptr` must point to a doorbell register which stays mapped for the lifetime of the returned
    /// value
    pub unsafe fn new(ptr: NonNull<u32>) -> Self {
        Self { ptr }
    }

    /// Writes a value to the doorbell
    pub fn ring(&mut self, value: DoorbellValue) {
        // SAFETY: the pointer points to a doorbell register which is valid while `self` exists
        let register = unsafe { VolatilePtr::new(self.ptr) };
        register.write(value.into());
    }

    /// Rings the host controller doorbell to signal that there are new commands on the command ring
    pub fn ring_command(&mut self) {
        self.ring(DoorbellValue::new());
    }

    /// Rings a device doorbell to signal that there are new transfers for the given endpoint
    pub fn ring_endpoint(&mut self, endpoint: EndpointId) {
        self.ring(DoorbellValue::new().with_target(endpoint.dci()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_writes_endpoint_dci() {
        let mut memory = [0u32; 9];
        // SAFETY: `memory` outlives the array
        let array = unsafe { DoorbellArray::new(VirtAddr::from_ptr(memory.as_mut_ptr()), 8) };

        array
            .get(3)
            .expect("slot 3 should have a doorbell")
            .ring_endpoint(EndpointId::new(2, true));
        array.get(0).expect("doorbell 0 should exist").ring_command();

        assert_eq!(memory[3], 5);
        assert_eq!(memory[0], 0);
        assert!(array.get(9).is_none());
    }
}
