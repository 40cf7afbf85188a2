//! The [`ScratchpadBufferArray`] type

use alloc::vec::Vec;
use x86_64::PhysAddr;

use crate::memory::DmaBox;

/// The _Scratchpad Buffer Array_ (xHCI 1.2, section 6.6).
///
/// This gives the controller pointers to pages of memory for its own private use.
#[derive(Debug)]
pub struct ScratchpadBufferArray {
    /// The array of pointers to the buffers in [`buffers`]
    ///
    /// [`buffers`]: ScratchpadBufferArray::buffers
    array: DmaBox,
    /// The buffers which are given to the controller
    buffers: Vec<DmaBox>,
}

impl ScratchpadBufferArray {
    /// Allocates `len` buffers of `page_size` bytes and an array pointing to them
    pub fn new(len: usize, page_size: u64) -> Self {
        let page_size = usize::try_from(page_size).unwrap_or(0x1000);
        let mut array = DmaBox::new_zeroed(len * 8, 64);

        let buffers: Vec<DmaBox> = (0..len)
            .map(|_| DmaBox::new_zeroed(page_size, page_size))
            .collect();

        for (i, buffer) in buffers.iter().enumerate() {
            // SAFETY: `i < len` so the entry is in the array
            unsafe {
                array
                    .as_mut_ptr::<u64>()
                    .add(i)
                    .write_volatile(buffer.phys_addr().as_u64());
            }
        }

        Self { array, buffers }
    }

    /// Gets the physical address of the _Scratchpad Buffer Array_, which goes in entry 0 of the
    /// DCBAA
    pub fn array_addr(&self) -> PhysAddr {
        self.array.phys_addr()
    }

    /// The number of buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_points_at_page_aligned_buffers() {
        let scratchpad = ScratchpadBufferArray::new(3, 0x1000);
        assert_eq!(scratchpad.len(), 3);

        for i in 0..3 {
            // SAFETY: the array has 3 entries
            let entry = unsafe { scratchpad.array.as_ptr::<u64>().add(i).read() };
            assert_eq!(entry, scratchpad.buffers[i].phys_addr().as_u64());
            assert_eq!(entry % 0x1000, 0);
        }
    }
}
