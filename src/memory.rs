//! Memory which is shared with the controller by DMA.
//!
//! The kernel heap is identity mapped, so the virtual address of an allocation is also its physical
//! address.

use core::alloc::Layout;
use core::ptr::NonNull;

use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error};
use x86_64::PhysAddr;

/// A zeroed heap allocation with a given alignment, whose address can be given to the controller.
///
/// The memory is freed when the [`DmaBox`] is dropped, so the controller must be finished with it
/// by then.
#[derive(Debug)]
pub struct DmaBox {
    /// The start of the allocation
    ptr: NonNull<u8>,
    /// The layout the memory was allocated with
    layout: Layout,
}

// SAFETY: `DmaBox` uniquely owns its allocation, like a `Box<[u8]>`
unsafe impl Send for DmaBox {}

impl DmaBox {
    /// Allocates `size` zeroed bytes aligned to `align`.
    ///
    /// # Panics
    /// If `align` is not a power of two
    pub fn new_zeroed(size: usize, align: usize) -> Self {
        // Zero-sized allocations are not allowed
        let layout = Layout::from_size_align(size.max(1), align)
            .expect("DMA allocation size or alignment should be valid");

        // SAFETY: `layout` has a non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout)
        };

        Self { ptr, layout }
    }

    /// Gets a pointer to the start of the allocation
    pub fn as_ptr<T>(&self) -> *const T {
        self.ptr.as_ptr().cast()
    }

    /// Gets a mutable pointer to the start of the allocation
    pub fn as_mut_ptr<T>(&mut self) -> *mut T {
        self.ptr.as_ptr().cast()
    }

    /// Gets the address of the allocation as seen by the controller
    pub fn phys_addr(&self) -> PhysAddr {
        PhysAddr::new(self.ptr.as_ptr() as u64)
    }

    /// The size of the allocation in bytes
    pub fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for DmaBox {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated with `layout` in `new_zeroed` and has not been freed
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// A data buffer for a USB transfer.
///
/// While a transfer is in flight the buffer is held by the driver's record of that transfer, so it
/// can't be freed or reused until the controller reports that the transfer has completed.
#[derive(Debug)]
pub struct DmaBuffer {
    /// The memory holding the data
    memory: DmaBox,
    /// The number of bytes in the buffer
    len: usize,
}

impl DmaBuffer {
    /// The smallest alignment of a transfer buffer
    const MIN_ALIGN: usize = 64;

    /// The size of the blocks which the data buffer of a single TRB must not cross
    pub const BOUNDARY: usize = 0x1_0000;

    /// Allocates a zeroed buffer of `len` bytes.
    ///
    /// Buffers of up to [`BOUNDARY`] bytes are aligned to their size rounded up to a power of two,
    /// so they never cross a [`BOUNDARY`].
    ///
    /// [`BOUNDARY`]: DmaBuffer::BOUNDARY
    pub fn new(len: usize) -> Self {
        let align = len
            .next_power_of_two()
            .clamp(Self::MIN_ALIGN, Self::BOUNDARY);

        Self {
            memory: DmaBox::new_zeroed(len, align),
            len,
        }
    }

    /// Allocates a buffer holding a copy of `data`
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buffer = Self::new(data.len());
        buffer.as_mut_slice().copy_from_slice(data);
        buffer
    }

    /// The number of bytes in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is zero bytes long
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Gets the address of the buffer as seen by the controller
    pub fn phys_addr(&self) -> PhysAddr {
        self.memory.phys_addr()
    }

    /// Whether the buffer fits in one [`BOUNDARY`][DmaBuffer::BOUNDARY]-sized block
    pub fn within_boundary(&self) -> bool {
        if self.len == 0 {
            return true;
        }

        let start = self.phys_addr().as_u64();
        let end = start + self.len as u64 - 1;
        start / Self::BOUNDARY as u64 == end / Self::BOUNDARY as u64
    }

    /// Gets the contents of the buffer
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `memory` is at least `len` bytes long and was zero-initialised
        unsafe { core::slice::from_raw_parts(self.memory.as_ptr(), self.len) }
    }

    /// Gets the contents of the buffer mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `memory` is at least `len` bytes long and was zero-initialised
        unsafe { core::slice::from_raw_parts_mut(self.memory.as_mut_ptr(), self.len) }
    }
}
