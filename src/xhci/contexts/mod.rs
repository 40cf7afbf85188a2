//! Types for the context data structures shared with the controller

use core::fmt::Debug;

use x86_64::PhysAddr;

use crate::memory::DmaBox;

pub mod device_context;
pub mod endpoint_context;
pub mod input_context;
pub mod slot_context;

/// The number of contexts in a device context: one slot context and 31 endpoint contexts
pub const DEVICE_CONTEXT_ENTRIES: usize = 32;

/// The size of various context data structures.
///
/// This is dependant on the [`context_size`] field of the controller's capability registers.
///
/// [`context_size`]: super::registers::capability::CapabilityParameters1::context_size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSize {
    /// A context struct takes 32 bytes
    Small,
    /// A context struct takes 64 bytes
    Large,
}

impl ContextSize {
    /// Gets the number of bytes in a context structure
    pub const fn bytes(self) -> usize {
        match self {
            Self::Small => 32,
            Self::Large => 64,
        }
    }
}

/// Generates a getter, setter and builder method on a context struct for a field of one of its
/// bitfield dwords
macro_rules! update_methods {
    (
        $dword: ident,
        $field: ident, $t: ty,
        $getter: ident, $setter: ident, $with: ident
    ) => {
        #[doc = concat!("Gets the `", stringify!($field), "` field")]
        pub fn $getter(&self) -> $t {
            self.$dword.$getter()
        }

        #[doc = concat!("Sets the `", stringify!($field), "` field")]
        pub fn $setter(&mut self, value: $t) {
            self.$dword.$setter(value);
        }

        #[doc = concat!("Returns a copy with the `", stringify!($field), "` field set")]
        #[must_use]
        pub fn $with(mut self, value: $t) -> Self {
            self.$setter(value);
            self
        }
    };
}

use update_methods;

/// A page-contained array of contexts in memory shared with the controller, each `context_size`
/// bytes apart.
///
/// The context structs are always 32 bytes. With 64 byte contexts, the second half of each one is
/// reserved.
#[derive(Debug)]
struct ContextArray {
    /// The memory holding the contexts
    memory: DmaBox,
    /// The stride between contexts
    context_size: ContextSize,
    /// The number of contexts in the array
    len: usize,
}

impl ContextArray {
    /// Allocates a zeroed array of `len` contexts.
    /// The array is page aligned, so it can't cross a page boundary.
    fn new(len: usize, context_size: ContextSize) -> Self {
        let size = len * context_size.bytes();
        assert!(size <= 0x1000);

        Self {
            memory: DmaBox::new_zeroed(size, 0x1000),
            context_size,
            len,
        }
    }

    /// The address of the first context
    fn addr(&self) -> PhysAddr {
        self.memory.phys_addr()
    }

    /// Performs a volatile read of the context at `index`
    fn read<T: Copy>(&self, index: usize) -> T {
        assert!(index < self.len);
        assert!(core::mem::size_of::<T>() <= self.context_size.bytes());

        // SAFETY: `index` is in bounds and the context fits in its stride
        unsafe {
            self.memory
                .as_ptr::<u8>()
                .add(index * self.context_size.bytes())
                .cast::<T>()
                .read_volatile()
        }
    }

    /// Performs a volatile write of the context at `index`
    fn write<T: Copy>(&mut self, index: usize, value: T) {
        assert!(index < self.len);
        assert!(core::mem::size_of::<T>() <= self.context_size.bytes());

        // SAFETY: `index` is in bounds and the context fits in its stride
        unsafe {
            self.memory
                .as_mut_ptr::<u8>()
                .add(index * self.context_size.bytes())
                .cast::<T>()
                .write_volatile(value);
        }
    }
}
