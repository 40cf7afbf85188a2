//! The [`OwnedDeviceContext`] type

use x86_64::PhysAddr;

use super::{
    endpoint_context::EndpointContext, slot_context::SlotContext, ContextArray, ContextSize,
    DEVICE_CONTEXT_ENTRIES,
};

/// The output _Device Context_ of a device slot, which the controller uses to report the state of
/// the slot and its endpoints. Software only reads it once the slot's address is in the DCBAA.
#[derive(Debug)]
pub struct OwnedDeviceContext {
    /// The slot context followed by the 31 endpoint contexts
    contexts: ContextArray,
}

impl OwnedDeviceContext {
    /// Allocates a zeroed device context
    pub fn new(context_size: ContextSize) -> Self {
        Self {
            contexts: ContextArray::new(DEVICE_CONTEXT_ENTRIES, context_size),
        }
    }

    /// The address of the device context, which goes in the slot's DCBAA entry
    pub fn addr(&self) -> PhysAddr {
        self.contexts.addr()
    }

    /// Reads the slot context
    pub fn slot_context(&self) -> SlotContext {
        self.contexts.read(0)
    }

    /// Reads the context of the endpoint with the given _Device Context Index_
    ///
    /// # Panics
    /// If `dci` is not in `1..32`
    pub fn endpoint_context(&self, dci: u8) -> EndpointContext {
        assert!((1..32).contains(&dci));
        self.contexts.read(dci.into())
    }

    /// Writes the slot context, as the controller would.
    #[cfg(test)]
    pub(crate) fn write_slot_context(&mut self, context: SlotContext) {
        self.contexts.write(0, context);
    }
}
