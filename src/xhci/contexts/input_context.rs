//! The [`InputContext`] type

use x86_64::PhysAddr;

use super::{
    endpoint_context::EndpointContext, slot_context::SlotContext, ContextArray, ContextSize,
    DEVICE_CONTEXT_ENTRIES,
};

/// The _Input Control Context_, which tells the controller which contexts of an [`InputContext`] to
/// act on
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InputControlContext {
    /// Bit `n` set means context `n` should be disabled. Bits 0 and 1 are reserved.
    pub drop_context_flags: u32,
    /// Bit `n` set means context `n` should be evaluated or enabled
    pub add_context_flags: u32,
    #[doc(hidden)]
    _reserved0: [u32; 5],
    /// The `bConfigurationValue` of the configuration being set
    pub configuration_value: u8,
    /// The interface being selected
    pub interface_number: u8,
    /// The alternate setting of the interface
    pub alternate_setting: u8,
    #[doc(hidden)]
    _reserved1: u8,
}

impl InputControlContext {
    /// Marks context `n` to be added, where 0 is the slot context and `n > 0` is a _Device Context
    /// Index_
    pub fn add(&mut self, n: u8) {
        assert!(n < 32);
        self.add_context_flags |= 1 << n;
    }

    /// Whether context `n` is marked to be added
    pub fn is_added(&self, n: u8) -> bool {
        assert!(n < 32);
        self.add_context_flags & (1 << n) != 0
    }
}

/// An _Input Context_, which software fills in and passes to the _Address Device_ and
/// _Configure Endpoint_ commands. The controller only reads it while a command is executing.
#[derive(Debug)]
pub struct InputContext {
    /// The input control context, followed by a slot context and 31 endpoint contexts
    contexts: ContextArray,
}

impl InputContext {
    /// Allocates a zeroed input context
    pub fn new(context_size: ContextSize) -> Self {
        Self {
            contexts: ContextArray::new(DEVICE_CONTEXT_ENTRIES + 1, context_size),
        }
    }

    /// The address of the input context, which is passed to commands
    pub fn addr(&self) -> PhysAddr {
        self.contexts.addr()
    }

    /// Zeroes every context
    pub fn clear(&mut self) {
        self.contexts.write(0, InputControlContext::default());
        self.contexts.write(1, SlotContext::default());
        for dci in 1..32 {
            self.set_endpoint_context(dci, EndpointContext::default());
        }
    }

    /// Reads the input control context
    pub fn control(&self) -> InputControlContext {
        self.contexts.read(0)
    }

    /// Writes the input control context
    pub fn set_control(&mut self, control: InputControlContext) {
        self.contexts.write(0, control);
    }

    /// Reads the slot context
    pub fn slot_context(&self) -> SlotContext {
        self.contexts.read(1)
    }

    /// Writes the slot context
    pub fn set_slot_context(&mut self, context: SlotContext) {
        self.contexts.write(1, context);
    }

    /// Reads the context of the endpoint with the given _Device Context Index_
    ///
    /// # Panics
    /// If `dci` is not in `1..32`
    pub fn endpoint_context(&self, dci: u8) -> EndpointContext {
        assert!((1..32).contains(&dci));
        self.contexts.read(usize::from(dci) + 1)
    }

    /// Writes the context of the endpoint with the given _Device Context Index_
    ///
    /// # Panics
    /// If `dci` is not in `1..32`
    pub fn set_endpoint_context(&mut self, dci: u8, context: EndpointContext) {
        assert!((1..32).contains(&dci));
        self.contexts.write(usize::from(dci) + 1, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_are_offset_by_control_context() {
        let mut input = InputContext::new(ContextSize::Small);

        let mut control = InputControlContext::default();
        control.add(0);
        control.add(1);
        input.set_control(control);
        input.set_slot_context(SlotContext::default().with_context_entries(1));
        input.set_endpoint_context(1, EndpointContext::default().with_max_packet_size(64));

        // SAFETY: the input context is 33 * 32 bytes long
        let raw = unsafe { core::slice::from_raw_parts(input.addr().as_u64() as *const u32, 24) };
        assert_eq!(raw[1], 0b11);
        assert_eq!(raw[8], 1 << 27);
        assert_eq!(raw[17], 64 << 16);

        assert!(input.control().is_added(1));
        assert!(!input.control().is_added(2));
    }

    #[test]
    fn clear_zeroes_everything() {
        let mut input = InputContext::new(ContextSize::Large);
        input.set_slot_context(SlotContext::default().with_context_entries(31));
        input.set_endpoint_context(31, EndpointContext::default().with_interval(3));

        input.clear();
        assert_eq!(input.slot_context().context_entries(), 0);
        assert_eq!(input.endpoint_context(31).interval(), 0);
    }
}
