//! Drivers for xHCI USB controllers. See the [xHCI spec] for more info.
//!
//! [xHCI spec]: https://www.intel.com/content/dam/www/public/us/en/documents/technical-specifications/extensible-host-controler-interface-usb-xhci.pdf

pub mod contexts;
pub mod controller;
pub mod dcbaa;
pub mod device;
pub mod devmgr;
pub mod event_ring;
pub mod port;
pub mod registers;
pub mod ring;
pub mod scratchpad;
pub mod trb;

#[cfg(test)]
mod tests;

/// Generates a getter which performs a volatile read of a field of a register block. The wrapper
/// struct must have a `ptr: NonNull<$field_struct>` field which is valid for the wrapper's
/// lifetime.
macro_rules! volatile_getter {
    (
        $field_struct: ty,
        $field: ident,
        $t: ty,

        $(#[$getter_attr: meta])*
        ($($getter_signature: tt)+)
    ) => {
        #[inline]
        #[doc = concat!(
            "Performs a volatile read of the [`",
            stringify!($field),
            "`][",
            stringify!($field_struct),
            "::",
            stringify!($field),
            "] field",
        )]
        $(#[$getter_attr])*
        $($getter_signature)+ (&self) -> $t {
            // SAFETY: The pointer stored in the wrapper struct must always be valid or this macro
            // is unsound
            let registers = unsafe { ::volatile::VolatilePtr::new(self.ptr) };
            ::volatile::map_field!(registers.$field).read()
        }
    };
}

/// Generates a setter which performs a volatile write to a field of a register block. The wrapper
/// struct must have a `ptr: NonNull<$field_struct>` field which is valid for the wrapper's
/// lifetime.
macro_rules! volatile_setter {
    (
        $field_struct: ty,
        $field: ident,
        $t: ty,

        $(#[$setter_attr: meta])*
        ($($setter_signature: tt)+)
    ) => {
        #[inline]
        #[doc = concat!(
            "Performs a volatile write of the [`",
            stringify!($field),
            "`][",
            stringify!($field_struct),
            "::",
            stringify!($field),
            "] field",
        )]
        $(#[$setter_attr])*
        $($setter_signature)+ (&mut self, value: $t) {
            // SAFETY: The pointer stored in the wrapper struct must always be valid or this macro
            // is unsound
            let registers = unsafe { ::volatile::VolatilePtr::new(self.ptr) };
            ::volatile::map_field!(registers.$field).write(value);
        }
    };
}

/// Generates both a [`volatile_getter`] and a [`volatile_setter`] for a field of a register block
macro_rules! volatile_accessors {
    (
        $field_struct: ty,
        $field: ident,
        $t: ty,

        $(#[$getter_attr: meta])*
        ($($getter_signature: tt)+),

        $(#[$setter_attr: meta])*
        ($($setter_signature: tt)+)
    ) => {
        $crate::xhci::volatile_getter!(
            $field_struct, $field, $t, $(#[$getter_attr])* ($($getter_signature)+)
        );
        $crate::xhci::volatile_setter!(
            $field_struct, $field, $t, $(#[$setter_attr])* ($($setter_signature)+)
        );
    };
}

use {volatile_accessors, volatile_getter, volatile_setter};
