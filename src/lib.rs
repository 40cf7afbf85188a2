//! A host-side driver for USB eXtensible Host Controller Interface (xHCI) controllers, plus class
//! drivers for the devices connected to them. See the [xHCI spec] for more info.
//!
//! The driver expects the kernel heap to be identity mapped, so that the virtual address of any
//! allocation can be handed to the controller as a physical address.
//!
//! [xHCI spec]: https://www.intel.com/content/dam/www/public/us/en/documents/technical-specifications/extensible-host-controler-interface-usb-xhci.pdf

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::all)]
#![warn(unsafe_op_in_unsafe_fn)]
#![deny(clippy::undocumented_unsafe_blocks)]

extern crate alloc;

#[macro_use]
extern crate bitfield_struct;

pub mod classdriver;
pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod memory;
pub mod setup;
pub mod xhci;

pub use config::ControllerConfig;
pub use error::{Error, ErrorKind};
pub use host::XhciHost;
