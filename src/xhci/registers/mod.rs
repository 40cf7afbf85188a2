//! Types which manage the controller's memory-mapped IO registers

pub mod capability;
pub mod doorbell;
pub mod interrupter;
pub mod operational;
pub mod port;
