//! The [`Error`] type returned by fallible driver operations

use core::fmt::{self, Display};
use core::panic::Location;

use crate::xhci::trb::event::CompletionCode;

/// What went wrong in an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation is not supported by this driver
    NotImplemented,
    /// A slot ID was outside the range of slots managed by the driver
    InvalidSlotId,
    /// A device was allocated in a slot which already holds a device
    SlotAlreadyInUse,
    /// No device is present in the given slot
    NoSuchDevice,
    /// A class driver was notified about an endpoint which it was not bound to
    EndpointNotInCharge,
    /// A transfer completed with an unsuccessful [`CompletionCode`]
    TransferFailed(CompletionCode),
    /// A command completed with an unsuccessful [`CompletionCode`]
    CommandFailed(CompletionCode),
    /// A TRB ring had no free space to write a TRB
    RingFull,
    /// A transfer buffer was longer than a single TRB can describe
    TransferTooLarge,
    /// A port number was 0 or above the number of ports on the controller
    InvalidPortNumber,
    /// An event arrived which does not make sense for the current state of a port or device
    InvalidPhase,
    /// A command completion event did not point to a command which the driver issued
    NoCorrespondingCommand,
    /// A transfer event did not point to a transfer which the driver issued
    NoCorrespondingTransfer,
    /// A TRB pointer did not point into the ring it was meant to belong to
    InvalidTrbPointer,
    /// A transfer was submitted to an endpoint which has not been configured
    EndpointNotConfigured,
    /// A descriptor read from a device was malformed
    InvalidDescriptor,
    /// A [`ControllerConfig`] value was outside the limits allowed by the hardware
    ///
    /// [`ControllerConfig`]: crate::ControllerConfig
    InvalidConfig,
    /// The controller was running when an operation required it to be halted
    ControllerNotHalted,
    /// The controller did not respond in time
    Timeout,
}

/// An error raised by the driver, along with the source location where it was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    /// What went wrong
    kind: ErrorKind,
    /// Where the error was raised
    location: &'static Location<'static>,
}

impl Error {
    /// Constructs a new [`Error`], recording the caller's location
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    /// What went wrong
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The source file where the error was raised
    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    /// The source line where the error was raised
    pub fn line(&self) -> u32 {
        self.location.line()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}:{}", self.kind, self.file(), self.line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_caller_location() {
        let line = line!() + 1;
        let error = Error::new(ErrorKind::RingFull);

        assert_eq!(error.kind(), ErrorKind::RingFull);
        assert_eq!(error.line(), line);
        assert!(error.file().ends_with("error.rs"));
    }

    #[test]
    fn display_includes_kind_and_location() {
        let error = Error::new(ErrorKind::NoSuchDevice);
        let text = alloc::format!("{error}");

        assert!(text.starts_with("NoSuchDevice at "));
        assert!(text.contains("error.rs:"));
    }
}
