//! The [`EventTrb`] type

use self::{
    command_completion::CommandCompletionTrb, port_status_change::PortStatusChangeTrb,
    transfer::TransferEventTrb,
};
use super::{GenericTrbFlags, TrbType};

pub mod command_completion;
pub mod port_status_change;
pub mod transfer;

/// The result of a command or transfer, reported in event TRBs (xHCI 1.2, table 6-90)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CompletionCode {
    Invalid,
    Success,
    DataBufferError,
    BabbleDetected,
    UsbTransactionError,
    TrbError,
    StallError,
    ResourceError,
    BandwidthError,
    NoSlotsAvailable,
    InvalidStreamType,
    SlotNotEnabled,
    EndpointNotEnabled,
    ShortPacket,
    RingUnderrun,
    RingOverrun,
    VfEventRingFull,
    ParameterError,
    BandwidthOverrun,
    ContextStateError,
    NoPingResponse,
    EventRingFull,
    IncompatibleDevice,
    MissedService,
    CommandRingStopped,
    CommandAborted,
    Stopped,
    StoppedLengthInvalid,
    StoppedShortPacket,
    MaxExitLatencyTooLarge,
    IsochBufferOverrun,
    EventLost,
    UndefinedError,
    InvalidStreamId,
    SecondaryBandwidthError,
    SplitTransactionError,
    VendorDefinedError(u8),
    VendorDefinedInfo(u8),
    Reserved(u8),
}

impl CompletionCode {
    /// Constructs a [`CompletionCode`] from its byte value
    pub const fn from_bits(bits: u8) -> Self {
        use CompletionCode::*;

        match bits {
            0 => Invalid,
            1 => Success,
            2 => DataBufferError,
            3 => BabbleDetected,
            4 => UsbTransactionError,
            5 => TrbError,
            6 => StallError,
            7 => ResourceError,
            8 => BandwidthError,
            9 => NoSlotsAvailable,
            10 => InvalidStreamType,
            11 => SlotNotEnabled,
            12 => EndpointNotEnabled,
            13 => ShortPacket,
            14 => RingUnderrun,
            15 => RingOverrun,
            16 => VfEventRingFull,
            17 => ParameterError,
            18 => BandwidthOverrun,
            19 => ContextStateError,
            20 => NoPingResponse,
            21 => EventRingFull,
            22 => IncompatibleDevice,
            23 => MissedService,
            24 => CommandRingStopped,
            25 => CommandAborted,
            26 => Stopped,
            27 => StoppedLengthInvalid,
            28 => StoppedShortPacket,
            29 => MaxExitLatencyTooLarge,
            31 => IsochBufferOverrun,
            32 => EventLost,
            33 => UndefinedError,
            34 => InvalidStreamId,
            35 => SecondaryBandwidthError,
            36 => SplitTransactionError,
            192..=223 => VendorDefinedError(bits),
            224..=255 => VendorDefinedInfo(bits),
            _ => Reserved(bits),
        }
    }

    /// Converts a [`CompletionCode`] into its byte value
    pub const fn into_bits(self) -> u8 {
        use CompletionCode::*;

        match self {
            Invalid => 0,
            Success => 1,
            DataBufferError => 2,
            BabbleDetected => 3,
            UsbTransactionError => 4,
            TrbError => 5,
            StallError => 6,
            ResourceError => 7,
            BandwidthError => 8,
            NoSlotsAvailable => 9,
            InvalidStreamType => 10,
            SlotNotEnabled => 11,
            EndpointNotEnabled => 12,
            ShortPacket => 13,
            RingUnderrun => 14,
            RingOverrun => 15,
            VfEventRingFull => 16,
            ParameterError => 17,
            BandwidthOverrun => 18,
            ContextStateError => 19,
            NoPingResponse => 20,
            EventRingFull => 21,
            IncompatibleDevice => 22,
            MissedService => 23,
            CommandRingStopped => 24,
            CommandAborted => 25,
            Stopped => 26,
            StoppedLengthInvalid => 27,
            StoppedShortPacket => 28,
            MaxExitLatencyTooLarge => 29,
            IsochBufferOverrun => 31,
            EventLost => 32,
            UndefinedError => 33,
            InvalidStreamId => 34,
            SecondaryBandwidthError => 35,
            SplitTransactionError => 36,
            VendorDefinedError(bits) | VendorDefinedInfo(bits) | Reserved(bits) => bits,
        }
    }

    /// Whether the command or transfer succeeded. A short packet counts as success,
    /// since it just means the device had less data than the buffer could hold.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::ShortPacket)
    }
}

/// An event sent from the controller to software on an [`EventRing`]
///
/// [`EventRing`]: crate::xhci::event_ring::EventRing
#[derive(Debug, Clone, Copy)]
pub enum EventTrb {
    /// A transfer completed or failed
    Transfer(TransferEventTrb),
    /// A command completed or failed
    CommandCompletion(CommandCompletionTrb),
    /// One of the change bits of a port's status register was set
    PortStatusChange(PortStatusChangeTrb),
    /// The controller hit an error which isn't tied to a command or transfer
    HostController(CompletionCode),
    /// Any other event, which the driver doesn't act on
    Other(TrbType),
}

impl EventTrb {
    /// Decodes an event from the raw data read from the event ring
    pub fn new(data: [u32; 4]) -> Self {
        let generic_flags = GenericTrbFlags::from(data[3]);

        match generic_flags.trb_type() {
            TrbType::TransferEvent => Self::Transfer(TransferEventTrb::new(data)),
            TrbType::CommandCompletionEvent => {
                Self::CommandCompletion(CommandCompletionTrb::new(data))
            }
            TrbType::PortStatusChangeEvent => {
                Self::PortStatusChange(PortStatusChangeTrb::new(data))
            }
            TrbType::HostControllerEvent => {
                Self::HostController(completion_code_of(&data))
            }
            t => Self::Other(t),
        }
    }
}

/// Reads the completion code from the status dword of an event TRB
#[allow(clippy::cast_possible_truncation)]
fn completion_code_of(data: &[u32; 4]) -> CompletionCode {
    CompletionCode::from_bits((data[2] >> 24) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_codes_round_trip() {
        for bits in 0..=255 {
            assert_eq!(CompletionCode::from_bits(bits).into_bits(), bits);
        }
    }

    #[test]
    fn short_packet_is_success() {
        assert!(CompletionCode::Success.is_success());
        assert!(CompletionCode::ShortPacket.is_success());
        assert!(!CompletionCode::StallError.is_success());
    }

    #[test]
    fn unhandled_event_types_are_not_rejected() {
        let flags = GenericTrbFlags::new().with_trb_type(TrbType::MfindexWrapEvent);

        assert!(matches!(
            EventTrb::new([0, 0, 0, flags.into()]),
            EventTrb::Other(TrbType::MfindexWrapEvent)
        ));
    }
}
