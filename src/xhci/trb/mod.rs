//! _Transfer Request Blocks_ (TRBs), the 16 byte structures which make up the controller's rings.
//!
//! Every TRB type has a `to_parts` method which encodes it as the four dwords written to a ring,
//! with the cycle bit set to the ring's cycle state.

pub mod command;
pub mod event;
pub mod link;
pub mod transfer;

/// The size of a TRB in bytes
pub const TRB_SIZE: u64 = 16;

/// A type of TRB (xHCI 1.2, table 6-91)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrbType {
    /// A normal transfer on a bulk or interrupt endpoint
    Normal,
    /// The setup stage of a control transfer
    SetupStage,
    /// The data stage of a control transfer
    DataStage,
    /// The status stage of a control transfer
    StatusStage,
    /// An isochronous transfer
    Isoch,
    /// A pointer to the next segment of a ring
    Link,
    /// Event data
    EventData,
    /// A transfer which does nothing
    NoOp,
    /// Allocates a device slot
    EnableSlotCommand,
    /// Releases a device slot
    DisableSlotCommand,
    /// Assigns a USB address to a device
    AddressDeviceCommand,
    /// Adds, drops or reconfigures endpoints of a device
    ConfigureEndpointCommand,
    /// Updates fields of a device's contexts
    EvaluateContextCommand,
    /// Recovers a halted endpoint
    ResetEndpointCommand,
    /// Stops an endpoint
    StopEndpointCommand,
    /// Moves an endpoint's dequeue pointer
    SetTrDequeuePointerCommand,
    /// Resets a device
    ResetDeviceCommand,
    /// Used by virtualisation
    ForceEventCommand,
    /// Requests bandwidth negotiation
    NegotiateBandwidthCommand,
    /// Sets the latency tolerance value
    SetLatencyToleranceValueCommand,
    /// Gets the bandwidth available on a port
    GetPortBandwidthCommand,
    /// Sends a link management packet
    ForceHeaderCommand,
    /// A command which does nothing
    NoOpCommand,
    /// Reads an extended property
    GetExtendedPropertyCommand,
    /// Writes an extended property
    SetExtendedPropertyCommand,
    /// A transfer completed
    TransferEvent,
    /// A command completed
    CommandCompletionEvent,
    /// A port's status changed
    PortStatusChangeEvent,
    /// A device requested bandwidth
    BandwidthRequestEvent,
    /// Used by virtualisation
    DoorbellEvent,
    /// The controller had an error
    HostControllerEvent,
    /// A device sent a notification
    DeviceNotificationEvent,
    /// The microframe index wrapped
    MfindexWrapEvent,
    /// A reserved type
    Reserved(u8),
    /// A vendor defined type
    VendorDefined(u8),
}

impl TrbType {
    /// Constructs a [`TrbType`] from its bit representation
    pub const fn from_bits(bits: u8) -> Self {
        use TrbType::*;

        match bits {
            1 => Normal,
            2 => SetupStage,
            3 => DataStage,
            4 => StatusStage,
            5 => Isoch,
            6 => Link,
            7 => EventData,
            8 => NoOp,
            9 => EnableSlotCommand,
            10 => DisableSlotCommand,
            11 => AddressDeviceCommand,
            12 => ConfigureEndpointCommand,
            13 => EvaluateContextCommand,
            14 => ResetEndpointCommand,
            15 => StopEndpointCommand,
            16 => SetTrDequeuePointerCommand,
            17 => ResetDeviceCommand,
            18 => ForceEventCommand,
            19 => NegotiateBandwidthCommand,
            20 => SetLatencyToleranceValueCommand,
            21 => GetPortBandwidthCommand,
            22 => ForceHeaderCommand,
            23 => NoOpCommand,
            24 => GetExtendedPropertyCommand,
            25 => SetExtendedPropertyCommand,
            32 => TransferEvent,
            33 => CommandCompletionEvent,
            34 => PortStatusChangeEvent,
            35 => BandwidthRequestEvent,
            36 => DoorbellEvent,
            37 => HostControllerEvent,
            38 => DeviceNotificationEvent,
            39 => MfindexWrapEvent,
            48..=63 => VendorDefined(bits),
            _ => Reserved(bits),
        }
    }

    /// Converts a [`TrbType`] into its bit representation
    pub const fn into_bits(self) -> u8 {
        use TrbType::*;

        match self {
            Normal => 1,
            SetupStage => 2,
            DataStage => 3,
            StatusStage => 4,
            Isoch => 5,
            Link => 6,
            EventData => 7,
            NoOp => 8,
            EnableSlotCommand => 9,
            DisableSlotCommand => 10,
            AddressDeviceCommand => 11,
            ConfigureEndpointCommand => 12,
            EvaluateContextCommand => 13,
            ResetEndpointCommand => 14,
            StopEndpointCommand => 15,
            SetTrDequeuePointerCommand => 16,
            ResetDeviceCommand => 17,
            ForceEventCommand => 18,
            NegotiateBandwidthCommand => 19,
            SetLatencyToleranceValueCommand => 20,
            GetPortBandwidthCommand => 21,
            ForceHeaderCommand => 22,
            NoOpCommand => 23,
            GetExtendedPropertyCommand => 24,
            SetExtendedPropertyCommand => 25,
            TransferEvent => 32,
            CommandCompletionEvent => 33,
            PortStatusChangeEvent => 34,
            BandwidthRequestEvent => 35,
            DoorbellEvent => 36,
            HostControllerEvent => 37,
            DeviceNotificationEvent => 38,
            MfindexWrapEvent => 39,
            Reserved(bits) | VendorDefined(bits) => bits,
        }
    }
}

/// The fields of the last dword which are common to every TRB
#[bitfield(u32)]
pub struct GenericTrbFlags {
    /// The cycle bit, which marks which pass around the ring the TRB was written on
    pub cycle: bool,
    #[bits(9)]
    __: u16,
    /// The type of the TRB
    #[bits(6)]
    pub trb_type: TrbType,
    #[bits(16)]
    __: u16,
}

/// Reads the cycle bit of an encoded TRB
pub fn cycle_of(parts: &[u32; 4]) -> bool {
    GenericTrbFlags::from(parts[3]).cycle()
}

/// Reads the type of an encoded TRB
pub fn type_of(parts: &[u32; 4]) -> TrbType {
    GenericTrbFlags::from(parts[3]).trb_type()
}

/// Splits a 64 bit pointer into the low and high dwords of a TRB
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn split_pointer(pointer: u64) -> (u32, u32) {
    (pointer as u32, (pointer >> 32) as u32)
}

/// Joins the low and high dwords of a TRB into a 64 bit pointer
pub(crate) const fn join_pointer(low: u32, high: u32) -> u64 {
    (high as u64) << 32 | low as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trb_type_round_trips() {
        for bits in 0..64 {
            assert_eq!(TrbType::from_bits(bits).into_bits(), bits);
        }
    }

    #[test]
    fn generic_flags_positions() {
        let flags = GenericTrbFlags::new()
            .with_cycle(true)
            .with_trb_type(TrbType::EnableSlotCommand);

        assert_eq!(u32::from(flags), 9 << 10 | 1);
        assert_eq!(type_of(&[0, 0, 0, u32::from(flags)]), TrbType::EnableSlotCommand);
        assert!(cycle_of(&[0, 0, 0, u32::from(flags)]));
    }
}
