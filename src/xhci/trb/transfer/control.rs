//! The TRBs which make up a control transfer: [`SetupStageTrb`], [`DataStageTrb`] and
//! [`StatusStageTrb`]

use x86_64::PhysAddr;

use super::TransferTrbStatus;
use crate::setup::SetupData;
use crate::xhci::trb::{split_pointer, TrbType};

/// The _Transfer Type_ field of a [`SetupStageTrb`], which says whether there is a data stage and
/// which way it goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// There is no data stage
    NoData,
    /// Reserved
    Reserved,
    /// The data stage sends data to the device
    OutData,
    /// The data stage reads data from the device
    InData,
}

impl TransferType {
    /// Constructs a [`TransferType`] from its bit representation
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::NoData,
            2 => Self::OutData,
            3 => Self::InData,
            _ => Self::Reserved,
        }
    }

    /// Converts a [`TransferType`] into its bit representation
    const fn into_bits(self) -> u8 {
        match self {
            Self::NoData => 0,
            Self::Reserved => 1,
            Self::OutData => 2,
            Self::InData => 3,
        }
    }
}

/// The flags dword of a [`SetupStageTrb`]
#[bitfield(u32)]
pub struct SetupStageTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    #[bits(4)]
    __: u8,
    /// Whether to raise an event when this TRB completes
    pub interrupt_on_completion: bool,
    /// Whether the setup data is stored in the TRB. Always set for setup stage TRBs.
    #[bits(default = true)]
    pub immediate_data: bool,
    #[bits(3)]
    __: u8,
    /// The TRB type
    #[bits(6, default = TrbType::SetupStage)]
    pub trb_type: TrbType,
    /// Whether there is a data stage and which way it goes
    #[bits(2)]
    pub transfer_type: TransferType,
    #[bits(14)]
    __: u16,
}

/// The first TRB of a control transfer, which holds the 8 byte setup packet
#[derive(Debug, Clone, Copy)]
pub struct SetupStageTrb {
    /// The request sent to the device
    pub setup: SetupData,
    /// Whether there is a data stage and which way it goes
    pub transfer_type: TransferType,
}

impl SetupStageTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let setup = &self.setup;
        let dword0 = u32::from(setup.request_type)
            | u32::from(setup.request) << 8
            | u32::from(setup.value) << 16;
        let dword1 = u32::from(setup.index) | u32::from(setup.length) << 16;
        let status = TransferTrbStatus::new().with_transfer_length(8);
        let flags = SetupStageTrbFlags::new()
            .with_cycle(cycle)
            .with_transfer_type(self.transfer_type);

        [dword0, dword1, status.into(), flags.into()]
    }
}

/// The flags dword of a [`DataStageTrb`]
#[bitfield(u32)]
pub struct DataStageTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    /// Whether the controller should fetch the next TRB before finishing this one
    pub evaluate_next_trb: bool,
    /// Whether to raise an event if the device sends less data than requested
    pub interrupt_on_short_packet: bool,
    /// Whether the controller may skip cache snooping for the buffer
    pub no_snoop: bool,
    /// Whether the next TRB is part of the same TD
    pub chain: bool,
    /// Whether to raise an event when this TRB completes
    pub interrupt_on_completion: bool,
    /// Whether the data is stored in the TRB's pointer field
    pub immediate_data: bool,
    #[bits(3)]
    __: u8,
    /// The TRB type
    #[bits(6, default = TrbType::DataStage)]
    pub trb_type: TrbType,
    /// Whether data flows from the device to the host
    pub direction_in: bool,
    #[bits(15)]
    __: u16,
}

/// The data stage of a control transfer
#[derive(Debug, Clone, Copy)]
pub struct DataStageTrb {
    /// The address of the data buffer
    pub data_buffer: PhysAddr,
    /// The length of the data buffer
    pub transfer_length: u32,
    /// Whether data flows from the device to the host
    pub direction_in: bool,
    /// Whether to raise an event if the device sends less data than requested
    pub interrupt_on_short_packet: bool,
    /// Whether to raise an event when this TRB completes
    pub interrupt_on_completion: bool,
}

impl DataStageTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let (low, high) = split_pointer(self.data_buffer.as_u64());
        let status = TransferTrbStatus::new().with_transfer_length(self.transfer_length);
        let flags = DataStageTrbFlags::new()
            .with_cycle(cycle)
            .with_direction_in(self.direction_in)
            .with_interrupt_on_short_packet(self.interrupt_on_short_packet)
            .with_interrupt_on_completion(self.interrupt_on_completion);

        [low, high, status.into(), flags.into()]
    }
}

/// The flags dword of a [`StatusStageTrb`]
#[bitfield(u32)]
pub struct StatusStageTrbFlags {
    /// The cycle bit
    pub cycle: bool,
    /// Whether the controller should fetch the next TRB before finishing this one
    pub evaluate_next_trb: bool,
    #[bits(2)]
    __: u8,
    /// Whether the next TRB is part of the same TD
    pub chain: bool,
    /// Whether to raise an event when this TRB completes
    pub interrupt_on_completion: bool,
    #[bits(4)]
    __: u8,
    /// The TRB type
    #[bits(6, default = TrbType::StatusStage)]
    pub trb_type: TrbType,
    /// Whether the status handshake flows from the device to the host
    pub direction_in: bool,
    #[bits(15)]
    __: u16,
}

/// The status stage of a control transfer, where the receiver of the data acknowledges it
#[derive(Debug, Clone, Copy)]
pub struct StatusStageTrb {
    /// Whether the handshake flows from the device to the host.
    /// This is the opposite direction to the data stage, or IN if there is no data stage.
    pub direction_in: bool,
    /// Whether to raise an event when this TRB completes
    pub interrupt_on_completion: bool,
}

impl StatusStageTrb {
    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let flags = StatusStageTrbFlags::new()
            .with_cycle(cycle)
            .with_direction_in(self.direction_in)
            .with_interrupt_on_completion(self.interrupt_on_completion);

        [0, 0, 0, flags.into()]
    }
}
