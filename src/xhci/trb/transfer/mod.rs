//! The [`TransferTrb`] type

use self::{
    control::{DataStageTrb, SetupStageTrb, StatusStageTrb},
    normal::NormalTrb,
};
use super::TrbType;

pub mod control;
pub mod normal;

/// The status dword shared by normal and data stage TRBs
#[bitfield(u32)]
pub struct TransferTrbStatus {
    /// The number of bytes to transfer, up to 64K
    #[bits(17)]
    pub transfer_length: u32,
    /// An estimate of the number of packets left in the TD after this TRB
    #[bits(5)]
    pub td_size: u8,
    /// The interrupter to send completion events to
    #[bits(10)]
    pub interrupter_target: u16,
}

/// A TRB on a transfer ring, which moves data to or from an endpoint
#[derive(Debug, Clone, Copy)]
pub enum TransferTrb {
    /// A transfer on a bulk or interrupt endpoint
    Normal(NormalTrb),
    /// The setup stage of a control transfer
    SetupStage(SetupStageTrb),
    /// The data stage of a control transfer
    DataStage(DataStageTrb),
    /// The status stage of a control transfer
    StatusStage(StatusStageTrb),
}

impl TransferTrb {
    /// Gets the type of the TRB
    pub fn trb_type(&self) -> TrbType {
        match self {
            TransferTrb::Normal(_) => TrbType::Normal,
            TransferTrb::SetupStage(_) => TrbType::SetupStage,
            TransferTrb::DataStage(_) => TrbType::DataStage,
            TransferTrb::StatusStage(_) => TrbType::StatusStage,
        }
    }

    /// Converts the TRB to the data written to a TRB ring
    pub fn to_parts(&self, cycle: bool) -> [u32; 4] {
        let parts = match self {
            TransferTrb::Normal(normal) => normal.to_parts(cycle),
            TransferTrb::SetupStage(setup) => setup.to_parts(cycle),
            TransferTrb::DataStage(data) => data.to_parts(cycle),
            TransferTrb::StatusStage(status) => status.to_parts(cycle),
        };

        debug_assert_eq!(super::type_of(&parts), self.trb_type());

        parts
    }
}
