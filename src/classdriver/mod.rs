//! Class drivers, which implement the behaviour of a particular kind of USB device on top of the
//! transfers provided by the host controller driver.
//!
//! A class driver is chosen for a device once its configuration descriptor has been read, and is
//! owned by the [`Device`] for as long as the device is connected. It never touches the controller
//! directly: transfers are submitted through a [`TransferSubmitter`], and their buffers come back
//! in a completion callback.
//!
//! [`Device`]: crate::xhci::device::Device

use core::any::Any;
use core::fmt::Debug;

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::descriptor::Configuration;
use crate::endpoint::{EndpointConfig, EndpointId};
use crate::error::{Error, ErrorKind};
use crate::memory::DmaBuffer;
use crate::setup::SetupData;
use crate::xhci::trb::event::CompletionCode;

pub mod cdc;

/// Interface class codes
pub mod class_code {
    /// Communications and CDC Control
    pub const COMMUNICATIONS: u8 = 0x02;
    /// CDC Data
    pub const CDC_DATA: u8 = 0x0a;
}

/// Submits transfers to a device's endpoints on behalf of a [`ClassDriver`].
///
/// Each buffer is moved into the driver's record of the transfer, and given back to the class
/// driver by [`on_normal_completed`], [`on_control_completed`] or [`on_transfer_failed`].
///
/// [`on_normal_completed`]: ClassDriver::on_normal_completed
/// [`on_control_completed`]: ClassDriver::on_control_completed
/// [`on_transfer_failed`]: ClassDriver::on_transfer_failed
pub trait TransferSubmitter {
    /// Reads up to `buffer.len()` bytes from a bulk or interrupt IN endpoint
    fn normal_in(&mut self, ep: EndpointId, buffer: DmaBuffer) -> Result<(), Error>;

    /// Writes the contents of `buffer` to a bulk or interrupt OUT endpoint
    fn normal_out(&mut self, ep: EndpointId, buffer: DmaBuffer) -> Result<(), Error>;

    /// Performs a control transfer whose data stage reads into `buffer`
    fn control_in(&mut self, ep: EndpointId, setup: SetupData, buffer: DmaBuffer)
        -> Result<(), Error>;

    /// Performs a control transfer whose data stage (if any) writes `buffer`
    fn control_out(
        &mut self,
        ep: EndpointId,
        setup: SetupData,
        buffer: Option<DmaBuffer>,
    ) -> Result<(), Error>;
}

/// The interface between the host controller driver and the driver for a class of device
pub trait ClassDriver: Send + Debug {
    /// Binds the driver to the endpoints of the selected configuration.
    /// Endpoints which the driver doesn't use are ignored.
    fn set_endpoint(&mut self, configs: &[EndpointConfig]) -> Result<(), Error>;

    /// Called once the controller has finished configuring the device's endpoints,
    /// so the driver can start its first transfers.
    fn on_endpoints_configured(&mut self, io: &mut dyn TransferSubmitter) -> Result<(), Error>;

    /// Called when a control transfer submitted by this driver completes.
    /// `len` is the number of bytes transferred in the data stage.
    fn on_control_completed(
        &mut self,
        io: &mut dyn TransferSubmitter,
        ep: EndpointId,
        setup: SetupData,
        buffer: Option<DmaBuffer>,
        len: usize,
    ) -> Result<(), Error>;

    /// Called when a normal transfer submitted by this driver completes.
    /// `len` is the number of bytes transferred.
    fn on_normal_completed(
        &mut self,
        io: &mut dyn TransferSubmitter,
        ep: EndpointId,
        buffer: DmaBuffer,
        len: usize,
    ) -> Result<(), Error>;

    /// Called when a transfer completes with an error. The transfer is not retried, and the buffer
    /// is handed back so the driver can reuse or drop it.
    fn on_transfer_failed(
        &mut self,
        ep: EndpointId,
        code: CompletionCode,
        buffer: Option<DmaBuffer>,
    ) -> Result<(), Error> {
        let _ = (ep, buffer);
        Err(Error::new(ErrorKind::TransferFailed(code)))
    }

    /// Gets the driver as [`Any`], so callers that know the concrete driver type can reach it
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Chooses a class driver for a device from its configuration.
///
/// Returns the driver along with the configurations of the endpoints it should be bound to, or
/// [`None`] if no driver supports the device.
pub fn new_class_driver(
    config: &Configuration,
) -> Option<(Box<dyn ClassDriver>, Vec<EndpointConfig>)> {
    let interfaces = &config.interfaces;

    // A CDC function is a communications interface followed by its data interface
    let comm = interfaces
        .iter()
        .position(|i| i.descriptor.interface_class == class_code::COMMUNICATIONS)?;
    let data = interfaces.get(comm + 1)?;
    if data.descriptor.interface_class != class_code::CDC_DATA {
        return None;
    }

    let endpoints = interfaces[comm]
        .endpoints
        .iter()
        .chain(data.endpoints.iter())
        .map(|ep| ep.to_config())
        .collect();

    Some((Box::new(cdc::CdcDriver::new()), endpoints))
}
