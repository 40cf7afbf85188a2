//! The [`Device`] type, which tracks a USB device from the moment it is given a slot until it's
//! removed

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::{debug, trace, warn};
use x86_64::PhysAddr;

use super::contexts::device_context::OwnedDeviceContext;
use super::contexts::endpoint_context::EndpointContext;
use super::contexts::input_context::{InputContext, InputControlContext};
use super::contexts::slot_context::SlotContext;
use super::contexts::ContextSize;
use super::registers::doorbell::DoorbellRegister;
use super::registers::port::port_speed;
use super::ring::TransferRing;
use super::trb::event::transfer::TransferEventTrb;
use super::trb::event::CompletionCode;
use super::trb::transfer::control::{DataStageTrb, SetupStageTrb, StatusStageTrb, TransferType};
use super::trb::transfer::normal::NormalTrb;
use super::trb::transfer::TransferTrb;
use crate::classdriver::{new_class_driver, ClassDriver, TransferSubmitter};
use crate::descriptor::{descriptor_type, Configuration, ConfigurationDescriptor, DeviceDescriptor};
use crate::endpoint::{EndpointConfig, EndpointId, EndpointType};
use crate::error::{Error, ErrorKind};
use crate::memory::DmaBuffer;
use crate::setup::{request, SetupData};

/// The largest number of bytes a single normal or data stage TRB can transfer
const MAX_TRB_TRANSFER_LEN: usize = DmaBuffer::BOUNDARY;

/// The number of times the controller retries a failed transaction before reporting an error
const ENDPOINT_ERROR_COUNT: u8 = 3;

/// How far a [`Device`] has got through being set up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// The device has a slot, but hasn't been given an address
    Enabled,
    /// The device has an address, but no class driver has been bound to it
    Addressed,
    /// The device's descriptors are being read over the default control pipe
    Initializing,
    /// A class driver has been bound, and the device's endpoints are ready to be configured
    Initialized,
    /// A _Configure Endpoint_ command for the device is executing
    ConfiguringEndpoints,
    /// The device's endpoints are configured and its class driver is running
    Configured,
}

/// The data of a transfer which the controller hasn't finished yet
#[derive(Debug)]
enum PendingData {
    /// A transfer on a bulk or interrupt endpoint
    Normal(DmaBuffer),
    /// A control transfer, with its data stage buffer if it has one
    Control {
        /// The request which was sent in the setup stage
        setup: SetupData,
        /// The buffer for the data stage
        buffer: Option<DmaBuffer>,
    },
}

/// A transfer which has been written to a transfer ring but hasn't completed.
///
/// The transfer's buffer is held here until the completion event arrives, so the controller can't
/// access freed memory.
#[derive(Debug)]
struct PendingTransfer {
    /// The endpoint the transfer is on
    ep: EndpointId,
    /// The address of the last TRB of the TD, which generates the transfer's completion event
    last_trb: PhysAddr,
    /// The address of a control transfer's data stage, which generates an event if it is short
    data_stage: Option<PhysAddr>,
    /// The residual length reported by a short data stage
    short_residual: Option<u32>,
    /// The transfer's buffer
    data: PendingData,
}

impl PendingTransfer {
    /// The number of bytes the transfer asked to move
    fn requested_len(&self) -> usize {
        match &self.data {
            PendingData::Normal(buffer) => buffer.len(),
            PendingData::Control { buffer, .. } => buffer.as_ref().map_or(0, DmaBuffer::len),
        }
    }

    /// Takes the buffer out of the transfer
    fn into_buffer(self) -> Option<DmaBuffer> {
        match self.data {
            PendingData::Normal(buffer) => Some(buffer),
            PendingData::Control { buffer, .. } => buffer,
        }
    }
}

/// The transfer rings of a device and the transfers in flight on them.
///
/// This is the [`TransferSubmitter`] given to a device's class driver.
#[derive(Debug)]
pub struct DeviceIo {
    /// The slot ID of the device
    slot_id: u8,
    /// The device's doorbell
    doorbell: DoorbellRegister,
    /// The transfer ring of each endpoint, indexed by _Device Context Index_ minus 1
    rings: [Option<TransferRing>; 31],
    /// Transfers in flight, keyed by the address of the last TRB of their TD
    pending: BTreeMap<u64, PendingTransfer>,
    /// The number of TRBs in each new transfer ring
    ring_len: usize,
}

impl DeviceIo {
    /// Constructs a [`DeviceIo`] with only the default control pipe's ring
    fn new(slot_id: u8, doorbell: DoorbellRegister, ring_len: usize) -> Self {
        let mut rings: [Option<TransferRing>; 31] = core::array::from_fn(|_| None);
        rings[0] = Some(TransferRing::new(ring_len));

        Self {
            slot_id,
            doorbell,
            rings,
            pending: BTreeMap::new(),
            ring_len,
        }
    }

    /// The transfer ring for an endpoint, if it has one
    pub fn ring(&self, ep: EndpointId) -> Option<&TransferRing> {
        self.rings[usize::from(ep.dci()) - 1].as_ref()
    }

    /// Whether any transfers are in flight on an endpoint
    fn has_pending_on(&self, ep: EndpointId) -> bool {
        self.pending.values().any(|p| p.ep == ep)
    }

    /// Allocates a fresh transfer ring for an endpoint, returning its start address.
    /// Any previous ring is dropped, so the endpoint must have no transfers in flight.
    fn allocate_ring(&mut self, ep: EndpointId) -> PhysAddr {
        let ring = TransferRing::new(self.ring_len);
        let addr = ring.ring_start_addr();
        self.rings[usize::from(ep.dci()) - 1] = Some(ring);
        addr
    }

    /// The number of transfers which haven't completed
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Writes a TD to an endpoint's ring and rings the doorbell.
    /// The transfer is recorded as pending against the TD's last TRB, which must have IOC set.
    fn submit(
        &mut self,
        ep: EndpointId,
        trbs: &[TransferTrb],
        data_stage_index: Option<usize>,
        data: PendingData,
    ) -> Result<(), Error> {
        let ring = self.rings[usize::from(ep.dci()) - 1]
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::EndpointNotConfigured))?;

        // A TD must not be split up by a full ring
        if ring.free_space() < trbs.len() {
            return Err(Error::new(ErrorKind::RingFull));
        }

        let mut data_stage = None;
        let mut last_trb = None;
        for (i, trb) in trbs.iter().enumerate() {
            // SAFETY: the TRBs point to buffers held in `data`, which is kept in `pending` until
            // the controller reports the transfer as complete.
            let addr = unsafe { ring.enqueue(*trb) }?;
            trace!("Slot {} {ep:?}: wrote {:?} at {addr:?}", self.slot_id, trb.trb_type());

            if Some(i) == data_stage_index {
                data_stage = Some(addr);
            }
            last_trb = Some(addr);
        }

        let Some(last_trb) = last_trb else {
            return Err(Error::new(ErrorKind::InvalidTrbPointer));
        };

        self.pending.insert(
            last_trb.as_u64(),
            PendingTransfer {
                ep,
                last_trb,
                data_stage,
                short_residual: None,
                data,
            },
        );
        self.doorbell.ring_endpoint(ep);

        Ok(())
    }

    /// Takes the pending transfer which a transfer event finishes.
    ///
    /// A completion event points at the last TRB of a TD. The data stage of a control transfer
    /// generates its own event if it is short or fails. A short data stage has its residual
    /// recorded and returns `Ok(None)`, leaving the transfer pending until its status stage
    /// completes. Any other code ends the transfer at the data stage.
    fn take_pending(
        &mut self,
        ep: EndpointId,
        event: &TransferEventTrb,
    ) -> Result<Option<PendingTransfer>, Error> {
        if let Some(pending) = self.pending.remove(&event.trb_pointer.as_u64()) {
            return Ok(Some(pending));
        }

        let (&key, pending) = self
            .pending
            .iter_mut()
            .find(|(_, p)| p.ep == ep && p.data_stage == Some(event.trb_pointer))
            .ok_or_else(|| Error::new(ErrorKind::NoCorrespondingTransfer))?;

        if event.completion_code == CompletionCode::ShortPacket {
            pending.short_residual = Some(event.residual_length);
            return Ok(None);
        }

        Ok(self.pending.remove(&key))
    }

    /// Frees up the ring space used by a completed transfer
    fn retire(&mut self, pending: &PendingTransfer) -> Result<(), Error> {
        let ring = self.rings[usize::from(pending.ep.dci()) - 1]
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::EndpointNotConfigured))?;
        ring.update_dequeue(pending.last_trb)
    }

    /// Checks that a buffer can be described by a single TRB, and converts its length to the TRB's
    /// field type
    fn transfer_len(buffer: &DmaBuffer) -> Result<u32, Error> {
        if buffer.len() > MAX_TRB_TRANSFER_LEN || !buffer.within_boundary() {
            return Err(Error::new(ErrorKind::TransferTooLarge));
        }

        u32::try_from(buffer.len()).map_err(|_| Error::new(ErrorKind::TransferTooLarge))
    }

    /// Builds and submits the TRBs of a control transfer
    fn control(
        &mut self,
        ep: EndpointId,
        setup: SetupData,
        buffer: Option<DmaBuffer>,
        direction_in: bool,
    ) -> Result<(), Error> {
        let data_stage = match &buffer {
            Some(buffer) if !buffer.is_empty() => Some(DataStageTrb {
                data_buffer: buffer.phys_addr(),
                transfer_length: Self::transfer_len(buffer)?,
                direction_in,
                interrupt_on_short_packet: true,
                interrupt_on_completion: false,
            }),
            _ => None,
        };

        let transfer_type = match (&data_stage, direction_in) {
            (None, _) => TransferType::NoData,
            (Some(_), true) => TransferType::InData,
            (Some(_), false) => TransferType::OutData,
        };

        let setup_trb = TransferTrb::SetupStage(SetupStageTrb {
            setup,
            transfer_type,
        });

        let data = PendingData::Control { setup, buffer };

        match data_stage {
            Some(data_stage) => {
                let status = TransferTrb::StatusStage(StatusStageTrb {
                    direction_in: !direction_in,
                    interrupt_on_completion: true,
                });
                let trbs = [setup_trb, TransferTrb::DataStage(data_stage), status];
                self.submit(ep, &trbs, Some(1), data)
            }
            None => {
                let status = TransferTrb::StatusStage(StatusStageTrb {
                    direction_in: true,
                    interrupt_on_completion: true,
                });
                self.submit(ep, &[setup_trb, status], None, data)
            }
        }
    }

    /// Builds and submits a normal transfer
    fn normal(&mut self, ep: EndpointId, buffer: DmaBuffer) -> Result<(), Error> {
        let trb = TransferTrb::Normal(NormalTrb {
            data_buffer: buffer.phys_addr(),
            transfer_length: Self::transfer_len(&buffer)?,
            interrupt_on_short_packet: true,
            interrupt_on_completion: true,
        });

        self.submit(ep, &[trb], None, PendingData::Normal(buffer))
    }
}

impl TransferSubmitter for DeviceIo {
    fn normal_in(&mut self, ep: EndpointId, buffer: DmaBuffer) -> Result<(), Error> {
        self.normal(ep, buffer)
    }

    fn normal_out(&mut self, ep: EndpointId, buffer: DmaBuffer) -> Result<(), Error> {
        self.normal(ep, buffer)
    }

    fn control_in(
        &mut self,
        ep: EndpointId,
        setup: SetupData,
        buffer: DmaBuffer,
    ) -> Result<(), Error> {
        self.control(ep, setup, Some(buffer), true)
    }

    fn control_out(
        &mut self,
        ep: EndpointId,
        setup: SetupData,
        buffer: Option<DmaBuffer>,
    ) -> Result<(), Error> {
        self.control(ep, setup, buffer, false)
    }
}

/// A USB device which has been assigned a device slot by the controller
#[derive(Debug)]
pub struct Device {
    /// The slot ID assigned by the controller
    slot_id: u8,
    /// The root hub port the device is connected to
    port: u8,
    /// The speed of the port, as reported by the port's status register
    speed: u8,
    /// How far the device has got through being set up
    state: DeviceState,
    /// The output device context which the controller writes to
    context: OwnedDeviceContext,
    /// The input context passed to _Address Device_ and _Configure Endpoint_ commands
    input_context: InputContext,
    /// The device's transfer rings
    io: DeviceIo,
    /// The class driver bound to the device
    class_driver: Option<Box<dyn ClassDriver>>,
    /// The endpoints which the class driver is bound to
    endpoint_configs: Vec<EndpointConfig>,
    /// The device descriptor, once it has been read
    device_descriptor: Option<DeviceDescriptor>,
    /// The size of the buffer used to read the configuration descriptor
    enumeration_buffer_len: u16,
}

impl Device {
    /// Constructs a new device in the [`Enabled`][DeviceState::Enabled] state, with a transfer ring
    /// for its default control pipe
    pub fn new(
        slot_id: u8,
        port: u8,
        speed: u8,
        context_size: ContextSize,
        doorbell: DoorbellRegister,
        ring_len: usize,
        enumeration_buffer_len: u16,
    ) -> Self {
        Self {
            slot_id,
            port,
            speed,
            state: DeviceState::Enabled,
            context: OwnedDeviceContext::new(context_size),
            input_context: InputContext::new(context_size),
            io: DeviceIo::new(slot_id, doorbell, ring_len),
            class_driver: None,
            endpoint_configs: Vec::new(),
            device_descriptor: None,
            enumeration_buffer_len,
        }
    }

    /// The slot ID assigned by the controller
    pub fn slot_id(&self) -> u8 {
        self.slot_id
    }

    /// The root hub port the device is connected to
    pub fn port(&self) -> u8 {
        self.port
    }

    /// The speed of the port the device is connected to
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// How far the device has got through being set up
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The output device context
    pub fn context(&self) -> &OwnedDeviceContext {
        &self.context
    }

    /// The mutable output device context, for tests acting as the controller
    #[cfg(test)]
    pub(crate) fn context_mut(&mut self) -> &mut OwnedDeviceContext {
        &mut self.context
    }

    /// The input context
    pub fn input_context(&self) -> &InputContext {
        &self.input_context
    }

    /// The device's transfer rings
    pub fn io(&self) -> &DeviceIo {
        &self.io
    }

    /// The device descriptor, once it has been read
    pub fn device_descriptor(&self) -> Option<&DeviceDescriptor> {
        self.device_descriptor.as_ref()
    }

    /// Whether a class driver is bound to the device
    pub fn has_class_driver(&self) -> bool {
        self.class_driver.is_some()
    }

    /// The endpoints which the class driver is bound to
    pub fn endpoint_configs(&self) -> &[EndpointConfig] {
        &self.endpoint_configs
    }

    /// Runs `f` on the class driver, if it is a `D`. The driver is given a [`TransferSubmitter`]
    /// for the device.
    pub fn with_class_driver<D: ClassDriver + 'static, R>(
        &mut self,
        f: impl FnOnce(&mut D, &mut dyn TransferSubmitter) -> R,
    ) -> Option<R> {
        let driver = self.class_driver.as_mut()?.as_any_mut().downcast_mut::<D>()?;
        Some(f(driver, &mut self.io))
    }

    /// The max packet size to start the default control pipe with, before the device descriptor has
    /// been read
    fn default_max_packet_size(&self) -> u16 {
        match self.speed {
            port_speed::SUPER_SPEED | port_speed::SUPER_SPEED_PLUS => 512,
            port_speed::HIGH_SPEED => 64,
            _ => 8,
        }
    }

    /// Fills in the input context for an _Address Device_ command, and returns its address
    pub fn prepare_address_input_context(&mut self) -> PhysAddr {
        self.input_context.clear();

        let mut control = InputControlContext::default();
        control.add(0);
        control.add(1);
        self.input_context.set_control(control);

        let slot = SlotContext::default()
            .with_route_string(0)
            .with_root_hub_port_number(self.port)
            .with_context_entries(1)
            .with_speed(self.speed);
        self.input_context.set_slot_context(slot);

        let ep0_ring = self
            .io
            .ring(EndpointId::DEFAULT_CONTROL_PIPE)
            .map(|ring| (ring.ring_start_addr(), ring.cycle_state()));

        if let Some((ring_start, cycle)) = ep0_ring {
            let ep0 = EndpointContext::default()
                .with_endpoint_type(EndpointType::Control.context_type(true))
                .with_max_packet_size(self.default_max_packet_size())
                .with_tr_dequeue_pointer(ring_start)
                .with_dequeue_cycle_state(cycle)
                .with_error_count(ENDPOINT_ERROR_COUNT);
            self.input_context
                .set_endpoint_context(EndpointId::DEFAULT_CONTROL_PIPE.dci(), ep0);
        }

        self.input_context.addr()
    }

    /// Called when the _Address Device_ command completes. Starts reading the device's descriptors.
    pub fn on_addressed(&mut self) -> Result<(), Error> {
        if self.state != DeviceState::Enabled {
            return Err(Error::new(ErrorKind::InvalidPhase));
        }

        debug!("Slot {}: addressed, reading device descriptor", self.slot_id);
        self.state = DeviceState::Initializing;
        self.get_descriptor(descriptor_type::DEVICE, DeviceDescriptor::LENGTH)
    }

    /// Requests a descriptor over the default control pipe
    fn get_descriptor(&mut self, ty: u8, len: u16) -> Result<(), Error> {
        let setup = SetupData::get_descriptor(ty, 0, len);
        self.io.control_in(
            EndpointId::DEFAULT_CONTROL_PIPE,
            setup,
            DmaBuffer::new(len.into()),
        )
    }

    /// Handles a transfer event for this device.
    ///
    /// Returns `true` if the event finished enumerating the device and it is ready to have its
    /// endpoints configured.
    pub fn on_transfer_event(&mut self, event: &TransferEventTrb) -> Result<bool, Error> {
        let ep = EndpointId::from_dci(event.endpoint_id)
            .ok_or_else(|| Error::new(ErrorKind::NoCorrespondingTransfer))?;

        let Some(pending) = self.io.take_pending(ep, event)? else {
            trace!("Slot {}: short data stage on {ep:?}", self.slot_id);
            return Ok(false);
        };
        self.io.retire(&pending)?;

        let residual = pending.short_residual.unwrap_or(event.residual_length);
        let residual = usize::try_from(residual).unwrap_or(usize::MAX);
        let len = pending.requested_len().saturating_sub(residual);

        if !event.completion_code.is_success() {
            let code = event.completion_code;
            warn!("Slot {}: transfer on {ep:?} failed with {code:?}", self.slot_id);

            if self.state == DeviceState::Initializing {
                self.state = DeviceState::Addressed;
                return Err(Error::new(ErrorKind::TransferFailed(code)));
            }

            return match self.class_driver.as_mut() {
                Some(driver) => driver
                    .on_transfer_failed(ep, code, pending.into_buffer())
                    .map(|()| false),
                None => Err(Error::new(ErrorKind::TransferFailed(code))),
            };
        }

        match pending.data {
            PendingData::Control { setup, buffer } => {
                let enumerating = self.state == DeviceState::Initializing;
                if enumerating && ep == EndpointId::DEFAULT_CONTROL_PIPE {
                    return self.on_enumeration_step(setup, buffer, len);
                }

                let driver = self
                    .class_driver
                    .as_mut()
                    .ok_or_else(|| Error::new(ErrorKind::NotImplemented))?;
                driver
                    .on_control_completed(&mut self.io, ep, setup, buffer, len)
                    .map(|()| false)
            }
            PendingData::Normal(buffer) => {
                let driver = self
                    .class_driver
                    .as_mut()
                    .ok_or_else(|| Error::new(ErrorKind::EndpointNotInCharge))?;
                driver
                    .on_normal_completed(&mut self.io, ep, buffer, len)
                    .map(|()| false)
            }
        }
    }

    /// Handles the completion of one of the control transfers used to enumerate the device
    fn on_enumeration_step(
        &mut self,
        setup: SetupData,
        buffer: Option<DmaBuffer>,
        len: usize,
    ) -> Result<bool, Error> {
        let data = buffer
            .as_ref()
            .map_or(&[][..], |b| &b.as_slice()[..len.min(b.len())]);

        // The high byte of wValue is the descriptor type
        let descriptor = (setup.value >> 8) as u8;

        match (setup.request, descriptor) {
            (request::GET_DESCRIPTOR, descriptor_type::DEVICE) => {
                let device_descriptor = DeviceDescriptor::parse(data)?;
                debug!(
                    "Slot {}: device {:04x}:{:04x}, class {:#x}",
                    self.slot_id,
                    device_descriptor.vendor_id,
                    device_descriptor.product_id,
                    device_descriptor.device_class,
                );
                self.device_descriptor = Some(device_descriptor);

                self.get_descriptor(descriptor_type::CONFIGURATION, self.enumeration_buffer_len)?;
                Ok(false)
            }
            (request::GET_DESCRIPTOR, descriptor_type::CONFIGURATION) => {
                let header = ConfigurationDescriptor::parse(data)?;
                let truncated = usize::from(header.total_length) > data.len();
                if truncated && header.total_length > setup.length {
                    debug!(
                        "Slot {}: configuration is {} bytes, reading it again",
                        self.slot_id, header.total_length
                    );
                    self.get_descriptor(descriptor_type::CONFIGURATION, header.total_length)?;
                    return Ok(false);
                }

                let config = Configuration::parse(data)?;
                let Some((driver, endpoint_configs)) = new_class_driver(&config) else {
                    warn!("Slot {}: no class driver for device", self.slot_id);
                    self.state = DeviceState::Addressed;
                    return Ok(false);
                };

                debug!("Slot {}: bound class driver {driver:?}", self.slot_id);
                self.class_driver = Some(driver);
                self.endpoint_configs = endpoint_configs;

                let setup = SetupData::set_configuration(config.descriptor.configuration_value);
                self.io
                    .control_out(EndpointId::DEFAULT_CONTROL_PIPE, setup, None)?;
                Ok(false)
            }
            (request::SET_CONFIGURATION, _) => {
                let driver = self
                    .class_driver
                    .as_mut()
                    .ok_or_else(|| Error::new(ErrorKind::InvalidPhase))?;
                driver.set_endpoint(&self.endpoint_configs)?;

                debug!("Slot {}: configuration {} set", self.slot_id, setup.value);
                self.state = DeviceState::Initialized;
                Ok(true)
            }
            _ => Err(Error::new(ErrorKind::InvalidPhase)),
        }
    }

    /// Fills in the input context for a _Configure Endpoint_ command for the class driver's
    /// endpoints, allocating their transfer rings, and returns its address.
    ///
    /// A configured device can't be configured again, and nor can one with transfers in flight on
    /// the endpoints whose rings would be replaced.
    pub fn prepare_configure_input_context(&mut self) -> Result<PhysAddr, Error> {
        if !matches!(self.state, DeviceState::Addressed | DeviceState::Initialized) {
            return Err(Error::new(ErrorKind::InvalidPhase));
        }

        if self.endpoint_configs.iter().any(|c| self.io.has_pending_on(c.ep_id)) {
            return Err(Error::new(ErrorKind::InvalidPhase));
        }

        let max_dci = self
            .endpoint_configs
            .iter()
            .map(|c| c.ep_id.dci())
            .max()
            .unwrap_or(1)
            .max(1);
        let slot = self.input_context.slot_context().with_context_entries(max_dci);

        self.input_context.clear();
        self.input_context.set_slot_context(slot);

        let mut control = InputControlContext::default();
        control.add(0);

        for config in self.endpoint_configs.clone() {
            let dci = config.ep_id.dci();
            let ring_start = self.io.allocate_ring(config.ep_id);
            control.add(dci);

            let context = EndpointContext::default()
                .with_endpoint_type(config.ep_type.context_type(config.ep_id.is_in()))
                .with_interval(self.endpoint_interval(&config))
                .with_max_packet_size(config.max_packet_size)
                .with_average_trb_length(1)
                .with_tr_dequeue_pointer(ring_start)
                .with_dequeue_cycle_state(true)
                .with_error_count(ENDPOINT_ERROR_COUNT);
            self.input_context.set_endpoint_context(dci, context);
        }

        self.input_context.set_control(control);
        self.state = DeviceState::ConfiguringEndpoints;

        Ok(self.input_context.addr())
    }

    /// Converts an endpoint's `bInterval` into the _Interval_ field of its endpoint context,
    /// which is a period of `2^interval * 125µs`.
    fn endpoint_interval(&self, config: &EndpointConfig) -> u8 {
        if !matches!(config.ep_type, EndpointType::Interrupt | EndpointType::Isochronous)
            || config.interval == 0
        {
            return 0;
        }

        match self.speed {
            // Full and low speed intervals are in 1ms frames
            port_speed::FULL_SPEED | port_speed::LOW_SPEED => {
                7 - config.interval.leading_zeros() as u8 + 3
            }
            _ => config.interval - 1,
        }
    }

    /// Called when a _Configure Endpoint_ command for the device completes successfully
    pub fn on_endpoints_configured(&mut self) -> Result<(), Error> {
        if self.state != DeviceState::ConfiguringEndpoints {
            return Err(Error::new(ErrorKind::InvalidPhase));
        }

        debug!("Slot {}: endpoints configured", self.slot_id);
        self.state = DeviceState::Configured;

        match self.class_driver.as_mut() {
            Some(driver) => driver.on_endpoints_configured(&mut self.io),
            None => Ok(()),
        }
    }

    /// Called when a _Configure Endpoint_ command for the device fails, so it can be retried
    pub fn on_configure_failed(&mut self) {
        if self.state == DeviceState::ConfiguringEndpoints {
            self.state = if self.class_driver.is_some() {
                DeviceState::Initialized
            } else {
                DeviceState::Addressed
            };
        }
    }
}
