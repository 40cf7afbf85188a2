//! The [`Controller`] type, which owns an xHCI controller's rings and devices and responds to its
//! events

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error, trace, warn};
use x86_64::{PhysAddr, VirtAddr};

use super::dcbaa::DeviceContextBaseAddressArray;
use super::device::{Device, DeviceState};
use super::devmgr::{DeviceManager, MAX_SLOTS};
use super::event_ring::EventRing;
use super::port::{Port, PortState};
use super::registers::capability::CapabilityRegisters;
use super::registers::doorbell::{DoorbellArray, DoorbellRegister};
use super::registers::interrupter::RuntimeRegisters;
use super::registers::operational::{CommandRingControl, OperationalRegisters, UsbStatus};
use super::ring::CommandRing;
use super::scratchpad::ScratchpadBufferArray;
use super::trb::command::address_device::AddressDeviceTrb;
use super::trb::command::configure_endpoint::ConfigureEndpointTrb;
use super::trb::command::slot::{DisableSlotTrb, EnableSlotTrb};
use super::trb::command::CommandTrb;
use super::trb::event::command_completion::CommandCompletionTrb;
use super::trb::event::port_status_change::PortStatusChangeTrb;
use super::trb::event::transfer::TransferEventTrb;
use super::trb::event::EventTrb;
use crate::config::ControllerConfig;
use crate::error::{Error, ErrorKind};

/// What a command on the command ring was issued for, so its completion event can be acted on
#[derive(Debug)]
enum PendingCommand {
    /// An _Enable Slot_ command for a port which has just been reset
    EnableSlot {
        /// The port being brought up
        port: u8,
        /// The port's restart count when the command was issued
        generation: u32,
    },
    /// An _Address Device_ command
    AddressDevice {
        /// The slot being addressed
        slot_id: u8,
    },
    /// A _Configure Endpoint_ command
    ConfigureEndpoint {
        /// The slot being configured
        slot_id: u8,
    },
    /// A _Disable Slot_ command
    DisableSlot {
        /// The slot being disabled
        slot_id: u8,
        /// The device which was evicted from the slot. The controller may still access its contexts
        /// and rings until the slot is disabled, so it is dropped when the command completes.
        device: Option<Box<Device>>,
    },
    /// A _No Op_ command
    NoOp,
}

/// An xHCI controller.
///
/// This owns the command ring, the primary event ring and the [`DeviceManager`], and drives the
/// bring-up of each root hub port from connection to a configured device.
#[derive(Debug)]
pub struct Controller {
    /// The settings the controller was constructed with
    config: ControllerConfig,
    /// The capability registers
    capability_registers: CapabilityRegisters,
    /// The operational registers
    operational_registers: OperationalRegisters,
    /// The doorbell registers
    doorbells: DoorbellArray,
    /// The command ring
    command_ring: CommandRing,
    /// The event ring of the primary interrupter
    event_ring: EventRing,
    /// The devices in each slot
    devmgr: DeviceManager,
    /// The state of each port, indexed by port number minus 1
    port_states: Vec<PortState>,
    /// The number of times each port has been restarted, indexed by port number minus 1
    port_generations: Vec<u32>,
    /// The port which is being reset and addressed, if there is one
    addressing_port: Option<u8>,
    /// Commands which haven't completed, keyed by the address of their TRB
    pending_commands: BTreeMap<u64, PendingCommand>,
    /// Evicted devices which couldn't be disabled, and so have to be kept alive
    orphaned_devices: Vec<Box<Device>>,
}

// SAFETY: the controller owns its MMIO registers and DMA memory, and nothing else refers to them
unsafe impl Send for Controller {}

impl Controller {
    /// Locates the registers of the controller at `mmio_base` and allocates its rings and device
    /// manager. The controller is not touched apart from reading its capability registers.
    ///
    /// # Safety
    /// * `mmio_base` must be the mapped MMIO region of an xHCI controller, which stays mapped for
    ///   the lifetime of the returned value
    /// * Only one [`Controller`] may exist for each xHCI controller
    pub unsafe fn new(mmio_base: VirtAddr, config: ControllerConfig) -> Result<Self, Error> {
        config.validate()?;

        // SAFETY: the caller guarantees `mmio_base` is the controller's MMIO region
        let capability_registers = unsafe { CapabilityRegisters::new(mmio_base) };

        let (major, minor, patch) =
            CapabilityRegisters::parse_version(capability_registers.version());
        let structural_parameters_1 = capability_registers.structural_parameters_1();
        let max_ports = structural_parameters_1.max_ports();
        let max_device_slots = structural_parameters_1.max_device_slots();

        debug!("xHCI {major}.{minor}.{patch} at {mmio_base:?}");
        debug!("{max_ports} ports, {max_device_slots} slots");
        debug!(
            "Operational registers offset: {:#x}",
            capability_registers.capability_register_length()
        );
        debug!(
            "Runtime registers offset: {:#x}",
            capability_registers.runtime_register_space_offset()
        );
        debug!(
            "Doorbell registers offset: {:#x}",
            capability_registers.doorbell_offset()
        );

        // SAFETY: the operational registers are always at this offset from the MMIO base
        let operational_registers = unsafe {
            let ptr = mmio_base + u64::from(capability_registers.capability_register_length());
            OperationalRegisters::new(ptr, max_ports)
        };

        // SAFETY: the runtime registers are always at this offset from the MMIO base
        let runtime_registers = unsafe {
            let ptr = mmio_base + capability_registers.runtime_register_space_offset();
            RuntimeRegisters::new(ptr, structural_parameters_1.max_interrupters())
        };

        // SAFETY: the doorbell array is always at this offset from the MMIO base
        let doorbells = unsafe {
            let ptr = mmio_base + capability_registers.doorbell_offset();
            DoorbellArray::new(ptr, max_device_slots)
        };

        // SAFETY: this is the only `InterrupterRegisters` for the primary interrupter
        let primary_interrupter = unsafe { runtime_registers.interrupter(0) }
            .ok_or_else(|| Error::new(ErrorKind::InvalidConfig))?;

        let event_ring_len = u16::try_from(config.event_ring_len)
            .map_err(|_| Error::new(ErrorKind::InvalidConfig))?;

        let scratchpad_len = capability_registers
            .structural_parameters_2()
            .max_scratchpad_buffers();
        let scratchpad = (scratchpad_len > 0).then(|| {
            let page_size = operational_registers.read_page_size();
            debug!("Allocating {scratchpad_len} scratchpad buffers of {page_size:#x} bytes");
            ScratchpadBufferArray::new(scratchpad_len.into(), page_size)
        });

        let devmgr = DeviceManager::new(
            DeviceContextBaseAddressArray::new(MAX_SLOTS, scratchpad),
            capability_registers.capability_parameters_1().context_size(),
            config.transfer_ring_len,
            config.enumeration_buffer_len,
        );

        Ok(Self {
            config,
            capability_registers,
            operational_registers,
            doorbells,
            command_ring: CommandRing::new(config.command_ring_len),
            event_ring: EventRing::new(event_ring_len, primary_interrupter),
            devmgr,
            port_states: vec![PortState::Disconnected; max_ports.into()],
            port_generations: vec![0; max_ports.into()],
            addressing_port: None,
            pending_commands: BTreeMap::new(),
            orphaned_devices: Vec::new(),
        })
    }

    /// Polls `done` until it returns `true`, up to the configured poll limit
    fn poll_until(&self, mut done: impl FnMut(&Self) -> bool) -> Result<(), Error> {
        for _ in 0..self.config.reset_poll_limit {
            if done(self) {
                return Ok(());
            }
            core::hint::spin_loop();
        }

        Err(Error::new(ErrorKind::Timeout))
    }

    /// Stops the controller if it's running, then performs a _Host Controller Reset_ and waits for
    /// it to complete.
    ///
    /// This forgets about every device, so must only be called before [`initialize`].
    ///
    /// [`initialize`]: Controller::initialize
    pub fn reset(&mut self) -> Result<(), Error> {
        let usb_command = self.operational_registers.read_usb_command();
        if usb_command.run_stop() {
            debug!("Stopping controller");
            self.operational_registers
                .write_usb_command(usb_command.with_run_stop(false));
        }

        self.poll_until(|c| c.operational_registers.read_usb_status().host_controller_halted())?;

        debug!("Sending Host Controller Reset");
        let usb_command = self.operational_registers.read_usb_command();
        self.operational_registers
            .write_usb_command(usb_command.with_host_controller_reset(true));

        self.poll_until(|c| {
            !c.operational_registers.read_usb_command().host_controller_reset()
                && !c.operational_registers.read_usb_status().controller_not_ready()
        })
    }

    /// Gives the controller the DCBAA, the command ring and the primary event ring, and enables
    /// device slots. The controller must be halted, and is left halted.
    pub fn initialize(&mut self) -> Result<(), Error> {
        if !self.operational_registers.read_usb_status().host_controller_halted() {
            return Err(Error::new(ErrorKind::ControllerNotHalted));
        }

        let slots = self
            .capability_registers
            .structural_parameters_1()
            .max_device_slots()
            .min(MAX_SLOTS);
        let configure = self.operational_registers.read_configure();
        self.operational_registers
            .write_configure(configure.with_max_device_slots_enabled(slots));
        debug!("Enabled {slots} device slots");

        self.operational_registers
            .write_device_context_base_address_array_pointer(self.devmgr.dcbaa_addr());

        self.operational_registers.write_command_ring_control(
            CommandRingControl::new()
                .with_command_ring_pointer(self.command_ring.ring_start_addr())
                .with_ring_cycle_state(self.command_ring.cycle_state()),
        );

        self.event_ring
            .set_interrupt_moderation(self.config.interrupt_moderation_interval);
        self.event_ring.initialize();

        Ok(())
    }

    /// Starts the controller and enables interrupts from the primary interrupter
    pub fn run(&mut self) -> Result<(), Error> {
        let usb_command = self.operational_registers.read_usb_command();
        self.operational_registers.write_usb_command(
            usb_command
                .with_run_stop(true)
                .with_interrupter_enable(true),
        );

        self.event_ring.enable_interrupts();

        self.poll_until(|c| !c.operational_registers.read_usb_status().host_controller_halted())?;
        debug!("Controller running");

        Ok(())
    }

    /// Clears the controller's _Event Interrupt_ flag and the primary interrupter's _Interrupt
    /// Pending_ flag. Returns whether an interrupt was pending.
    pub fn acknowledge_interrupt(&mut self) -> bool {
        let status = self.operational_registers.read_usb_status();
        if status.event_interrupt() {
            self.operational_registers
                .write_usb_status(UsbStatus::new().with_event_interrupt(true));
        }

        self.event_ring.acknowledge_interrupt() || status.event_interrupt()
    }

    /// The number of root hub ports
    pub fn max_ports(&self) -> u8 {
        self.operational_registers.max_ports()
    }

    /// Gets the port with the given number, starting at 1
    pub fn port_at(&self, port_num: u8) -> Result<Port, Error> {
        self.operational_registers
            .port(port_num)
            .map(|registers| Port::new(port_num, registers))
            .ok_or_else(|| Error::new(ErrorKind::InvalidPortNumber))
    }

    /// Gets doorbell register `index`. Doorbell 0 is the command doorbell, and doorbell `n` belongs
    /// to slot `n`.
    pub fn doorbell_register_at(&self, index: u8) -> Option<DoorbellRegister> {
        self.doorbells.get(index)
    }

    /// The state of the given port, or [`None`] if there is no such port
    pub fn port_state(&self, port_num: u8) -> Option<PortState> {
        self.port_states.get(usize::from(port_num).checked_sub(1)?).copied()
    }

    /// Sets the state of a port
    fn set_port_state(&mut self, port_num: u8, state: PortState) {
        if let Some(s) = usize::from(port_num)
            .checked_sub(1)
            .and_then(|i| self.port_states.get_mut(i))
        {
            debug!("Port {port_num}: {s:?} -> {state:?}");
            *s = state;
        }
    }

    /// The restart count of a port
    fn port_generation(&self, port_num: u8) -> u32 {
        usize::from(port_num)
            .checked_sub(1)
            .and_then(|i| self.port_generations.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// The devices in each slot
    pub fn device_manager(&self) -> &DeviceManager {
        &self.devmgr
    }

    /// The devices in each slot, mutably
    pub fn device_manager_mut(&mut self) -> &mut DeviceManager {
        &mut self.devmgr
    }

    /// The command ring
    pub fn command_ring(&self) -> &CommandRing {
        &self.command_ring
    }

    /// The primary event ring
    pub fn event_ring(&self) -> &EventRing {
        &self.event_ring
    }

    /// The number of commands which haven't completed
    pub fn pending_command_count(&self) -> usize {
        self.pending_commands.len()
    }

    /// Writes a command to the command ring, records what it's for, and rings the command doorbell
    fn issue_command(
        &mut self,
        trb: CommandTrb,
        pending: PendingCommand,
    ) -> Result<PhysAddr, Error> {
        // SAFETY: any structures the command points to are owned by the devices in `devmgr`,
        // or by the `pending` record, until the command completes.
        let addr = unsafe { self.command_ring.enqueue(trb) }?;
        trace!("Issued {:?} at {addr:?}", trb.trb_type());

        self.pending_commands.insert(addr.as_u64(), pending);
        self.doorbell_register_at(0)
            .ok_or_else(|| Error::new(ErrorKind::InvalidConfig))?
            .ring_command();

        Ok(addr)
    }

    /// Issues a _No Op_ command, which the controller completes without doing anything
    pub fn no_op(&mut self) -> Result<(), Error> {
        self.issue_command(CommandTrb::NoOp, PendingCommand::NoOp)
            .map(|_| ())
    }

    /// Starts bringing up every connected port which isn't already being handled.
    /// Errors are logged, and don't stop the other ports from being configured.
    pub fn configure_all_ports(&mut self) {
        for port_num in 1..=self.max_ports() {
            let connected = self.port_at(port_num).is_ok_and(|p| p.is_connected());
            if connected && self.port_state(port_num) == Some(PortState::Disconnected) {
                if let Err(e) = self.on_port_connected(port_num) {
                    let kind = e.kind();
                    error!("{}:{}: configuring port {port_num}: {kind:?}", e.file(), e.line());
                }
            }
        }
    }

    /// Handles a change in the status of a port, as reported by a _Port Status Change_ event
    pub fn configure_port(&mut self, port_num: u8) -> Result<(), Error> {
        let mut port = self.port_at(port_num)?;
        let status = port.status();
        let state = self.port_state(port_num).unwrap_or_default();

        if status.connect_status_change() {
            if !status.current_connect_status() {
                port.clear_changes();
                debug!("Port {port_num}: device detached");
                self.evict_port(port_num)?;
                return self.start_waiting_port();
            }

            if state != PortState::Disconnected {
                debug!("Port {port_num}: reconnected while {state:?}, restarting");
                self.evict_port(port_num)?;
            }

            return self.on_port_connected(port_num);
        }

        if status.port_reset_change() {
            port.clear_changes();

            if state != PortState::ResetRequested {
                warn!("Port {port_num}: unexpected reset change while {state:?}");
                return Ok(());
            }

            self.set_port_state(port_num, PortState::ResetComplete);
            let generation = self.port_generation(port_num);
            let issued = self.issue_command(
                CommandTrb::EnableSlot(EnableSlotTrb { slot_type: 0 }),
                PendingCommand::EnableSlot {
                    port: port_num,
                    generation,
                },
            );
            if let Err(e) = issued {
                self.abandon_port(port_num)?;
                return Err(e);
            }
            return Ok(());
        }

        let status = port.clear_changes();
        trace!("Port {port_num}: ignoring status change {:#x}", u32::from(status));
        Ok(())
    }

    /// Starts resetting a newly connected port, or queues it if another port is being addressed
    fn on_port_connected(&mut self, port_num: u8) -> Result<(), Error> {
        let mut port = self.port_at(port_num)?;

        match self.addressing_port {
            Some(other) if other != port_num => {
                port.clear_changes();
                debug!("Port {port_num}: waiting for port {other} to be addressed");
                self.set_port_state(port_num, PortState::WaitingAddressed);
            }
            _ => {
                self.addressing_port = Some(port_num);
                self.set_port_state(port_num, PortState::ResetRequested);
                port.reset();
            }
        }

        Ok(())
    }

    /// Starts resetting the first port which is waiting to be addressed, if no other port is being
    /// addressed
    fn start_waiting_port(&mut self) -> Result<(), Error> {
        if self.addressing_port.is_some() {
            return Ok(());
        }

        let waiting = (1..=self.max_ports())
            .find(|&p| self.port_state(p) == Some(PortState::WaitingAddressed));
        match waiting {
            Some(port_num) => self.on_port_connected(port_num),
            None => Ok(()),
        }
    }

    /// Releases the addressing lock if `port_num` holds it, and starts the next waiting port
    fn release_addressing(&mut self, port_num: u8) -> Result<(), Error> {
        if self.addressing_port == Some(port_num) {
            self.addressing_port = None;
        }
        self.start_waiting_port()
    }

    /// Evicts a port's device after an error, and moves on to the next waiting port
    fn abandon_port(&mut self, port_num: u8) -> Result<(), Error> {
        self.evict_port(port_num)?;
        self.start_waiting_port()
    }

    /// Removes the device on a port, if any, and issues a _Disable Slot_ command which keeps it
    /// alive until the controller is finished with it. The port goes back to
    /// [`Disconnected`][PortState::Disconnected].
    fn evict_port(&mut self, port_num: u8) -> Result<(), Error> {
        if let Some(i) = usize::from(port_num).checked_sub(1) {
            if let Some(generation) = self.port_generations.get_mut(i) {
                *generation = generation.wrapping_add(1);
            }
        }
        if self.addressing_port == Some(port_num) {
            self.addressing_port = None;
        }
        self.set_port_state(port_num, PortState::Disconnected);

        let Some(slot_id) = self.devmgr.find_by_port(port_num).map(Device::slot_id) else {
            return Ok(());
        };
        let device = self.devmgr.remove(slot_id)?;
        debug!("Port {port_num}: evicting slot {slot_id}");

        self.disable_slot(slot_id, Some(device))
    }

    /// Issues a _Disable Slot_ command, holding on to the slot's device until it completes
    fn disable_slot(&mut self, slot_id: u8, device: Option<Box<Device>>) -> Result<(), Error> {
        let trb = CommandTrb::DisableSlot(DisableSlotTrb { slot_id });
        // SAFETY: the record isn't dropped until the command completes
        let issued = unsafe { self.command_ring.enqueue(trb) };

        match issued {
            Ok(addr) => {
                self.pending_commands
                    .insert(addr.as_u64(), PendingCommand::DisableSlot { slot_id, device });
                self.doorbell_register_at(0)
                    .ok_or_else(|| Error::new(ErrorKind::InvalidConfig))?
                    .ring_command();
                Ok(())
            }
            Err(e) => {
                // The slot stays enabled, so its memory can't be freed
                self.orphaned_devices.extend(device);
                Err(e)
            }
        }
    }

    /// Processes at most one event from the primary event ring.
    /// Returns `Ok(())` straight away if the ring is empty.
    pub fn process_event(&mut self) -> Result<(), Error> {
        let Some((event, addr)) = self.event_ring.pop() else {
            return Ok(());
        };
        trace!("Event at {addr:?}: {event:?}");

        match event {
            EventTrb::PortStatusChange(trb) => self.on_port_status_change(trb),
            EventTrb::CommandCompletion(trb) => self.on_command_completion(trb),
            EventTrb::Transfer(trb) => self.on_transfer_event(trb),
            EventTrb::HostController(code) => {
                error!("Host controller error: {code:?}");
                Ok(())
            }
            EventTrb::Other(trb_type) => {
                warn!("Unhandled event {trb_type:?}");
                Ok(())
            }
        }
    }

    /// Processes events until the event ring is empty, logging any errors.
    /// Returns the number of events processed.
    pub fn process_events(&mut self) -> usize {
        let mut count = 0;
        // At most one lap of the ring per call
        while count < self.event_ring.ring_len() && self.event_ring.has_front() {
            if let Err(e) = self.process_event() {
                error!("{}:{}: {:?}", e.file(), e.line(), e.kind());
            }
            count += 1;
        }
        count
    }

    /// Handles a _Port Status Change_ event
    fn on_port_status_change(&mut self, trb: PortStatusChangeTrb) -> Result<(), Error> {
        if !trb.completion_code.is_success() {
            warn!("Port {}: status change with {:?}", trb.port_id, trb.completion_code);
        }

        self.configure_port(trb.port_id)
    }

    /// Handles a _Command Completion_ event
    fn on_command_completion(&mut self, trb: CommandCompletionTrb) -> Result<(), Error> {
        let pending = self
            .pending_commands
            .remove(&trb.command_trb_pointer.as_u64())
            .ok_or_else(|| Error::new(ErrorKind::NoCorrespondingCommand))?;
        self.command_ring.update_dequeue(trb.command_trb_pointer)?;

        let code = trb.completion_code;
        trace!("{pending:?} completed with {code:?}");

        match pending {
            PendingCommand::EnableSlot { port, generation } => {
                self.on_slot_enabled(port, generation, trb)
            }
            PendingCommand::AddressDevice { slot_id } => {
                let Ok(device) = self.devmgr.find_by_slot_mut(slot_id) else {
                    warn!("Address Device completed for evicted slot {slot_id}");
                    return Ok(());
                };
                let port = device.port();

                if !code.is_success() {
                    self.abandon_port(port)?;
                    return Err(Error::new(ErrorKind::CommandFailed(code)));
                }

                if let Err(e) = device.on_addressed() {
                    self.abandon_port(port)?;
                    return Err(e);
                }

                self.set_port_state(port, PortState::Initializing);
                self.release_addressing(port)
            }
            PendingCommand::ConfigureEndpoint { slot_id } => {
                let Ok(device) = self.devmgr.find_by_slot_mut(slot_id) else {
                    warn!("Configure Endpoint completed for evicted slot {slot_id}");
                    return Ok(());
                };
                let port = device.port();

                if !code.is_success() {
                    device.on_configure_failed();
                    self.abandon_port(port)?;
                    return Err(Error::new(ErrorKind::CommandFailed(code)));
                }

                let result = device.on_endpoints_configured();
                if device.state() == DeviceState::Configured {
                    self.set_port_state(port, PortState::Configured);
                }
                result
            }
            PendingCommand::DisableSlot { slot_id, device } => {
                if !code.is_success() {
                    warn!("Disabling slot {slot_id} failed with {code:?}");
                }
                debug!("Slot {slot_id} disabled");
                drop(device);
                Ok(())
            }
            PendingCommand::NoOp => {
                debug!("No Op completed with {code:?}");
                Ok(())
            }
        }
    }

    /// Handles the completion of an _Enable Slot_ command by allocating a device and addressing it
    fn on_slot_enabled(
        &mut self,
        port_num: u8,
        generation: u32,
        trb: CommandCompletionTrb,
    ) -> Result<(), Error> {
        let code = trb.completion_code;
        let slot_id = trb.slot_id;
        let current = generation == self.port_generation(port_num)
            && self.port_state(port_num) == Some(PortState::ResetComplete);

        if !code.is_success() {
            if current {
                self.abandon_port(port_num)?;
            }
            return Err(Error::new(ErrorKind::CommandFailed(code)));
        }

        if !current {
            warn!("Port {port_num}: slot {slot_id} enabled after the port restarted, disabling it");
            return self.disable_slot(slot_id, None);
        }

        let speed = self.port_at(port_num)?.speed();
        let Some(doorbell) = self.doorbell_register_at(slot_id) else {
            self.abandon_port(port_num)?;
            return Err(Error::new(ErrorKind::InvalidSlotId));
        };

        let input_context = match self.devmgr.allocate_device(slot_id, port_num, speed, doorbell) {
            Ok(device) => device.prepare_address_input_context(),
            Err(e) => {
                self.abandon_port(port_num)?;
                // An occupied slot belongs to another device
                if e.kind() != ErrorKind::SlotAlreadyInUse {
                    self.disable_slot(slot_id, None)?;
                }
                return Err(e);
            }
        };
        self.set_port_state(port_num, PortState::Enabled);

        let issued = self.issue_command(
            CommandTrb::AddressDevice(AddressDeviceTrb {
                input_context_pointer: input_context,
                slot_id,
                block_set_address_request: false,
            }),
            PendingCommand::AddressDevice { slot_id },
        );
        if let Err(e) = issued {
            self.abandon_port(port_num)?;
            return Err(e);
        }

        self.set_port_state(port_num, PortState::Addressing);
        Ok(())
    }

    /// Handles a _Transfer Event_ by passing it to the device it belongs to
    fn on_transfer_event(&mut self, trb: TransferEventTrb) -> Result<(), Error> {
        let Ok(device) = self.devmgr.find_by_slot_mut(trb.slot_id) else {
            warn!("Transfer event for evicted slot {}", trb.slot_id);
            return Ok(());
        };
        let port = device.port();
        let was_initializing = device.state() == DeviceState::Initializing;

        match device.on_transfer_event(&trb) {
            Ok(true) => self.configure_endpoints(trb.slot_id),
            Ok(false) => Ok(()),
            Err(e) if was_initializing => {
                self.abandon_port(port)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Issues a _Configure Endpoint_ command for the endpoints which the device's class driver is
    /// bound to. The device becomes [`Configured`][DeviceState::Configured] when the command
    /// completes.
    pub fn configure_endpoints(&mut self, slot_id: u8) -> Result<(), Error> {
        let device = self.devmgr.find_by_slot_mut(slot_id)?;
        let port = device.port();
        let input_context = device.prepare_configure_input_context()?;
        debug!(
            "Slot {slot_id}: configuring {} endpoints",
            device.endpoint_configs().len()
        );

        let issued = self.issue_command(
            CommandTrb::ConfigureEndpoint(ConfigureEndpointTrb {
                input_context_pointer: input_context,
                slot_id,
                deconfigure: false,
            }),
            PendingCommand::ConfigureEndpoint { slot_id },
        );
        if let Err(e) = issued {
            if let Ok(device) = self.devmgr.find_by_slot_mut(slot_id) {
                device.on_configure_failed();
            }
            return Err(e);
        }

        self.set_port_state(port, PortState::ConfiguringEndpoints);
        Ok(())
    }
}
