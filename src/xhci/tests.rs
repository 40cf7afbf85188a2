//! Tests of the [`Controller`] against a controller whose registers are ordinary memory.
//!
//! The harness plays the part of the hardware: it reads commands and transfers off the rings,
//! changes port status registers, and writes events to the event ring.

use x86_64::{PhysAddr, VirtAddr};

use super::controller::Controller;
use super::device::DeviceState;
use super::port::PortState;
use super::registers::port::port_speed;
use super::trb::event::command_completion::CommandCompletionTrb;
use super::trb::event::port_status_change::PortStatusChangeTrb;
use super::trb::event::transfer::TransferEventTrb;
use super::trb::event::CompletionCode;
use super::trb::{type_of, TrbType};
use crate::classdriver::cdc::CdcDriver;
use crate::config::ControllerConfig;
use crate::descriptor::tests::{CDC_CONFIGURATION, CDC_DEVICE_DESCRIPTOR};
use crate::endpoint::EndpointId;
use crate::error::ErrorKind;
use crate::memory::DmaBox;

const USBCMD: usize = 0x20;
const USBSTS: usize = 0x24;
const CRCR: usize = 0x38;
const DCBAAP: usize = 0x50;
const CONFIG: usize = 0x58;
const IMAN: usize = 0x2020;
const IMOD: usize = 0x2024;
const ERSTSZ: usize = 0x2028;
const ERSTBA: usize = 0x2030;
const ERDP: usize = 0x2038;
const DOORBELLS: usize = 0x3000;

const CCS: u32 = 1;
const PED: u32 = 1 << 1;
const PR: u32 = 1 << 4;
const PP: u32 = 1 << 9;
const CSC: u32 = 1 << 17;
const PRC: u32 = 1 << 21;

fn portsc_offset(port: u8) -> usize {
    0x420 + 0x10 * (usize::from(port) - 1)
}

/// The slot ID field of a command TRB
fn slot_of(parts: &[u32; 4]) -> u8 {
    (parts[3] >> 24) as u8
}

fn pointer_of(parts: &[u32; 4]) -> PhysAddr {
    PhysAddr::new(u64::from(parts[0]) | u64::from(parts[1]) << 32)
}

/// Allocates memory laid out like the MMIO region of a halted controller with 8 slots and `ports`
/// ports
fn fake_mmio(ports: u8) -> DmaBox {
    let mut mmio = DmaBox::new_zeroed(0x4000, 0x1000);
    let values = [
        // CAPLENGTH 0x20, HCIVERSION 1.1.0
        (0x00, 0x0110_0020),
        // 8 slots, 1 interrupter
        (0x04, 8 | 1 << 8 | u32::from(ports) << 24),
        (0x08, 0),
        (0x10, 0),
        (0x14, DOORBELLS as u32),
        (0x18, 0x2000),
        (USBSTS, 1),
        // 4KiB pages
        (0x28, 1),
    ];
    for (offset, value) in values {
        // SAFETY: every offset is inside the allocation
        unsafe { mmio.as_mut_ptr::<u8>().add(offset).cast::<u32>().write_volatile(value) };
    }
    mmio
}

/// A running [`Controller`] along with the state of the fake hardware behind it
struct TestController {
    controller: Controller,
    mmio: DmaBox,
    /// Where the next event will be written
    event_index: usize,
    /// The cycle bit of the next event
    event_cycle: bool,
    /// The index of the next command to be read from the command ring
    command_index: usize,
    /// The index of the next TRB to be read from each slot's default control pipe
    ep0_index: [usize; 9],
}

impl TestController {
    fn config() -> ControllerConfig {
        ControllerConfig {
            reset_poll_limit: 16,
            ..Default::default()
        }
    }

    /// Constructs a controller over fake registers, without initializing it
    fn uninitialized(ports: u8) -> Self {
        let mmio = fake_mmio(ports);
        // SAFETY: `mmio` lives as long as the controller
        let controller =
            unsafe { Controller::new(VirtAddr::from_ptr(mmio.as_ptr::<u8>()), Self::config()) }
                .unwrap();

        Self {
            controller,
            mmio,
            event_index: 0,
            event_cycle: true,
            command_index: 0,
            ep0_index: [0; 9],
        }
    }

    /// Constructs an initialized and running controller
    fn new(ports: u8) -> Self {
        let mut test = Self::uninitialized(ports);
        test.controller.initialize().unwrap();
        // The hardware would clear HCH once R/S is set
        test.write32(USBSTS, 0);
        test.controller.run().unwrap();
        test
    }

    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: tests only use offsets inside the allocation
        unsafe { self.mmio.as_ptr::<u8>().add(offset).cast::<u32>().read_volatile() }
    }

    fn read64(&self, offset: usize) -> u64 {
        u64::from(self.read32(offset)) | u64::from(self.read32(offset + 4)) << 32
    }

    fn write32(&mut self, offset: usize, value: u32) {
        // SAFETY: tests only use offsets inside the allocation
        unsafe { self.mmio.as_mut_ptr::<u8>().add(offset).cast::<u32>().write_volatile(value) };
    }

    fn portsc(&self, port: u8) -> u32 {
        self.read32(portsc_offset(port))
    }

    fn set_portsc(&mut self, port: u8, value: u32) {
        self.write32(portsc_offset(port), value);
    }

    fn doorbell(&self, index: u8) -> u32 {
        self.read32(DOORBELLS + 4 * usize::from(index))
    }

    /// Writes an event to the event ring, at the segment given in the controller's segment table
    fn post(&mut self, make: impl FnOnce(bool) -> [u32; 4]) {
        let erst = self.read64(ERSTBA);
        // SAFETY: ERSTBA points at the event ring's segment table, which is identity mapped
        let (segment, size) = unsafe {
            let entry = erst as *const u64;
            (entry.read_volatile(), entry.add(1).cast::<u16>().read_volatile())
        };

        let parts = make(self.event_cycle);
        let trb = (segment + 16 * self.event_index as u64) as *mut [u32; 4];
        // SAFETY: the index is inside the segment
        unsafe { trb.write_volatile(parts) };

        self.event_index += 1;
        if self.event_index == usize::from(size) {
            self.event_index = 0;
            self.event_cycle = !self.event_cycle;
        }
    }

    fn process(&mut self) -> Result<(), ErrorKind> {
        self.controller.process_event().map_err(|e| e.kind())
    }

    /// Posts a port status change event and processes it
    fn port_event(&mut self, port: u8) -> Result<(), ErrorKind> {
        self.post(|cycle| {
            PortStatusChangeTrb {
                port_id: port,
                completion_code: CompletionCode::Success,
            }
            .to_parts(cycle)
        });
        self.process()
    }

    /// Plugs a device into a port
    fn connect(&mut self, port: u8, speed: u8) -> Result<(), ErrorKind> {
        self.set_portsc(port, CCS | PP | u32::from(speed) << 10 | CSC);
        self.port_event(port)
    }

    /// Unplugs the device from a port
    fn disconnect(&mut self, port: u8) -> Result<(), ErrorKind> {
        self.set_portsc(port, PP | CSC);
        self.port_event(port)
    }

    /// Finishes a port reset
    fn finish_reset(&mut self, port: u8, speed: u8) -> Result<(), ErrorKind> {
        let status = CCS | PED | PP | u32::from(speed) << 10;
        self.set_portsc(port, status | PRC);
        let result = self.port_event(port);
        self.set_portsc(port, status);
        result
    }

    /// Reads the next command from the command ring, checking its type
    fn next_command(&mut self, expected: TrbType) -> (PhysAddr, [u32; 4]) {
        let arena = self.controller.command_ring().arena();
        let parts = arena.read(self.command_index);
        let addr = arena.addr_of(self.command_index);
        assert_eq!(type_of(&parts), expected);

        self.command_index += 1;
        (addr, parts)
    }

    fn complete_command(
        &mut self,
        addr: PhysAddr,
        code: CompletionCode,
        slot_id: u8,
    ) -> Result<(), ErrorKind> {
        self.post(|cycle| {
            CommandCompletionTrb {
                command_trb_pointer: addr,
                parameter: 0,
                completion_code: code,
                slot_id,
            }
            .to_parts(cycle)
        });
        self.process()
    }

    /// Takes a device on `port` from connection to addressed, in slot `slot_id`
    fn address(&mut self, port: u8, speed: u8, slot_id: u8) {
        self.connect(port, speed).unwrap();
        self.finish_reset(port, speed).unwrap();

        let (addr, _) = self.next_command(TrbType::EnableSlotCommand);
        self.complete_command(addr, CompletionCode::Success, slot_id).unwrap();

        let (addr, parts) = self.next_command(TrbType::AddressDeviceCommand);
        assert_eq!(slot_of(&parts), slot_id);
        assert_eq!(self.controller.port_state(port), Some(PortState::Addressing));
        self.complete_command(addr, CompletionCode::Success, slot_id).unwrap();
    }

    /// Acts as the device on a slot's default control pipe, answering the oldest control transfer
    /// with `response`
    fn complete_control(&mut self, slot_id: u8, response: &[u8]) -> Result<(), ErrorKind> {
        self.finish_control(slot_id, response, CompletionCode::Success)
    }

    /// Answers the oldest control transfer on a slot's default control pipe with `response`.
    /// A short data stage is reported first, and then the status stage completes with `status`.
    fn finish_control(
        &mut self,
        slot_id: u8,
        response: &[u8],
        status: CompletionCode,
    ) -> Result<(), ErrorKind> {
        let (short_data_stage, status_stage) = {
            let device = self.controller.device_manager().find_by_slot(slot_id).unwrap();
            let arena = device.io().ring(EndpointId::DEFAULT_CONTROL_PIPE).unwrap().arena();
            let i = self.ep0_index[usize::from(slot_id)];
            assert_eq!(type_of(&arena.read(i)), TrbType::SetupStage);

            let next = arena.read(i + 1);
            if type_of(&next) == TrbType::DataStage {
                let len = (next[2] & 0x1_ffff) as usize;
                let n = response.len().min(len);
                // SAFETY: the data stage points at a buffer of `len` bytes, which is identity
                // mapped
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        response.as_ptr(),
                        pointer_of(&next).as_u64() as *mut u8,
                        n,
                    );
                }
                self.ep0_index[usize::from(slot_id)] += 3;

                let residual = (len - n) as u32;
                let short = (residual != 0).then(|| (arena.addr_of(i + 1), residual));
                (short, arena.addr_of(i + 2))
            } else {
                self.ep0_index[usize::from(slot_id)] += 2;
                (None, arena.addr_of(i + 1))
            }
        };

        if let Some((trb_pointer, residual)) = short_data_stage {
            self.post(|cycle| {
                TransferEventTrb {
                    trb_pointer,
                    residual_length: residual,
                    completion_code: CompletionCode::ShortPacket,
                    endpoint_id: 1,
                    slot_id,
                }
                .to_parts(cycle)
            });
            self.process()?;
        }

        self.post(|cycle| {
            TransferEventTrb {
                trb_pointer: status_stage,
                residual_length: 0,
                completion_code: status,
                endpoint_id: 1,
                slot_id,
            }
            .to_parts(cycle)
        });
        self.process()
    }

    /// Acts as the device on a normal endpoint, completing the transfer at `index` on its ring
    fn complete_normal(
        &mut self,
        slot_id: u8,
        ep: EndpointId,
        index: usize,
        response: &[u8],
    ) -> Result<(), ErrorKind> {
        let (trb_pointer, residual) = {
            let device = self.controller.device_manager().find_by_slot(slot_id).unwrap();
            let arena = device.io().ring(ep).unwrap().arena();
            let parts = arena.read(index);
            assert_eq!(type_of(&parts), TrbType::Normal);

            let len = (parts[2] & 0x1_ffff) as usize;
            let n = response.len().min(len);
            // SAFETY: the TRB points at a buffer of `len` bytes, which is identity mapped
            unsafe {
                core::ptr::copy_nonoverlapping(
                    response.as_ptr(),
                    pointer_of(&parts).as_u64() as *mut u8,
                    n,
                );
            }
            (arena.addr_of(index), (len - n) as u32)
        };

        self.post(|cycle| {
            TransferEventTrb {
                trb_pointer,
                residual_length: residual,
                completion_code: CompletionCode::Success,
                endpoint_id: ep.dci(),
                slot_id,
            }
            .to_parts(cycle)
        });
        self.process()
    }

    fn device_state(&self, slot_id: u8) -> Option<DeviceState> {
        self.controller
            .device_manager()
            .find_by_slot(slot_id)
            .ok()
            .map(|d| d.state())
    }
}

#[test]
fn initialize_programs_registers() {
    let test = TestController::new(2);
    let controller = &test.controller;

    assert_eq!(test.read32(CONFIG) & 0xff, 8);
    assert_eq!(test.read64(DCBAAP), controller.device_manager().dcbaa_addr().as_u64());

    let crcr = test.read64(CRCR);
    assert_eq!(crcr & !0x3f, controller.command_ring().ring_start_addr().as_u64());
    assert_eq!(crcr & 1, 1);

    let event_ring = controller.event_ring();
    assert_eq!(test.read32(ERSTSZ), 1);
    assert_eq!(test.read64(ERSTBA), event_ring.segment_table_addr().as_u64());
    assert_eq!(test.read64(ERDP) & !0xf, event_ring.ring_start_addr().as_u64());
    assert_eq!(test.read32(IMOD) & 0xffff, 4000);

    // Interrupts enabled on the interrupter and the controller, and running
    assert_eq!(test.read32(IMAN) & 0b10, 0b10);
    assert_eq!(test.read32(USBCMD) & 0b101, 0b101);

    // The command doorbell and one for each of the 8 slots
    assert!(controller.doorbell_register_at(8).is_some());
    assert!(controller.doorbell_register_at(9).is_none());
}

#[test]
fn initialize_needs_halted_controller() {
    let mut test = TestController::uninitialized(1);
    test.write32(USBSTS, 0);

    assert_eq!(
        test.controller.initialize().map_err(|e| e.kind()),
        Err(ErrorKind::ControllerNotHalted)
    );
}

#[test]
fn reset_times_out() {
    let mut test = TestController::uninitialized(1);

    // Nothing clears HCRST, so the reset never finishes
    assert_eq!(test.controller.reset().map_err(|e| e.kind()), Err(ErrorKind::Timeout));
    assert_eq!(test.read32(USBCMD) & 0b10, 0b10);
}

#[test]
fn reset_stops_running_controller() {
    let mut test = TestController::uninitialized(1);
    test.write32(USBCMD, 1);
    test.write32(USBSTS, 0);

    // The controller never reports that it has halted
    assert_eq!(test.controller.reset().map_err(|e| e.kind()), Err(ErrorKind::Timeout));
    assert_eq!(test.read32(USBCMD) & 0b11, 0);
}

#[test]
fn empty_event_ring_is_left_alone() {
    let mut test = TestController::new(1);
    let erdp = test.read64(ERDP);

    assert_eq!(test.process(), Ok(()));
    assert_eq!(test.controller.process_events(), 0);
    assert_eq!(test.read64(ERDP), erdp);
}

#[test]
fn popping_an_event_moves_dequeue_pointer() {
    let mut test = TestController::new(1);
    let start = test.controller.event_ring().ring_start_addr().as_u64();

    test.port_event(1).unwrap();
    // The dequeue pointer moves to the next TRB, and EHB is written to clear it
    assert_eq!(test.read64(ERDP), (start + 16) | 1 << 3);
}

#[test]
fn acknowledge_interrupt() {
    let mut test = TestController::new(1);

    test.write32(IMAN, 0b11);
    test.write32(USBSTS, 1 << 3);
    assert!(test.controller.acknowledge_interrupt());

    test.write32(IMAN, 0b10);
    test.write32(USBSTS, 0);
    assert!(!test.controller.acknowledge_interrupt());
}

#[test]
fn connect_resets_port_and_enables_slot() {
    let mut test = TestController::new(1);

    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));
    assert_eq!(test.portsc(1) & PR, PR);

    test.finish_reset(1, port_speed::HIGH_SPEED).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetComplete));
    assert!(test.controller.port_at(1).unwrap().is_enabled());
    test.next_command(TrbType::EnableSlotCommand);
    assert_eq!(test.controller.pending_command_count(), 1);
}

#[test]
fn addressing_device_reads_device_descriptor() {
    let mut test = TestController::new(1);
    test.address(1, port_speed::HIGH_SPEED, 3);

    assert_eq!(test.controller.port_state(1), Some(PortState::Initializing));
    assert_eq!(test.device_state(3), Some(DeviceState::Initializing));

    let device = test.controller.device_manager().find_by_slot(3).unwrap();
    assert_eq!(device.port(), 1);
    assert_eq!(device.speed(), port_speed::HIGH_SPEED);
    assert_eq!(
        test.controller.device_manager().dcbaa().slot_addr(3),
        Some(device.context().addr())
    );

    // GET_DESCRIPTOR on the default control pipe
    assert_eq!(test.doorbell(3), 1);
    assert_eq!(device.io().pending_count(), 1);
}

#[test]
fn address_device_uses_input_context() {
    let mut test = TestController::new(1);
    test.connect(1, port_speed::FULL_SPEED).unwrap();
    test.finish_reset(1, port_speed::FULL_SPEED).unwrap();
    let (addr, _) = test.next_command(TrbType::EnableSlotCommand);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();

    let (_, parts) = test.next_command(TrbType::AddressDeviceCommand);
    let device = test.controller.device_manager().find_by_slot(1).unwrap();
    assert_eq!(pointer_of(&parts), device.input_context().addr());
    assert_eq!(device.state(), DeviceState::Enabled);
    assert_eq!(device.input_context().slot_context().root_hub_port_number(), 1);
}

#[test]
fn cdc_device_is_configured_and_sends_serial() {
    let mut test = TestController::new(1);
    test.address(1, port_speed::FULL_SPEED, 1);

    test.complete_control(1, &CDC_DEVICE_DESCRIPTOR).unwrap();
    test.complete_control(1, &CDC_CONFIGURATION).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::Initializing));

    // SET_CONFIGURATION completes enumeration, and the endpoints are configured straight away
    test.complete_control(1, &[]).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ConfiguringEndpoints));
    assert_eq!(test.device_state(1), Some(DeviceState::ConfiguringEndpoints));

    let (addr, parts) = test.next_command(TrbType::ConfigureEndpointCommand);
    assert_eq!(slot_of(&parts), 1);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::Configured));
    assert_eq!(test.device_state(1), Some(DeviceState::Configured));

    let bulk_in = EndpointId::from_address(0x82);
    let bulk_out = EndpointId::from_address(0x02);
    test.controller
        .device_manager_mut()
        .find_by_slot_mut(1)
        .unwrap()
        .with_class_driver(|cdc: &mut CdcDriver, io| cdc.send_serial(io, b"hi"))
        .unwrap()
        .unwrap();
    assert_eq!(test.doorbell(1), u32::from(bulk_in.dci()));

    test.complete_normal(1, bulk_out, 0, &[]).unwrap();
    test.complete_normal(1, bulk_in, 0, b"ok!").unwrap();

    let received = test
        .controller
        .device_manager_mut()
        .find_by_slot_mut(1)
        .unwrap()
        .with_class_driver(|cdc: &mut CdcDriver, _| {
            let mut buf = [0; 8];
            let n = cdc.receive_serial(&mut buf);
            buf[..n].to_vec()
        })
        .unwrap();
    assert_eq!(received, b"ok!");
}

#[test]
fn configured_device_is_not_configured_again() {
    let mut test = TestController::new(1);
    test.address(1, port_speed::FULL_SPEED, 1);
    test.complete_control(1, &CDC_DEVICE_DESCRIPTOR).unwrap();
    test.complete_control(1, &CDC_CONFIGURATION).unwrap();
    test.complete_control(1, &[]).unwrap();

    let (addr, _) = test.next_command(TrbType::ConfigureEndpointCommand);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();

    let bulk_in = EndpointId::from_address(0x82);
    let ring_start = |test: &TestController| {
        let device = test.controller.device_manager().find_by_slot(1).unwrap();
        device.io().ring(bulk_in).map(|r| r.ring_start_addr())
    };
    let before = ring_start(&test);

    assert_eq!(
        test.controller.configure_endpoints(1).map_err(|e| e.kind()),
        Err(ErrorKind::InvalidPhase)
    );
    assert_eq!(ring_start(&test), before);
    assert_eq!(test.controller.pending_command_count(), 0);
    assert_eq!(test.controller.port_state(1), Some(PortState::Configured));
}

#[test]
fn stalled_status_stage_abandons_enumeration() {
    let mut test = TestController::new(1);
    test.address(1, port_speed::HIGH_SPEED, 1);
    test.complete_control(1, &CDC_DEVICE_DESCRIPTOR).unwrap();

    // The configuration read is short, so its data stage reports first
    assert_eq!(
        test.finish_control(1, &CDC_CONFIGURATION, CompletionCode::StallError),
        Err(ErrorKind::TransferFailed(CompletionCode::StallError))
    );
    assert_eq!(test.controller.port_state(1), Some(PortState::Disconnected));
    assert!(test.controller.device_manager().find_by_slot(1).is_err());

    let (addr, parts) = test.next_command(TrbType::DisableSlotCommand);
    assert_eq!(slot_of(&parts), 1);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();
}

#[test]
fn unknown_device_is_configured_on_request() {
    let mut test = TestController::new(1);
    test.address(1, port_speed::HIGH_SPEED, 2);

    let mut config = CDC_CONFIGURATION;
    config[9 + 5] = 0x03;
    test.complete_control(2, &CDC_DEVICE_DESCRIPTOR).unwrap();
    test.complete_control(2, &config).unwrap();

    assert_eq!(test.device_state(2), Some(DeviceState::Addressed));
    assert_eq!(test.controller.port_state(1), Some(PortState::Initializing));
    assert_eq!(test.controller.pending_command_count(), 0);

    test.controller.configure_endpoints(2).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ConfiguringEndpoints));

    let (addr, parts) = test.next_command(TrbType::ConfigureEndpointCommand);
    let device = test.controller.device_manager().find_by_slot(2).unwrap();
    let input = device.input_context();
    assert_eq!(pointer_of(&parts), input.addr());
    assert_eq!(input.control().add_context_flags, 1);
    assert_eq!(input.slot_context().context_entries(), 1);

    // Not configured until the command completes
    assert_eq!(test.device_state(2), Some(DeviceState::ConfiguringEndpoints));
    test.complete_command(addr, CompletionCode::Success, 2).unwrap();
    assert_eq!(test.device_state(2), Some(DeviceState::Configured));
    assert_eq!(test.controller.port_state(1), Some(PortState::Configured));
}

#[test]
fn failed_configure_endpoint_evicts_device() {
    let mut test = TestController::new(1);
    test.address(1, port_speed::HIGH_SPEED, 1);
    test.complete_control(1, &CDC_DEVICE_DESCRIPTOR).unwrap();
    test.complete_control(1, &CDC_CONFIGURATION).unwrap();
    test.complete_control(1, &[]).unwrap();

    let (addr, _) = test.next_command(TrbType::ConfigureEndpointCommand);
    assert_eq!(
        test.complete_command(addr, CompletionCode::BandwidthError, 1),
        Err(ErrorKind::CommandFailed(CompletionCode::BandwidthError))
    );
    assert_eq!(test.controller.port_state(1), Some(PortState::Disconnected));
    assert!(test.controller.device_manager().find_by_slot(1).is_err());

    let (addr, parts) = test.next_command(TrbType::DisableSlotCommand);
    assert_eq!(slot_of(&parts), 1);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();
}

#[test]
fn enable_slot_failure_disconnects_port() {
    let mut test = TestController::new(1);
    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    test.finish_reset(1, port_speed::HIGH_SPEED).unwrap();

    let (addr, _) = test.next_command(TrbType::EnableSlotCommand);
    assert_eq!(
        test.complete_command(addr, CompletionCode::NoSlotsAvailable, 0),
        Err(ErrorKind::CommandFailed(CompletionCode::NoSlotsAvailable))
    );
    assert_eq!(test.controller.port_state(1), Some(PortState::Disconnected));
    assert_eq!(test.controller.device_manager().iter().count(), 0);

    // The port can be brought up again
    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));
}

#[test]
fn restart_while_addressing() {
    let mut test = TestController::new(1);
    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    test.finish_reset(1, port_speed::HIGH_SPEED).unwrap();
    let (addr, _) = test.next_command(TrbType::EnableSlotCommand);
    test.complete_command(addr, CompletionCode::Success, 4).unwrap();
    let (address_device, _) = test.next_command(TrbType::AddressDeviceCommand);
    assert_eq!(test.controller.port_state(1), Some(PortState::Addressing));

    // The device is unplugged and plugged back in before it's addressed
    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));
    assert_eq!(test.portsc(1) & PR, PR);
    assert!(test.controller.device_manager().find_by_slot(4).is_err());
    assert_eq!(test.controller.device_manager().dcbaa().slot_addr(4), None);

    let (disable_slot, parts) = test.next_command(TrbType::DisableSlotCommand);
    assert_eq!(slot_of(&parts), 4);

    // The old Address Device completion has no device to go to
    assert_eq!(test.complete_command(address_device, CompletionCode::Success, 4), Ok(()));
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));

    assert_eq!(test.complete_command(disable_slot, CompletionCode::Success, 4), Ok(()));
    assert_eq!(test.controller.pending_command_count(), 0);

    // The new connection carries on as normal
    test.finish_reset(1, port_speed::HIGH_SPEED).unwrap();
    let (addr, _) = test.next_command(TrbType::EnableSlotCommand);
    test.complete_command(addr, CompletionCode::Success, 4).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::Addressing));
}

#[test]
fn stale_enable_slot_is_disabled() {
    let mut test = TestController::new(1);
    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    test.finish_reset(1, port_speed::HIGH_SPEED).unwrap();
    let (enable_slot, _) = test.next_command(TrbType::EnableSlotCommand);

    test.disconnect(1).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::Disconnected));

    // The slot arrives after the device has gone, so it's given straight back
    assert_eq!(test.complete_command(enable_slot, CompletionCode::Success, 2), Ok(()));
    assert_eq!(test.controller.device_manager().iter().count(), 0);
    let (disable_slot, parts) = test.next_command(TrbType::DisableSlotCommand);
    assert_eq!(slot_of(&parts), 2);
    assert_eq!(test.complete_command(disable_slot, CompletionCode::Success, 2), Ok(()));
}

#[test]
fn one_port_is_addressed_at_a_time() {
    let mut test = TestController::new(2);

    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    test.connect(2, port_speed::FULL_SPEED).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));
    assert_eq!(test.controller.port_state(2), Some(PortState::WaitingAddressed));
    assert_eq!(test.portsc(2) & PR, 0);

    test.finish_reset(1, port_speed::HIGH_SPEED).unwrap();
    let (addr, _) = test.next_command(TrbType::EnableSlotCommand);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();
    assert_eq!(test.controller.port_state(2), Some(PortState::WaitingAddressed));

    let (addr, _) = test.next_command(TrbType::AddressDeviceCommand);
    test.complete_command(addr, CompletionCode::Success, 1).unwrap();

    // Port 1 has an address, so port 2 can be reset
    assert_eq!(test.controller.port_state(1), Some(PortState::Initializing));
    assert_eq!(test.controller.port_state(2), Some(PortState::ResetRequested));
    assert_eq!(test.portsc(2) & PR, PR);
}

#[test]
fn waiting_port_starts_when_addressing_port_disconnects() {
    let mut test = TestController::new(2);
    test.connect(1, port_speed::HIGH_SPEED).unwrap();
    test.connect(2, port_speed::HIGH_SPEED).unwrap();

    test.disconnect(1).unwrap();
    assert_eq!(test.controller.port_state(1), Some(PortState::Disconnected));
    assert_eq!(test.controller.port_state(2), Some(PortState::ResetRequested));
}

#[test]
fn configure_all_ports_finds_connected_ports() {
    let mut test = TestController::new(3);
    test.set_portsc(1, CCS | PP);
    test.set_portsc(3, CCS | PP);

    test.controller.configure_all_ports();
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));
    assert_eq!(test.controller.port_state(2), Some(PortState::Disconnected));
    assert_eq!(test.controller.port_state(3), Some(PortState::WaitingAddressed));
}

#[test]
fn unknown_command_completion() {
    let mut test = TestController::new(1);
    let addr = test.controller.command_ring().arena().addr_of(5);

    assert_eq!(
        test.complete_command(addr, CompletionCode::Success, 1),
        Err(ErrorKind::NoCorrespondingCommand)
    );
}

#[test]
fn no_op_completes() {
    let mut test = TestController::new(1);
    test.controller.no_op().unwrap();

    let (addr, _) = test.next_command(TrbType::NoOpCommand);
    assert_eq!(test.complete_command(addr, CompletionCode::Success, 0), Ok(()));
    assert_eq!(test.controller.pending_command_count(), 0);
}

#[test]
fn invalid_port_numbers() {
    let mut test = TestController::new(2);

    assert_eq!(test.controller.max_ports(), 2);
    assert!(test.controller.port_at(0).is_err());
    assert!(test.controller.port_at(3).is_err());
    assert_eq!(test.port_event(3), Err(ErrorKind::InvalidPortNumber));
    assert_eq!(test.controller.port_state(0), None);
}

#[test]
fn process_events_drains_ring() {
    let mut test = TestController::new(2);
    test.set_portsc(1, CCS | PP | CSC);
    test.set_portsc(2, CCS | PP | CSC);
    for port in [1, 2, 9] {
        test.post(|cycle| {
            PortStatusChangeTrb {
                port_id: port,
                completion_code: CompletionCode::Success,
            }
            .to_parts(cycle)
        });
    }

    // The event for port 9 fails, but doesn't stop the others
    assert_eq!(test.controller.process_events(), 3);
    assert_eq!(test.controller.port_state(1), Some(PortState::ResetRequested));
    assert_eq!(test.controller.port_state(2), Some(PortState::WaitingAddressed));
    assert!(!test.controller.event_ring().has_front());
}

#[test]
fn host_start_reports_reset_timeout() {
    let mmio = fake_mmio(1);
    let config = TestController::config();

    // SAFETY: `mmio` outlives the host, which is dropped straight away
    let result =
        unsafe { crate::host::XhciHost::start(VirtAddr::from_ptr(mmio.as_ptr::<u8>()), config) };
    assert_eq!(result.map(|_| ()).map_err(|e| e.kind()), Err(ErrorKind::Timeout));
}
