//! The [`EventRing`] type

use x86_64::PhysAddr;

use super::registers::interrupter::{
    EventRingDequeuePointer, EventRingSegmentTableSize, InterrupterManagement,
    InterrupterModeration, InterrupterRegisters,
};
use super::ring::{RingCursor, TrbArena};
use super::trb::{cycle_of, event::EventTrb};
use crate::memory::DmaBox;

/// The _Event Ring_ of the primary interrupter, which holds [`EventTrb`]s for software to respond
/// to.
///
/// The ring has a single segment. As the ring is written by the controller, link TRBs can't be used
/// to give the ring its structure. Instead, a table of segments is given to the controller.
#[derive(Debug)]
pub struct EventRing {
    /// The TRBs of the ring's only segment
    segment: TrbArena,
    /// The _Event Ring Segment Table_, holding one [`EventRingSegmentTableEntry`]
    segment_table: DmaBox,
    /// Where the next event will be read, and the cycle state which marks it as valid
    dequeue: RingCursor,
    /// The registers of the interrupter which this ring belongs to
    registers: InterrupterRegisters,
}

impl EventRing {
    /// Allocates an event ring with `len` TRBs, which will be given to the interrupter with the
    /// given registers.
    ///
    /// The controller is not told about the ring until [`initialize`] is called.
    ///
    /// [`initialize`]: EventRing::initialize
    pub fn new(len: u16, registers: InterrupterRegisters) -> Self {
        let segment = TrbArena::new(len.into());
        let mut segment_table = DmaBox::new_zeroed(
            core::mem::size_of::<EventRingSegmentTableEntry>(),
            64,
        );

        // SAFETY: This writes the only entry of the table, which the controller isn't reading yet
        unsafe {
            segment_table
                .as_mut_ptr::<EventRingSegmentTableEntry>()
                .write_volatile(EventRingSegmentTableEntry::new(segment.start_addr(), len));
        }

        Self {
            segment,
            segment_table,
            dequeue: RingCursor::new(len.into()),
            registers,
        }
    }

    /// Gives the ring to the controller. The segment table size and dequeue pointer must be written
    /// before the table's address, as writing the address enables the ring.
    pub fn initialize(&mut self) {
        self.registers.write_event_ring_segment_table_size(
            EventRingSegmentTableSize::new().with_event_ring_segment_table_size(1),
        );
        self.write_dequeue_pointer();
        self.registers
            .write_event_ring_segment_table_base_address(self.segment_table_addr());
    }

    /// Sets the minimum interval between interrupts, in units of 250ns
    pub fn set_interrupt_moderation(&mut self, interval: u16) {
        self.registers.write_interrupter_moderation(
            InterrupterModeration::new().with_interrupt_moderation_interval(interval),
        );
    }

    /// Allows the interrupter to raise interrupts, and clears any interrupt which is already
    /// pending
    pub fn enable_interrupts(&mut self) {
        self.registers.write_interrupter_management(
            InterrupterManagement::new()
                .with_interrupt_enable(true)
                .with_interrupt_pending(true),
        );
    }

    /// Acknowledges an interrupt from this interrupter by clearing its _Interrupt Pending_ flag
    pub fn acknowledge_interrupt(&mut self) -> bool {
        let management = self.registers.read_interrupter_management();
        if management.interrupt_pending() {
            // Writing 1 clears the flag
            self.registers.write_interrupter_management(management);
        }
        management.interrupt_pending()
    }

    /// Whether there is an event waiting to be read
    pub fn has_front(&self) -> bool {
        cycle_of(&self.segment.read(self.dequeue.index())) == self.dequeue.cycle()
    }

    /// Reads the next event from the ring, if one is present, along with the address it was read
    /// from.
    ///
    /// If an event is read, the controller's dequeue pointer is moved past it so the slot can be
    /// reused. If no event is present, nothing is changed.
    pub fn pop(&mut self) -> Option<(EventTrb, PhysAddr)> {
        let index = self.dequeue.index();
        let raw = self.segment.read(index);

        if cycle_of(&raw) != self.dequeue.cycle() {
            return None;
        }

        self.dequeue.advance();
        self.write_dequeue_pointer();

        Some((EventTrb::new(raw), self.segment.addr_of(index)))
    }

    /// Gets the physical address of the start of the ring's segment
    pub fn ring_start_addr(&self) -> PhysAddr {
        self.segment.start_addr()
    }

    /// Gets the length of the ring in TRBs
    pub fn ring_len(&self) -> usize {
        self.segment.len()
    }

    /// Gets the physical address of the segment table for this event ring
    pub fn segment_table_addr(&self) -> PhysAddr {
        self.segment_table.phys_addr()
    }

    /// Gets the address of the next event which will be read
    pub fn dequeue_addr(&self) -> PhysAddr {
        self.segment.addr_of(self.dequeue.index())
    }

    /// Tells the controller where software will read the next event,
    /// and clears the _Event Handler Busy_ flag by writing 1 to it.
    fn write_dequeue_pointer(&mut self) {
        self.registers.write_event_ring_dequeue_pointer(
            EventRingDequeuePointer::new()
                .with_event_ring_dequeue_pointer(self.dequeue_addr())
                .with_event_handler_busy(true),
        );
    }
}

/// An entry in the segment table for an event ring. This indicates the address and length of a
/// segment of an [`EventRing`].
#[repr(C)]
#[derive(Debug)]
struct EventRingSegmentTableEntry {
    /// The base address of the segment. Bits `0..=5` are reserved.
    base_address: u64,
    /// The number of TRBs in the segment
    ring_segment_size: u16,

    #[doc(hidden)]
    _reserved0: u16,
    #[doc(hidden)]
    _reserved1: u32,
}

impl EventRingSegmentTableEntry {
    /// Constructs a new [`EventRingSegmentTableEntry`] pointing to `addr`, with the given
    /// `segment_size` in TRBs.
    fn new(addr: PhysAddr, segment_size: u16) -> Self {
        assert!(addr.is_aligned(64u64));
        assert!(segment_size >= 16);

        Self {
            base_address: addr.as_u64(),
            ring_segment_size: segment_size,
            _reserved0: 0,
            _reserved1: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use x86_64::VirtAddr;

    use super::*;
    use crate::xhci::trb::event::{port_status_change::PortStatusChangeTrb, CompletionCode};

    /// Memory standing in for an interrupter register set
    fn fake_registers() -> (DmaBox, InterrupterRegisters) {
        let memory = DmaBox::new_zeroed(0x20, 0x20);
        let address = VirtAddr::from_ptr(memory.as_ptr::<u8>());

        // SAFETY: the memory is big enough for an interrupter register set and outlives the test
        let registers = unsafe { InterrupterRegisters::new(address) };
        (memory, registers)
    }

    /// Writes an event into the ring's memory as the controller would
    fn produce(ring: &mut EventRing, index: usize, port_id: u8, cycle: bool) {
        let trb = PortStatusChangeTrb {
            port_id,
            completion_code: CompletionCode::Success,
        };

        // SAFETY: the test plays the part of the controller
        unsafe { ring.segment.write(index, trb.to_parts(cycle)) };
    }

    #[test]
    fn initialize_programs_registers() {
        let (_memory, registers) = fake_registers();
        let mut ring = EventRing::new(16, registers);
        ring.initialize();

        let registers = &ring.registers;
        assert_eq!(
            registers
                .read_event_ring_segment_table_size()
                .event_ring_segment_table_size(),
            1
        );
        assert_eq!(
            registers.read_event_ring_segment_table_base_address(),
            ring.segment_table_addr()
        );
        assert_eq!(
            registers
                .read_event_ring_dequeue_pointer()
                .event_ring_dequeue_pointer(),
            ring.ring_start_addr()
        );

        // SAFETY: the table has one entry
        let entry = unsafe { ring.segment_table.as_ptr::<EventRingSegmentTableEntry>().read() };
        assert_eq!(entry.base_address, ring.ring_start_addr().as_u64());
        assert_eq!(entry.ring_segment_size, 16);
    }

    #[test]
    fn empty_ring_pops_nothing() {
        let (_memory, registers) = fake_registers();
        let mut ring = EventRing::new(16, registers);
        ring.initialize();

        let before = u64::from(ring.registers.read_event_ring_dequeue_pointer());
        assert!(!ring.has_front());
        assert!(ring.pop().is_none());
        assert_eq!(u64::from(ring.registers.read_event_ring_dequeue_pointer()), before);
        assert_eq!(ring.dequeue_addr(), ring.ring_start_addr());
    }

    #[test]
    fn pop_advances_and_updates_dequeue_register() {
        let (_memory, registers) = fake_registers();
        let mut ring = EventRing::new(16, registers);
        ring.initialize();

        produce(&mut ring, 0, 3, true);
        assert!(ring.has_front());

        let Some((EventTrb::PortStatusChange(trb), addr)) = ring.pop() else {
            panic!("should pop a port status change event");
        };
        assert_eq!(trb.port_id, 3);
        assert_eq!(addr, ring.ring_start_addr());

        let erdp = ring.registers.read_event_ring_dequeue_pointer();
        assert_eq!(erdp.event_ring_dequeue_pointer(), ring.ring_start_addr() + 16u64);
        assert!(erdp.event_handler_busy());
        assert!(ring.pop().is_none());
    }

    #[test]
    fn wraps_and_flips_expected_cycle() {
        let (_memory, registers) = fake_registers();
        let mut ring = EventRing::new(16, registers);
        ring.initialize();

        for i in 0..16 {
            produce(&mut ring, i, 1, true);
            assert!(ring.pop().is_some());
        }
        assert_eq!(ring.dequeue_addr(), ring.ring_start_addr());

        // Stale events from the last pass are not valid any more
        assert!(ring.pop().is_none());

        produce(&mut ring, 0, 7, false);
        let Some((EventTrb::PortStatusChange(trb), _)) = ring.pop() else {
            panic!("should pop an event written with the toggled cycle");
        };
        assert_eq!(trb.port_id, 7);
    }
}
