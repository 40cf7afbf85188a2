//! The TRB rings which software writes and the controller reads: the [`CommandRing`] and
//! [`TransferRing`]s.
//!
//! The [`RingCursor`] and [`TrbArena`] types are shared with the [`EventRing`], which is read by
//! software.
//!
//! [`EventRing`]: super::event_ring::EventRing

use x86_64::PhysAddr;

use super::trb::{
    command::CommandTrb, cycle_of, link::LinkTrb, transfer::TransferTrb, TRB_SIZE,
};
use crate::error::{Error, ErrorKind};
use crate::memory::DmaBox;

/// A position in a ring of TRBs, along with the cycle state for that position.
///
/// The cursor wraps back to index 0 after `wrap_at` entries, toggling the cycle state as it does.
/// This is the one place where ring wraparound happens, for both producers and consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    /// The index of the current entry
    index: usize,
    /// The cycle state for the current pass around the ring
    cycle: bool,
    /// The number of entries before the cursor wraps
    wrap_at: usize,
}

impl RingCursor {
    /// Constructs a cursor at the start of a ring with `wrap_at` entries, with the cycle state set
    /// to `true`
    pub const fn new(wrap_at: usize) -> Self {
        assert!(wrap_at > 0);

        Self {
            index: 0,
            cycle: true,
            wrap_at,
        }
    }

    /// The index of the current entry
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The cycle state for the current pass around the ring
    pub const fn cycle(&self) -> bool {
        self.cycle
    }

    /// Moves to the next entry. Returns `true` if the cursor wrapped back to the start and toggled
    /// its cycle state.
    pub fn advance(&mut self) -> bool {
        self.index += 1;

        if self.index == self.wrap_at {
            self.index = 0;
            self.cycle = !self.cycle;
            true
        } else {
            false
        }
    }
}

/// A fixed-size, zero-initialised array of TRBs in memory which is shared with the controller
#[derive(Debug)]
pub struct TrbArena {
    /// The memory holding the TRBs
    memory: DmaBox,
    /// The number of TRBs
    len: usize,
}

impl TrbArena {
    /// Allocates space for `len` TRBs.
    ///
    /// The memory is aligned to its own size (rounded up to a power of 2), so that it can't cross a
    /// 64KiB boundary.
    pub fn new(len: usize) -> Self {
        let size = len * TRB_SIZE as usize;
        let align = size.next_power_of_two().max(64);

        Self {
            memory: DmaBox::new_zeroed(size, align),
            len,
        }
    }

    /// The number of TRBs
    pub fn len(&self) -> usize {
        self.len
    }

    /// The address of the first TRB
    pub fn start_addr(&self) -> PhysAddr {
        self.memory.phys_addr()
    }

    /// The address of the TRB at index `i`
    pub fn addr_of(&self, i: usize) -> PhysAddr {
        assert!(i < self.len);
        self.start_addr() + i as u64 * TRB_SIZE
    }

    /// The index of the TRB at `addr`, or [`None`] if `addr` does not point to a TRB in this arena
    pub fn index_of(&self, addr: PhysAddr) -> Option<usize> {
        let offset = addr.as_u64().checked_sub(self.start_addr().as_u64())?;
        if offset % TRB_SIZE != 0 {
            return None;
        }

        let index = usize::try_from(offset / TRB_SIZE).ok()?;
        (index < self.len).then_some(index)
    }

    /// Performs a volatile read of the TRB at index `i`
    pub fn read(&self, i: usize) -> [u32; 4] {
        assert!(i < self.len);

        // SAFETY: `i` is in bounds of the allocation, which is aligned to 64 bytes
        unsafe { self.memory.as_ptr::<[u32; 4]>().add(i).read_volatile() }
    }

    /// Performs a volatile write of the TRB at index `i`
    ///
    /// # Safety
    /// * The TRB at `i` must be owned by software, not the controller
    /// * The caller is responsible for the behaviour of the controller in response to this TRB
    pub unsafe fn write(&mut self, i: usize, value: [u32; 4]) {
        assert!(i < self.len);

        // SAFETY: `i` is in bounds of the allocation.
        // The caller guarantees the TRB is owned by software.
        unsafe { self.memory.as_mut_ptr::<[u32; 4]>().add(i).write_volatile(value) }
    }
}

/// A ring which is written by software and read by the controller.
/// The last TRB is reserved for a [`LinkTrb`] back to the start of the ring.
///
/// This type implements the [`CommandRing`] and [`TransferRing`] types.
#[derive(Debug)]
pub struct TrbRing {
    /// The TRBs of the ring
    arena: TrbArena,
    /// Where the next TRB will be written, and the cycle state to write it with
    enqueue: RingCursor,
    /// The index of the oldest TRB which the controller has not reported as processed
    dequeue: usize,
    /// The number of TRBs which have been written but not reported as processed
    outstanding: usize,
}

impl TrbRing {
    /// Allocates a new ring with `len` TRBs, including the link TRB
    pub fn new(len: usize) -> Self {
        assert!(len >= 2, "A TRB ring needs space for at least one TRB and the link TRB");

        Self {
            arena: TrbArena::new(len),
            enqueue: RingCursor::new(len - 1),
            dequeue: 0,
            outstanding: 0,
        }
    }

    /// The address of the first TRB of the ring, which is where the controller starts reading
    pub fn ring_start_addr(&self) -> PhysAddr {
        self.arena.start_addr()
    }

    /// The cycle state which new TRBs are written with
    pub fn cycle_state(&self) -> bool {
        self.enqueue.cycle()
    }

    /// The number of TRBs which can be in the ring at once
    pub fn capacity(&self) -> usize {
        self.arena.len() - 1
    }

    /// The number of TRBs which can be written before the ring is full
    pub fn free_space(&self) -> usize {
        self.capacity() - self.outstanding
    }

    /// Reads back the TRB at `addr`, or returns [`None`] if `addr` isn't in the ring
    pub fn read(&self, addr: PhysAddr) -> Option<[u32; 4]> {
        self.arena.index_of(addr).map(|i| self.arena.read(i))
    }

    /// The TRBs of the ring
    pub fn arena(&self) -> &TrbArena {
        &self.arena
    }

    /// Writes a TRB to the ring with the ring's cycle bit, and returns its address.
    /// If the TRB fills the last usable slot, the link TRB is written and the cycle state toggles.
    ///
    /// This does not ring any doorbell.
    ///
    /// # Safety
    /// * The caller is responsible for the behaviour of the controller in response to this TRB
    pub unsafe fn enqueue(
        &mut self,
        trb: impl FnOnce(bool) -> [u32; 4],
    ) -> Result<PhysAddr, Error> {
        if self.free_space() == 0 {
            return Err(Error::new(ErrorKind::RingFull));
        }

        let index = self.enqueue.index();
        let cycle = self.enqueue.cycle();
        let parts = trb(cycle);
        assert_eq!(cycle_of(&parts), cycle);

        // SAFETY: The ring has free space, so the TRB at the enqueue index is owned by software.
        // The caller is responsible for the behaviour of the controller.
        unsafe {
            self.arena.write(index, parts);
        }

        self.outstanding += 1;

        if self.enqueue.advance() {
            // The chain bit is at the same position in every TRB type which has one
            let chain = parts[3] & (1 << 4) != 0;
            let link = LinkTrb::new(self.ring_start_addr(), true, chain).to_parts(cycle);

            // SAFETY: The link TRB is only handed to the controller by this write,
            // and it points back to the start of this ring.
            unsafe {
                self.arena.write(self.arena.len() - 1, link);
            }
        }

        Ok(self.arena.addr_of(index))
    }

    /// Marks every TRB up to and including the one at `completed` as processed by the controller,
    /// freeing up space in the ring. The address comes from a completion event.
    pub fn update_dequeue(&mut self, completed: PhysAddr) -> Result<(), Error> {
        let usable = self.capacity();
        let index = self
            .arena
            .index_of(completed)
            .filter(|&i| i < usable)
            .ok_or_else(|| Error::new(ErrorKind::InvalidTrbPointer))?;

        let new_dequeue = (index + 1) % usable;
        let consumed = match (new_dequeue + usable - self.dequeue) % usable {
            // The whole ring was consumed
            0 if self.outstanding == usable => usable,
            // The TRB was already consumed, e.g. a second event for the same TD
            0 => return Ok(()),
            n => n,
        };

        if consumed > self.outstanding {
            return Err(Error::new(ErrorKind::InvalidTrbPointer));
        }

        self.dequeue = new_dequeue;
        self.outstanding -= consumed;

        Ok(())
    }
}

/// The _Command Ring_, which holds [`CommandTrb`]s for the controller to execute
#[derive(Debug)]
pub struct CommandRing(TrbRing);

impl CommandRing {
    /// Allocates a new [`CommandRing`] with `len` TRBs, including the link TRB
    pub fn new(len: usize) -> Self {
        Self(TrbRing::new(len))
    }

    /// Writes a command to the ring and returns its address, which identifies the command in its
    /// completion event.
    ///
    /// This function does not ring the host controller doorbell.
    ///
    /// # Safety
    /// * The caller is responsible for the behaviour of the controller in response to this TRB,
    ///   including keeping any structures the command points to alive until it completes.
    pub unsafe fn enqueue(&mut self, trb: CommandTrb) -> Result<PhysAddr, Error> {
        // SAFETY: This is just a wrapper function, so the safety requirements are the same.
        unsafe { self.0.enqueue(|cycle| trb.to_parts(cycle)) }
    }
}

impl core::ops::Deref for CommandRing {
    type Target = TrbRing;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for CommandRing {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A _Transfer Ring_, which holds [`TransferTrb`]s for one endpoint
#[derive(Debug)]
pub struct TransferRing(TrbRing);

impl TransferRing {
    /// Allocates a new [`TransferRing`] with `len` TRBs, including the link TRB
    pub fn new(len: usize) -> Self {
        Self(TrbRing::new(len))
    }

    /// Writes a transfer TRB to the ring and returns its address, which identifies the TRB in
    /// transfer events.
    ///
    /// This function does not ring the device's doorbell.
    ///
    /// # Safety
    /// * The caller is responsible for the behaviour of the controller in response to this TRB,
    ///   including keeping the data buffer alive until the transfer completes.
    pub unsafe fn enqueue(&mut self, trb: TransferTrb) -> Result<PhysAddr, Error> {
        // SAFETY: This is just a wrapper function, so the safety requirements are the same.
        unsafe { self.0.enqueue(|cycle| trb.to_parts(cycle)) }
    }
}

impl core::ops::Deref for TransferRing {
    type Target = TrbRing;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for TransferRing {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhci::trb::{type_of, TrbType};

    /// A TRB with a recognisable payload
    fn numbered_trb(n: u32) -> impl FnOnce(bool) -> [u32; 4] {
        move |cycle| [n, !n, 0, u32::from(TrbType::NoOp.into_bits()) << 10 | u32::from(cycle)]
    }

    /// Pushes `count` TRBs numbered from `first`, returning their addresses
    fn push_many(ring: &mut TrbRing, first: u32, count: u32) -> Vec<PhysAddr> {
        (first..first + count)
            .map(|n| {
                // SAFETY: no controller is reading the ring
                unsafe { ring.enqueue(numbered_trb(n)) }.expect("ring should have space")
            })
            .collect()
    }

    #[test]
    fn cursor_wraps_and_toggles() {
        let mut cursor = RingCursor::new(3);

        assert!(!cursor.advance());
        assert!(!cursor.advance());
        assert!(cursor.advance());
        assert_eq!(cursor.index(), 0);
        assert!(!cursor.cycle());
    }

    #[test]
    fn filling_the_ring_writes_link_and_toggles_once() {
        let len = 8;
        let mut ring = TrbRing::new(len);
        assert!(ring.cycle_state());

        push_many(&mut ring, 0, len as u32 - 2);
        assert!(ring.cycle_state());

        push_many(&mut ring, 100, 1);
        assert!(!ring.cycle_state());

        let link_parts = ring.arena().read(len - 1);
        let link = LinkTrb::from_parts(link_parts);
        assert_eq!(type_of(&link_parts), TrbType::Link);
        assert!(link.flags.cycle());
        assert!(link.flags.toggle_cycle());
        assert_eq!(link.pointer, ring.ring_start_addr());
    }

    #[test]
    fn push_past_capacity_is_ring_full() {
        let mut ring = TrbRing::new(4);
        let addrs = push_many(&mut ring, 0, 3);
        assert_eq!(ring.free_space(), 0);

        // SAFETY: no controller is reading the ring
        let result = unsafe { ring.enqueue(numbered_trb(3)) };
        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::RingFull));

        ring.update_dequeue(addrs[1]).expect("address should be in the ring");
        assert_eq!(ring.free_space(), 2);
        push_many(&mut ring, 3, 2);
        assert_eq!(ring.free_space(), 0);
    }

    #[test]
    fn consumer_reads_back_pushed_sequence() {
        let len = 6;
        let mut ring = TrbRing::new(len);

        // Go round the ring a few times, consuming as the controller would
        let mut consumer = RingCursor::new(len - 1);
        for lap in 0..4 {
            let first = lap * 10;
            let addrs = push_many(&mut ring, first, 3);

            for n in first..first + 3 {
                let trb = ring.arena().read(consumer.index());
                assert_eq!(cycle_of(&trb), consumer.cycle());
                assert_eq!(trb[0], n);
                assert_eq!(trb[1], !n);
                consumer.advance();
            }

            ring.update_dequeue(addrs[2]).expect("address should be in the ring");
            assert_eq!(ring.free_space(), ring.capacity());
        }
    }

    #[test]
    fn update_dequeue_rejects_foreign_pointers() {
        let mut ring = TrbRing::new(4);
        push_many(&mut ring, 0, 1);

        let outside = ring.ring_start_addr() + 0x1000u64;
        let link = ring.arena().addr_of(3);
        let misaligned = ring.ring_start_addr() + 4u64;

        for addr in [outside, link, misaligned] {
            assert_eq!(
                ring.update_dequeue(addr).map_err(|e| e.kind()),
                Err(ErrorKind::InvalidTrbPointer)
            );
        }
    }
}
