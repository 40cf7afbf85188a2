//! The [`DeviceManager`], which maps device slot IDs to [`Device`]s

use alloc::boxed::Box;

use log::debug;
use x86_64::PhysAddr;

use super::contexts::ContextSize;
use super::dcbaa::DeviceContextBaseAddressArray;
use super::device::Device;
use super::registers::doorbell::DoorbellRegister;
use crate::error::{Error, ErrorKind};

/// The number of device slots managed by the driver
pub const MAX_SLOTS: u8 = 8;

/// Owns the [`Device`] in each device slot, and keeps the DCBAA pointing at their device contexts
#[derive(Debug)]
pub struct DeviceManager {
    /// The DCBAA, whose entries point at the device contexts of the devices in `devices`
    dcbaa: DeviceContextBaseAddressArray,
    /// The device in each slot. Slot `n` is at index `n - 1`.
    devices: [Option<Box<Device>>; MAX_SLOTS as usize],
    /// The size of the controller's context structures
    context_size: ContextSize,
    /// The number of TRBs in each transfer ring
    transfer_ring_len: usize,
    /// The size of the buffer used to read descriptors during enumeration
    enumeration_buffer_len: u16,
}

impl DeviceManager {
    /// Constructs an empty device manager around a DCBAA with at least [`MAX_SLOTS`] entries
    pub fn new(
        dcbaa: DeviceContextBaseAddressArray,
        context_size: ContextSize,
        transfer_ring_len: usize,
        enumeration_buffer_len: u16,
    ) -> Self {
        Self {
            dcbaa,
            devices: Default::default(),
            context_size,
            transfer_ring_len,
            enumeration_buffer_len,
        }
    }

    /// The address of the DCBAA, for the controller's DCBAAP register
    pub fn dcbaa_addr(&self) -> PhysAddr {
        self.dcbaa.array_addr()
    }

    /// The DCBAA
    pub fn dcbaa(&self) -> &DeviceContextBaseAddressArray {
        &self.dcbaa
    }

    /// Gets the table index for a slot ID
    fn index(slot_id: u8) -> Result<usize, Error> {
        if (1..=MAX_SLOTS).contains(&slot_id) {
            Ok(usize::from(slot_id) - 1)
        } else {
            Err(Error::new(ErrorKind::InvalidSlotId))
        }
    }

    /// Constructs a device in the given slot and points the slot's DCBAA entry at its device
    /// context.
    ///
    /// If the slot is invalid or already in use, the table is left unchanged.
    pub fn allocate_device(
        &mut self,
        slot_id: u8,
        port: u8,
        speed: u8,
        doorbell: DoorbellRegister,
    ) -> Result<&mut Device, Error> {
        let index = Self::index(slot_id)?;
        if self.devices[index].is_some() {
            return Err(Error::new(ErrorKind::SlotAlreadyInUse));
        }

        let device = Box::new(Device::new(
            slot_id,
            port,
            speed,
            self.context_size,
            doorbell,
            self.transfer_ring_len,
            self.enumeration_buffer_len,
        ));
        self.dcbaa.set_slot_addr(slot_id, device.context().addr());
        debug!("Allocated slot {slot_id} for port {port}");

        Ok(&mut **self.devices[index].insert(device))
    }

    /// Gets the device in the given slot
    pub fn find_by_slot(&self, slot_id: u8) -> Result<&Device, Error> {
        self.devices[Self::index(slot_id)?]
            .as_deref()
            .ok_or_else(|| Error::new(ErrorKind::NoSuchDevice))
    }

    /// Gets the device in the given slot mutably
    pub fn find_by_slot_mut(&mut self, slot_id: u8) -> Result<&mut Device, Error> {
        self.devices[Self::index(slot_id)?]
            .as_deref_mut()
            .ok_or_else(|| Error::new(ErrorKind::NoSuchDevice))
    }

    /// Gets the device connected to the given root hub port, if there is one
    pub fn find_by_port(&self, port: u8) -> Option<&Device> {
        self.iter().find(|d| d.port() == port)
    }

    /// Gets the device connected to the given root hub port mutably, if there is one
    pub fn find_by_port_mut(&mut self, port: u8) -> Option<&mut Device> {
        self.devices
            .iter_mut()
            .flatten()
            .map(Box::as_mut)
            .find(|d| d.port() == port)
    }

    /// Iterates over the devices
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().flatten().map(Box::as_ref)
    }

    /// Takes the device out of the given slot and clears the slot's DCBAA entry.
    ///
    /// The device's memory may still be in use by the controller until the slot is disabled,
    /// so the caller must keep it alive until then.
    pub fn remove(&mut self, slot_id: u8) -> Result<Box<Device>, Error> {
        let index = Self::index(slot_id)?;
        let device = self.devices[index]
            .take()
            .ok_or_else(|| Error::new(ErrorKind::NoSuchDevice))?;
        self.dcbaa.clear_slot(slot_id);
        debug!("Removed slot {slot_id}");

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use core::ptr::NonNull;

    use super::*;
    use crate::memory::DmaBox;

    /// A device manager along with memory standing in for doorbell registers
    struct TestManager {
        manager: DeviceManager,
        doorbells: DmaBox,
    }

    impl TestManager {
        fn new() -> Self {
            Self {
                manager: DeviceManager::new(
                    DeviceContextBaseAddressArray::new(MAX_SLOTS, None),
                    ContextSize::Small,
                    16,
                    256,
                ),
                doorbells: DmaBox::new_zeroed(4 * (usize::from(MAX_SLOTS) + 1), 4),
            }
        }

        fn doorbell(&self, slot_id: u8) -> DoorbellRegister {
            // SAFETY: the doorbell array has an entry for every slot
            let ptr = unsafe { self.doorbells.as_ptr::<u32>().add(slot_id.into()) };
            // SAFETY: `doorbells` lives as long as the manager
            unsafe { DoorbellRegister::new(NonNull::new(ptr.cast_mut()).unwrap()) }
        }

        fn allocate(&mut self, slot_id: u8, port: u8) -> Result<(), ErrorKind> {
            let doorbell = self.doorbell(slot_id.min(MAX_SLOTS));
            self.manager
                .allocate_device(slot_id, port, 3, doorbell)
                .map(|_| ())
                .map_err(|e| e.kind())
        }
    }

    #[test]
    fn allocate_remove_allocate() {
        let mut test = TestManager::new();

        assert_eq!(test.allocate(3, 1), Ok(()));
        assert_eq!(test.allocate(3, 2), Err(ErrorKind::SlotAlreadyInUse));
        assert_eq!(test.manager.find_by_slot(3).map(Device::port), Ok(1));

        let removed = test.manager.remove(3).unwrap();
        assert_eq!(removed.slot_id(), 3);
        assert_eq!(test.manager.dcbaa().slot_addr(3), None);
        assert_eq!(
            test.manager.find_by_slot(3).map_err(|e| e.kind()).err(),
            Some(ErrorKind::NoSuchDevice)
        );

        assert_eq!(test.allocate(3, 2), Ok(()));
        assert_eq!(test.manager.find_by_slot(3).map(Device::port), Ok(2));
    }

    #[test]
    fn occupied_slot_is_left_unchanged() {
        let mut test = TestManager::new();
        test.allocate(5, 1).unwrap();
        let context_addr = test.manager.find_by_slot(5).unwrap().context().addr();

        assert_eq!(test.allocate(5, 4), Err(ErrorKind::SlotAlreadyInUse));

        let device = test.manager.find_by_slot(5).unwrap();
        assert_eq!(device.port(), 1);
        assert_eq!(device.context().addr(), context_addr);
        assert_eq!(test.manager.dcbaa().slot_addr(5), Some(context_addr));
    }

    #[test]
    fn slot_ids_are_bounds_checked() {
        let mut test = TestManager::new();

        for slot_id in [0, MAX_SLOTS + 1, 255] {
            assert_eq!(
                test.manager.find_by_slot(slot_id).map_err(|e| e.kind()).err(),
                Some(ErrorKind::InvalidSlotId)
            );
            assert_eq!(test.allocate(slot_id, 1), Err(ErrorKind::InvalidSlotId));
            assert_eq!(
                test.manager.remove(slot_id).map_err(|e| e.kind()).err(),
                Some(ErrorKind::InvalidSlotId)
            );
        }

        assert_eq!(test.allocate(MAX_SLOTS, 1), Ok(()));
    }

    #[test]
    fn find_by_port() {
        let mut test = TestManager::new();
        test.allocate(1, 4).unwrap();
        test.allocate(2, 2).unwrap();

        assert_eq!(test.manager.find_by_port(2).map(Device::slot_id), Some(2));
        assert_eq!(test.manager.find_by_port_mut(4).map(|d| d.slot_id()), Some(1));
        assert!(test.manager.find_by_port(3).is_none());
        assert_eq!(test.manager.iter().count(), 2);
    }
}
