//! The [`XhciHost`] type, which shares a [`Controller`] between normal code and its interrupt
//! handler

use log::{debug, error};
use spin::Mutex;
use x86_64::VirtAddr;

use crate::config::ControllerConfig;
use crate::error::Error;
use crate::xhci::controller::Controller;

/// A running xHCI controller behind a lock.
///
/// The interrupt handler calls [`on_interrupt`], which skips processing if the lock is already
/// held, so code outside the handler should call [`process_events`] after releasing the lock to
/// pick up any events which arrived in the meantime.
///
/// [`on_interrupt`]: XhciHost::on_interrupt
/// [`process_events`]: XhciHost::process_events
#[derive(Debug)]
pub struct XhciHost {
    /// The controller
    controller: Mutex<Controller>,
}

impl XhciHost {
    /// Resets and starts the controller at `mmio_base`, and begins bringing up any ports which
    /// already have devices.
    ///
    /// # Safety
    /// * `mmio_base` must be the mapped MMIO region of an xHCI controller, which stays mapped for
    ///   the lifetime of the returned value
    /// * Only one [`XhciHost`] may exist for each xHCI controller
    pub unsafe fn start(mmio_base: VirtAddr, config: ControllerConfig) -> Result<Self, Error> {
        // SAFETY: the caller guarantees the MMIO region is valid and not otherwise in use
        let mut controller = unsafe { Controller::new(mmio_base, config) }?;

        controller.reset()?;
        controller.initialize()?;
        controller.run()?;
        controller.configure_all_ports();
        debug!("xHCI controller at {mmio_base:?} started");

        Ok(Self {
            controller: Mutex::new(controller),
        })
    }

    /// Processes all pending events
    pub fn process_events(&self) -> usize {
        self.controller.lock().process_events()
    }

    /// Handles an interrupt from the controller. Returns whether the interrupt came from this
    /// controller.
    pub fn on_interrupt(&self) -> bool {
        let Some(mut controller) = self.controller.try_lock() else {
            error!("xHCI controller locked during interrupt, deferring events");
            return false;
        };

        let pending = controller.acknowledge_interrupt();
        if pending {
            controller.process_events();
        }
        pending
    }

    /// Runs `f` with the controller locked
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut Controller) -> R) -> R {
        f(&mut self.controller.lock())
    }
}
