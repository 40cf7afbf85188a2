//! The [`ControllerConfig`] type

use crate::error::{Error, ErrorKind};

/// The size in bytes of a single TRB
const TRB_SIZE: usize = 16;

/// Rings must not cross a 64KiB boundary, so a ring can be no bigger than this.
const MAX_RING_BYTES: usize = 0x1_0000;

/// Settings used when constructing a [`Controller`]
///
/// [`Controller`]: crate::xhci::controller::Controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// The number of TRBs in the command ring, including the link TRB
    pub command_ring_len: usize,
    /// The number of TRBs in the single segment of the primary event ring
    pub event_ring_len: usize,
    /// The number of TRBs in each endpoint's transfer ring, including the link TRB
    pub transfer_ring_len: usize,
    /// The minimum interval between interrupts, in units of 250ns
    pub interrupt_moderation_interval: u16,
    /// How many times to poll the controller's status registers before giving up on a reset
    pub reset_poll_limit: usize,
    /// The size of the buffer used to read descriptors while a device is being enumerated
    pub enumeration_buffer_len: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            command_ring_len: 32,
            event_ring_len: 64,
            transfer_ring_len: 32,
            interrupt_moderation_interval: 4000,
            reset_poll_limit: 1_000_000,
            enumeration_buffer_len: 256,
        }
    }
}

impl ControllerConfig {
    /// Checks that the configured values are usable by the controller
    pub fn validate(&self) -> Result<(), Error> {
        let ring_fits = |len: usize, min: usize| len >= min && len * TRB_SIZE <= MAX_RING_BYTES;

        // Event ring segments have a minimum size of 16 TRBs
        if !ring_fits(self.command_ring_len, 2)
            || !ring_fits(self.transfer_ring_len, 2)
            || !ring_fits(self.event_ring_len, 16)
        {
            return Err(Error::new(ErrorKind::InvalidConfig));
        }

        // Must be able to hold a whole device descriptor
        if self.enumeration_buffer_len < 18 {
            return Err(Error::new(ErrorKind::InvalidConfig));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ControllerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_small_rings() {
        let config = ControllerConfig {
            command_ring_len: 1,
            ..Default::default()
        };
        assert_eq!(
            config.validate().map_err(|e| e.kind()),
            Err(ErrorKind::InvalidConfig)
        );

        let config = ControllerConfig {
            event_ring_len: 8,
            ..Default::default()
        };
        assert_eq!(
            config.validate().map_err(|e| e.kind()),
            Err(ErrorKind::InvalidConfig)
        );
    }

    #[test]
    fn rejects_rings_crossing_64k() {
        let config = ControllerConfig {
            transfer_ring_len: 4097,
            ..Default::default()
        };
        assert_eq!(
            config.validate().map_err(|e| e.kind()),
            Err(ErrorKind::InvalidConfig)
        );
    }
}
