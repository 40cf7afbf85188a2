//! A driver for USB Communications Device Class (CDC) serial devices

use core::any::Any;

use crossbeam_queue::ArrayQueue;
use log::{debug, error, trace};

use super::{ClassDriver, TransferSubmitter};
use crate::endpoint::{EndpointConfig, EndpointId, EndpointType};
use crate::error::{Error, ErrorKind};
use crate::memory::DmaBuffer;
use crate::setup::SetupData;

/// The number of received bytes which are buffered before the oldest ones are overwritten
const RECEIVE_BUFFER_LEN: usize = 4096;

/// The number of bytes read back from the device after each [`send_serial`][CdcDriver::send_serial]
const READ_BACK_LEN: usize = 8;

/// A CDC serial device.
///
/// Bytes read from the bulk IN endpoint are queued until they're taken with [`receive_serial`].
///
/// [`receive_serial`]: CdcDriver::receive_serial
#[derive(Debug)]
pub struct CdcDriver {
    /// The notification endpoint of the communications interface
    ep_interrupt_in: Option<EndpointId>,
    /// The endpoint which the device sends data on
    ep_bulk_in: Option<EndpointId>,
    /// The endpoint which the host sends data on
    ep_bulk_out: Option<EndpointId>,
    /// Data received from the device which hasn't been read yet
    receive_buf: ArrayQueue<u8>,
}

impl Default for CdcDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CdcDriver {
    /// Constructs a driver which isn't yet bound to any endpoints
    pub fn new() -> Self {
        Self {
            ep_interrupt_in: None,
            ep_bulk_in: None,
            ep_bulk_out: None,
            receive_buf: ArrayQueue::new(RECEIVE_BUFFER_LEN),
        }
    }

    /// The interrupt IN endpoint, if one has been bound
    pub fn interrupt_in(&self) -> Option<EndpointId> {
        self.ep_interrupt_in
    }

    /// The bulk IN endpoint, if one has been bound
    pub fn bulk_in(&self) -> Option<EndpointId> {
        self.ep_bulk_in
    }

    /// The bulk OUT endpoint, if one has been bound
    pub fn bulk_out(&self) -> Option<EndpointId> {
        self.ep_bulk_out
    }

    /// Sends `data` to the device, and then starts a short read from the device.
    pub fn send_serial(
        &mut self,
        io: &mut dyn TransferSubmitter,
        data: &[u8],
    ) -> Result<(), Error> {
        let (Some(bulk_out), Some(bulk_in)) = (self.ep_bulk_out, self.ep_bulk_in) else {
            return Err(Error::new(ErrorKind::EndpointNotConfigured));
        };

        io.normal_out(bulk_out, DmaBuffer::from_slice(data))
            .inspect_err(|e| {
                error!("{}:{}: normal_out failed: {:?}", e.file(), e.line(), e.kind());
            })?;

        io.normal_in(bulk_in, DmaBuffer::new(READ_BACK_LEN))
            .inspect_err(|e| {
                error!("{}:{}: normal_in failed: {:?}", e.file(), e.line(), e.kind());
            })?;

        Ok(())
    }

    /// Takes up to `buf.len()` received bytes, returning how many were written
    pub fn receive_serial(&self, buf: &mut [u8]) -> usize {
        let mut len = 0;
        for b in buf.iter_mut() {
            let Some(received) = self.receive_buf.pop() else {
                break;
            };
            *b = received;
            len += 1;
        }

        len
    }

    /// The number of received bytes waiting to be read
    pub fn received_len(&self) -> usize {
        self.receive_buf.len()
    }
}

impl ClassDriver for CdcDriver {
    fn set_endpoint(&mut self, configs: &[EndpointConfig]) -> Result<(), Error> {
        for config in configs {
            let ep = config.ep_id;
            match (config.ep_type, ep.is_in()) {
                (EndpointType::Interrupt, true) => self.ep_interrupt_in = Some(ep),
                (EndpointType::Bulk, true) => self.ep_bulk_in = Some(ep),
                (EndpointType::Bulk, false) => self.ep_bulk_out = Some(ep),
                _ => trace!("CDC driver ignoring endpoint {ep:?}"),
            }
        }

        Ok(())
    }

    fn on_endpoints_configured(&mut self, _io: &mut dyn TransferSubmitter) -> Result<(), Error> {
        Ok(())
    }

    fn on_control_completed(
        &mut self,
        _io: &mut dyn TransferSubmitter,
        _ep: EndpointId,
        _setup: SetupData,
        _buffer: Option<DmaBuffer>,
        _len: usize,
    ) -> Result<(), Error> {
        Err(Error::new(ErrorKind::NotImplemented))
    }

    fn on_normal_completed(
        &mut self,
        _io: &mut dyn TransferSubmitter,
        ep: EndpointId,
        buffer: DmaBuffer,
        len: usize,
    ) -> Result<(), Error> {
        let data = &buffer.as_slice()[..len.min(buffer.len())];

        if Some(ep) == self.ep_bulk_in {
            debug!("CDC received {} bytes", data.len());
            for &b in data {
                self.receive_buf.force_push(b);
            }
            Ok(())
        } else if Some(ep) == self.ep_bulk_out {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::EndpointNotInCharge))
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classdriver::tests::{RecordingSubmitter, Submitted};

    /// The endpoints of a typical CDC-ACM device
    fn cdc_endpoints() -> [EndpointConfig; 3] {
        [
            EndpointConfig {
                ep_id: EndpointId::from_address(0x81),
                ep_type: EndpointType::Interrupt,
                max_packet_size: 8,
                interval: 16,
            },
            EndpointConfig {
                ep_id: EndpointId::from_address(0x82),
                ep_type: EndpointType::Bulk,
                max_packet_size: 64,
                interval: 0,
            },
            EndpointConfig {
                ep_id: EndpointId::from_address(0x02),
                ep_type: EndpointType::Bulk,
                max_packet_size: 64,
                interval: 0,
            },
        ]
    }

    /// A driver bound to [`cdc_endpoints`]
    fn bound_driver() -> CdcDriver {
        let mut driver = CdcDriver::new();
        driver.set_endpoint(&cdc_endpoints()).unwrap();
        driver
    }

    #[test]
    fn binds_interrupt_and_bulk_endpoints() {
        let mut configs = cdc_endpoints().to_vec();
        configs.push(EndpointConfig {
            ep_id: EndpointId::from_address(0x03),
            ep_type: EndpointType::Interrupt,
            max_packet_size: 8,
            interval: 4,
        });

        let mut driver = CdcDriver::new();
        driver.set_endpoint(&configs).unwrap();

        assert_eq!(driver.interrupt_in(), Some(EndpointId::from_address(0x81)));
        assert_eq!(driver.bulk_in(), Some(EndpointId::from_address(0x82)));
        assert_eq!(driver.bulk_out(), Some(EndpointId::from_address(0x02)));
    }

    #[test]
    fn bulk_in_data_is_queued_in_order() {
        let mut driver = bound_driver();
        let mut io = RecordingSubmitter::default();

        let mut buffer = DmaBuffer::new(8);
        buffer.as_mut_slice()[..5].copy_from_slice(b"hello");
        driver
            .on_normal_completed(&mut io, EndpointId::from_address(0x82), buffer, 5)
            .unwrap();
        assert_eq!(driver.received_len(), 5);

        let mut out = [0; 16];
        assert_eq!(driver.receive_serial(&mut out[..3]), 3);
        assert_eq!(&out[..3], b"hel");
        assert_eq!(driver.receive_serial(&mut out), 2);
        assert_eq!(&out[..2], b"lo");
        assert_eq!(driver.receive_serial(&mut out), 0);
    }

    #[test]
    fn bulk_out_completion_is_accepted() {
        let mut driver = bound_driver();
        let mut io = RecordingSubmitter::default();

        let buffer = DmaBuffer::from_slice(b"abc");
        driver
            .on_normal_completed(&mut io, EndpointId::from_address(0x02), buffer, 3)
            .unwrap();
        assert_eq!(driver.received_len(), 0);
    }

    #[test]
    fn other_endpoints_are_not_in_charge() {
        let mut driver = bound_driver();
        let mut io = RecordingSubmitter::default();

        let ep = EndpointId::from_address(0x81);
        let result = driver.on_normal_completed(&mut io, ep, DmaBuffer::new(8), 8);
        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::EndpointNotInCharge));
    }

    #[test]
    fn control_completion_is_not_implemented() {
        let mut driver = bound_driver();
        let mut io = RecordingSubmitter::default();

        let result = driver.on_control_completed(
            &mut io,
            EndpointId::DEFAULT_CONTROL_PIPE,
            SetupData::default(),
            None,
            0,
        );
        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::NotImplemented));
    }

    #[test]
    fn send_serial_writes_then_reads() {
        let mut driver = bound_driver();
        let mut io = RecordingSubmitter::default();

        driver.send_serial(&mut io, b"AT\r").unwrap();

        match io.submitted.as_slice() {
            [Submitted::NormalOut(out_ep, out_buf), Submitted::NormalIn(in_ep, in_buf)] => {
                assert_eq!(*out_ep, EndpointId::from_address(0x02));
                assert_eq!(out_buf.as_slice(), b"AT\r");
                assert_eq!(*in_ep, EndpointId::from_address(0x82));
                assert_eq!(in_buf.len(), READ_BACK_LEN);
            }
            other => panic!("Unexpected transfers {other:?}"),
        }
    }

    #[test]
    fn send_serial_needs_bound_endpoints() {
        let mut driver = CdcDriver::new();
        let mut io = RecordingSubmitter::default();

        let result = driver.send_serial(&mut io, b"x");
        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::EndpointNotConfigured));
        assert!(io.submitted.is_empty());
    }

    #[test]
    fn receive_buffer_keeps_newest_bytes() {
        let mut driver = bound_driver();
        let mut io = RecordingSubmitter::default();

        let len = RECEIVE_BUFFER_LEN + 1;
        let buffer = DmaBuffer::from_slice(&[7; RECEIVE_BUFFER_LEN + 1]);
        driver
            .on_normal_completed(&mut io, EndpointId::from_address(0x82), buffer, len)
            .unwrap();
        assert_eq!(driver.received_len(), RECEIVE_BUFFER_LEN);
    }
}
