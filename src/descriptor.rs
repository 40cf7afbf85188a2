//! Parsing of the standard USB descriptors which a device returns during enumeration.
//!
//! Descriptors are read from the little-endian wire format. Each descriptor starts with its length
//! in bytes and its type, so descriptors of unknown types (e.g. class-specific ones) can be
//! skipped.

use alloc::vec::Vec;

use crate::endpoint::{EndpointConfig, EndpointId, EndpointType};
use crate::error::{Error, ErrorKind};

/// Values of the `bDescriptorType` field
pub mod descriptor_type {
    /// A [`DeviceDescriptor`][super::DeviceDescriptor]
    pub const DEVICE: u8 = 1;
    /// A [`ConfigurationDescriptor`][super::ConfigurationDescriptor]
    pub const CONFIGURATION: u8 = 2;
    /// A string descriptor
    pub const STRING: u8 = 3;
    /// An [`InterfaceDescriptor`][super::InterfaceDescriptor]
    pub const INTERFACE: u8 = 4;
    /// An [`EndpointDescriptor`][super::EndpointDescriptor]
    pub const ENDPOINT: u8 = 5;
    /// A class-specific interface descriptor
    pub const CS_INTERFACE: u8 = 0x24;
}

/// Reads a little-endian `u16` at `offset`
fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Checks that `data` starts with a descriptor of the given type which is at least `min_len` bytes
/// long, and returns the descriptor's bytes
fn checked_descriptor(data: &[u8], expected_type: u8, min_len: usize) -> Result<&[u8], Error> {
    let &[len, ty, ..] = data else {
        return Err(Error::new(ErrorKind::InvalidDescriptor));
    };

    let len = usize::from(len);
    if ty != expected_type || len < min_len || len > data.len() {
        return Err(Error::new(ErrorKind::InvalidDescriptor));
    }

    Ok(&data[..len])
}

/// The descriptor describing a device as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// `bcdUSB`: the USB version the device supports
    pub usb_release: u16,
    /// `bDeviceClass`
    pub device_class: u8,
    /// `bDeviceSubClass`
    pub device_subclass: u8,
    /// `bDeviceProtocol`
    pub device_protocol: u8,
    /// `bMaxPacketSize0`: the max packet size of the default control pipe
    pub max_packet_size_0: u8,
    /// `idVendor`
    pub vendor_id: u16,
    /// `idProduct`
    pub product_id: u16,
    /// `bNumConfigurations`
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// The length of a device descriptor in bytes
    pub const LENGTH: u16 = 18;

    /// Parses a device descriptor
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let data = checked_descriptor(data, descriptor_type::DEVICE, Self::LENGTH.into())?;

        Ok(Self {
            usb_release: read_u16(data, 2),
            device_class: data[4],
            device_subclass: data[5],
            device_protocol: data[6],
            max_packet_size_0: data[7],
            vendor_id: read_u16(data, 8),
            product_id: read_u16(data, 10),
            num_configurations: data[17],
        })
    }
}

/// The header of a configuration, which is followed by its interface and endpoint descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    /// `wTotalLength`: the length of the configuration descriptor and all the descriptors following
    /// it
    pub total_length: u16,
    /// `bNumInterfaces`
    pub num_interfaces: u8,
    /// `bConfigurationValue`: the value passed to `SET_CONFIGURATION` to select this configuration
    pub configuration_value: u8,
    /// `bmAttributes`
    pub attributes: u8,
    /// `bMaxPower`, in units of 2mA
    pub max_power: u8,
}

impl ConfigurationDescriptor {
    /// The length of a configuration descriptor in bytes
    pub const LENGTH: usize = 9;

    /// Parses a configuration descriptor, ignoring the descriptors which follow it
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let data = checked_descriptor(data, descriptor_type::CONFIGURATION, Self::LENGTH)?;

        Ok(Self {
            total_length: read_u16(data, 2),
            num_interfaces: data[4],
            configuration_value: data[5],
            attributes: data[7],
            max_power: data[8],
        })
    }
}

/// A descriptor of one interface of a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// `bInterfaceNumber`
    pub interface_number: u8,
    /// `bAlternateSetting`
    pub alternate_setting: u8,
    /// `bNumEndpoints`: the number of endpoints, not including endpoint 0
    pub num_endpoints: u8,
    /// `bInterfaceClass`
    pub interface_class: u8,
    /// `bInterfaceSubClass`
    pub interface_subclass: u8,
    /// `bInterfaceProtocol`
    pub interface_protocol: u8,
}

impl InterfaceDescriptor {
    /// The length of an interface descriptor in bytes
    pub const LENGTH: usize = 9;

    /// Parses an interface descriptor
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let data = checked_descriptor(data, descriptor_type::INTERFACE, Self::LENGTH)?;

        Ok(Self {
            interface_number: data[2],
            alternate_setting: data[3],
            num_endpoints: data[4],
            interface_class: data[5],
            interface_subclass: data[6],
            interface_protocol: data[7],
        })
    }
}

/// A descriptor of one endpoint of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`: the endpoint number, with bit 7 set for IN endpoints
    pub endpoint_address: u8,
    /// `bmAttributes`: the transfer type in bits 0..=1
    pub attributes: u8,
    /// `wMaxPacketSize`
    pub max_packet_size: u16,
    /// `bInterval`
    pub interval: u8,
}

impl EndpointDescriptor {
    /// The length of an endpoint descriptor in bytes
    pub const LENGTH: usize = 7;

    /// Parses an endpoint descriptor
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let data = checked_descriptor(data, descriptor_type::ENDPOINT, Self::LENGTH)?;

        Ok(Self {
            endpoint_address: data[2],
            attributes: data[3],
            max_packet_size: read_u16(data, 4),
            interval: data[6],
        })
    }

    /// Gets the configuration the controller needs for this endpoint
    pub fn to_config(&self) -> EndpointConfig {
        EndpointConfig {
            ep_id: EndpointId::from_address(self.endpoint_address),
            ep_type: EndpointType::from_attributes(self.attributes),
            // Bits 11..=12 hold the number of extra transactions per microframe
            max_packet_size: self.max_packet_size & 0x7ff,
            interval: self.interval,
        }
    }
}

/// An interface and the endpoint descriptors which follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// The interface's descriptor
    pub descriptor: InterfaceDescriptor,
    /// The interface's endpoints
    pub endpoints: Vec<EndpointDescriptor>,
}

/// A whole configuration as returned by `GET_DESCRIPTOR(Configuration)`.
/// Only the default alternate setting of each interface is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// The configuration's header
    pub descriptor: ConfigurationDescriptor,
    /// The configuration's interfaces
    pub interfaces: Vec<Interface>,
}

impl Configuration {
    /// Parses a configuration descriptor and the descriptors which follow it.
    ///
    /// `data` must hold the whole configuration, i.e. at least `wTotalLength` bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let descriptor = ConfigurationDescriptor::parse(data)?;

        let total_length = usize::from(descriptor.total_length);
        if total_length > data.len() {
            return Err(Error::new(ErrorKind::InvalidDescriptor));
        }

        let mut interfaces: Vec<Interface> = Vec::new();
        // Whether endpoint descriptors currently belong to an alternate setting which is being
        // skipped
        let mut skipping = true;

        let mut rest = &data[ConfigurationDescriptor::LENGTH.min(total_length)..total_length];
        while !rest.is_empty() {
            let len = usize::from(rest[0]);
            if len < 2 || len > rest.len() {
                return Err(Error::new(ErrorKind::InvalidDescriptor));
            }

            match rest[1] {
                descriptor_type::INTERFACE => {
                    let descriptor = InterfaceDescriptor::parse(rest)?;
                    skipping = descriptor.alternate_setting != 0;

                    if !skipping {
                        interfaces.push(Interface {
                            descriptor,
                            endpoints: Vec::new(),
                        });
                    }
                }
                descriptor_type::ENDPOINT if !skipping => {
                    let endpoint = EndpointDescriptor::parse(rest)?;
                    if let Some(interface) = interfaces.last_mut() {
                        interface.endpoints.push(endpoint);
                    }
                }
                _ => (),
            }

            rest = &rest[len..];
        }

        Ok(Self {
            descriptor,
            interfaces,
        })
    }

    /// Gets the configurations of every endpoint of every interface
    pub fn endpoint_configs(&self) -> impl Iterator<Item = EndpointConfig> + '_ {
        self.interfaces
            .iter()
            .flat_map(|interface| interface.endpoints.iter().map(EndpointDescriptor::to_config))
    }
}
