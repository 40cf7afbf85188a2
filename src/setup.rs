//! The [`SetupData`] type, which is sent in the setup stage of a control transfer

/// Values of the `bmRequestType` field of a [`SetupData`]
pub mod request_type {
    /// Data flows from the device to the host
    pub const DEVICE_TO_HOST: u8 = 0x80;
    /// A request defined by the USB standard
    pub const STANDARD: u8 = 0x00;
    /// A request defined by a device class
    pub const CLASS: u8 = 0x20;
    /// The request is directed at the device
    pub const RECIPIENT_DEVICE: u8 = 0x00;
    /// The request is directed at an interface
    pub const RECIPIENT_INTERFACE: u8 = 0x01;
}

/// Values of the `bRequest` field of a [`SetupData`]
pub mod request {
    /// Reads a descriptor
    pub const GET_DESCRIPTOR: u8 = 6;
    /// Selects a device configuration
    pub const SET_CONFIGURATION: u8 = 9;
}

/// The 8 bytes of a control transfer's setup stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupData {
    /// `bmRequestType`: direction, type and recipient of the request
    pub request_type: u8,
    /// `bRequest`: which request is being made
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`: the number of bytes in the data stage
    pub length: u16,
}

impl SetupData {
    /// A standard `GET_DESCRIPTOR` request to the device for `length` bytes
    pub const fn get_descriptor(descriptor_type: u8, descriptor_index: u8, length: u16) -> Self {
        Self {
            request_type: request_type::DEVICE_TO_HOST
                | request_type::STANDARD
                | request_type::RECIPIENT_DEVICE,
            request: request::GET_DESCRIPTOR,
            value: (descriptor_type as u16) << 8 | descriptor_index as u16,
            index: 0,
            length,
        }
    }

    /// A standard `SET_CONFIGURATION` request selecting `configuration_value`
    pub const fn set_configuration(configuration_value: u8) -> Self {
        Self {
            request_type: request_type::STANDARD | request_type::RECIPIENT_DEVICE,
            request: request::SET_CONFIGURATION,
            value: configuration_value as u16,
            index: 0,
            length: 0,
        }
    }

    /// Whether the data stage of the request (if any) flows from the device to the host
    pub const fn is_device_to_host(&self) -> bool {
        self.request_type & request_type::DEVICE_TO_HOST != 0
    }
}
