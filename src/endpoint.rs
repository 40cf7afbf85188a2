//! Types for identifying and configuring USB endpoints

/// Identifies an endpoint on a device by its number and direction.
///
/// The default control pipe (endpoint 0) is bidirectional and is represented as an IN endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId {
    /// The endpoint number, from 0 to 15
    number: u8,
    /// Whether data flows from the device to the host
    is_in: bool,
}

impl EndpointId {
    /// The default control pipe, used for enumeration and control requests
    pub const DEFAULT_CONTROL_PIPE: Self = Self {
        number: 0,
        is_in: true,
    };

    /// Constructs an [`EndpointId`] from an endpoint number and direction.
    ///
    /// # Panics
    /// If `number` is greater than 15
    pub const fn new(number: u8, is_in: bool) -> Self {
        assert!(number < 16);
        Self {
            number,
            is_in: is_in || number == 0,
        }
    }

    /// Constructs an [`EndpointId`] from the `bEndpointAddress` field of an endpoint descriptor
    pub const fn from_address(address: u8) -> Self {
        Self::new(address & 0xf, address & 0x80 != 0)
    }

    /// Constructs an [`EndpointId`] from a _Device Context Index_, returning [`None`] if the index
    /// is out of range
    pub const fn from_dci(dci: u8) -> Option<Self> {
        match dci {
            1 => Some(Self::DEFAULT_CONTROL_PIPE),
            2..=31 => Some(Self::new(dci / 2, dci % 2 == 1)),
            _ => None,
        }
    }

    /// The endpoint number
    pub const fn number(&self) -> u8 {
        self.number
    }

    /// Whether data flows from the device to the host
    pub const fn is_in(&self) -> bool {
        self.is_in
    }

    /// The endpoint's _Device Context Index_: its index into the endpoint contexts of a device
    /// context, and the doorbell target used to notify the controller of new transfers.
    pub const fn dci(&self) -> u8 {
        self.number * 2 + self.is_in as u8
    }
}

/// The transfer type of an endpoint, from the `bmAttributes` field of its descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    /// Control transfers, with a setup stage
    Control,
    /// Isochronous transfers, with guaranteed bandwidth but no retries
    Isochronous,
    /// Bulk transfers
    Bulk,
    /// Interrupt transfers, polled at a fixed interval
    Interrupt,
}

impl EndpointType {
    /// Gets the transfer type from the `bmAttributes` field of an endpoint descriptor
    pub const fn from_attributes(attributes: u8) -> Self {
        match attributes & 0b11 {
            0 => Self::Control,
            1 => Self::Isochronous,
            2 => Self::Bulk,
            _ => Self::Interrupt,
        }
    }

    /// Gets the value of the _Endpoint Type_ field of an endpoint context for an endpoint of this
    /// type
    pub const fn context_type(&self, is_in: bool) -> u8 {
        let base = match self {
            Self::Isochronous => 1,
            Self::Bulk => 2,
            Self::Interrupt => 3,
            Self::Control => return 4,
        };

        if is_in {
            base + 4
        } else {
            base
        }
    }
}

/// The configuration of an endpoint, which the controller needs to schedule transfers on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Which endpoint is being configured
    pub ep_id: EndpointId,
    /// The endpoint's transfer type
    pub ep_type: EndpointType,
    /// The largest packet the endpoint can send or receive
    pub max_packet_size: u16,
    /// The `bInterval` field of the endpoint descriptor
    pub interval: u8,
}
