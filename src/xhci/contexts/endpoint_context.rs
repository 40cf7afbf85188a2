//! The [`EndpointContext`] type

use x86_64::PhysAddr;

use super::update_methods;

/// The state of an endpoint (xHCI 1.2, section 4.8.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EndpointState {
    Disabled,
    Running,
    Halted,
    Stopped,
    Error,
    Reserved(u8),
}

impl EndpointState {
    /// Constructs an [`EndpointState`] from its bit representation
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Disabled,
            1 => Self::Running,
            2 => Self::Halted,
            3 => Self::Stopped,
            4 => Self::Error,
            _ => Self::Reserved(bits),
        }
    }

    /// Converts an [`EndpointState`] into its bit representation
    const fn into_bits(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Running => 1,
            Self::Halted => 2,
            Self::Stopped => 3,
            Self::Error => 4,
            Self::Reserved(bits) => bits,
        }
    }
}

/// The first dword of an [`EndpointContext`]
#[bitfield(u32)]
struct EndpointContextDword0 {
    /// The state of the endpoint, written by the controller
    #[bits(3)]
    endpoint_state: EndpointState,
    #[bits(5)]
    __: u8,
    /// The maximum number of bursts in an interval, for isochronous endpoints
    #[bits(2)]
    mult: u8,
    /// The maximum number of streams
    #[bits(5)]
    max_primary_streams: u8,
    /// Whether the dequeue pointer points to a linear stream array
    linear_stream_array: bool,
    /// The period between requests to the endpoint, as a power of 2 times 125µs
    interval: u8,
    /// The high byte of the _Max ESIT Payload_
    max_esit_payload_high: u8,
}

/// The second dword of an [`EndpointContext`]
#[bitfield(u32)]
struct EndpointContextDword1 {
    #[bits(1)]
    __: u8,
    /// The number of consecutive bus errors allowed before the endpoint halts
    #[bits(2)]
    error_count: u8,
    /// The type and direction of the endpoint
    #[bits(3)]
    endpoint_type: u8,
    #[bits(1)]
    __: u8,
    /// Disables host initiated stream selection
    host_initiate_disable: bool,
    /// The number of packets the endpoint can send or receive in a burst, minus 1
    max_burst_size: u8,
    /// The largest packet the endpoint can send or receive
    max_packet_size: u16,
}

/// The third dword of an [`EndpointContext`]
#[bitfield(u32)]
struct EndpointContextDword2 {
    /// The cycle state the controller starts the transfer ring with
    dequeue_cycle_state: bool,
    #[bits(3)]
    __: u8,
    /// Bits `4..32` of the transfer ring's dequeue pointer
    #[bits(28)]
    tr_dequeue_pointer_low: u32,
}

/// The fifth dword of an [`EndpointContext`]
#[bitfield(u32)]
struct EndpointContextDword4 {
    /// The average length of TRBs on the ring, used for bandwidth calculations
    average_trb_length: u16,
    /// The low 16 bits of the _Max ESIT Payload_
    max_esit_payload_low: u16,
}

/// Information about one endpoint of a device (xHCI 1.2, section 6.2.3)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointContext {
    /// The first dword
    dword_0: EndpointContextDword0,
    /// The second dword
    dword_1: EndpointContextDword1,
    /// The third dword
    dword_2: EndpointContextDword2,
    /// The high 32 bits of the transfer ring's dequeue pointer
    tr_dequeue_pointer_high: u32,
    /// The fifth dword
    dword_4: EndpointContextDword4,
    #[doc(hidden)]
    _reserved: [u32; 3],
}

#[rustfmt::skip]
impl EndpointContext {
    update_methods!(
        dword_0,
        endpoint_state, EndpointState,
        endpoint_state, set_endpoint_state, with_endpoint_state
    );
    update_methods!(
        dword_0,
        interval, u8,
        interval, set_interval, with_interval
    );
    update_methods!(
        dword_1,
        error_count, u8,
        error_count, set_error_count, with_error_count
    );
    update_methods!(
        dword_1,
        endpoint_type, u8,
        endpoint_type, set_endpoint_type, with_endpoint_type
    );
    update_methods!(
        dword_1,
        max_burst_size, u8,
        max_burst_size, set_max_burst_size, with_max_burst_size
    );
    update_methods!(
        dword_1,
        max_packet_size, u16,
        max_packet_size, set_max_packet_size, with_max_packet_size
    );
    update_methods!(
        dword_2,
        dequeue_cycle_state, bool,
        dequeue_cycle_state, set_dequeue_cycle_state, with_dequeue_cycle_state
    );
    update_methods!(
        dword_4,
        average_trb_length, u16,
        average_trb_length, set_average_trb_length, with_average_trb_length
    );
}

impl EndpointContext {
    /// Gets the address of the endpoint's transfer ring where the controller will read the next TRB
    pub fn tr_dequeue_pointer(&self) -> PhysAddr {
        let low = u64::from(self.dword_2.tr_dequeue_pointer_low()) << 4;
        let high = u64::from(self.tr_dequeue_pointer_high) << 32;
        PhysAddr::new(high | low)
    }

    /// Sets the address of the endpoint's transfer ring
    ///
    /// # Panics
    /// If `pointer` isn't 16 byte aligned
    #[must_use]
    pub fn with_tr_dequeue_pointer(mut self, pointer: PhysAddr) -> Self {
        assert!(pointer.is_aligned(16u64));

        #[allow(clippy::cast_possible_truncation)]
        {
            self.dword_2
                .set_tr_dequeue_pointer_low((pointer.as_u64() >> 4) as u32 & 0x0fff_ffff);
            self.tr_dequeue_pointer_high = (pointer.as_u64() >> 32) as u32;
        }
        self
    }
}
