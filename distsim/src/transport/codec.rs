//! Wire format of inter-process messages.
//!
//! Every point-to-point frame starts with a fixed little-endian header:
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 8    | delivery time   |
//! | 8      | 8    | guarantee time  |
//! | 16     | 4    | destination node|
//! | 20     | 4    | destination device |
//!
//! The payload, if any, follows the header. A delivery time of zero marks a
//! null message, which never carries a payload.
//!
//! Collective contributions of the granted-time-window algorithm use their own
//! fixed-size layouts.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::time::SimTime;

/// Size of the point-to-point message header.
pub(crate) const HEADER_LEN: usize = 24;

/// Size of an encoded LBTS contribution.
const LBTS_LEN: usize = 29;

/// Size of an encoded lookahead contribution.
const LOOKAHEAD_LEN: usize = 8;

/// A point-to-point message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Message {
    pub(crate) delivery_time: SimTime,
    pub(crate) guarantee_time: SimTime,
    pub(crate) dest_node: u32,
    pub(crate) dest_device: u32,
    pub(crate) payload: Bytes,
}

impl Message {
    /// Creates a null message advertising the specified guarantee time.
    pub(crate) fn null(guarantee_time: SimTime) -> Self {
        Self {
            delivery_time: SimTime::ZERO,
            guarantee_time,
            dest_node: 0,
            dest_device: 0,
            payload: Bytes::new(),
        }
    }

    /// Creates a message carrying a packet.
    pub(crate) fn packet(
        delivery_time: SimTime,
        guarantee_time: SimTime,
        dest_node: u32,
        dest_device: u32,
        payload: Bytes,
    ) -> Self {
        debug_assert_ne!(delivery_time, SimTime::ZERO);

        Self {
            delivery_time,
            guarantee_time,
            dest_node,
            dest_device,
            payload,
        }
    }

    /// Returns `true` for pure synchronization messages.
    pub(crate) fn is_null(&self) -> bool {
        self.delivery_time == SimTime::ZERO
    }

    /// Serializes the message into a frame.
    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u64_le(self.delivery_time.as_nanos());
        buf.put_u64_le(self.guarantee_time.as_nanos());
        buf.put_u32_le(self.dest_node);
        buf.put_u32_le(self.dest_device);
        buf.put_slice(&self.payload);

        buf.freeze()
    }

    /// Deserializes a frame.
    ///
    /// The payload shares the frame buffer.
    pub(crate) fn decode(mut frame: Bytes) -> Result<Self, DecodeError> {
        if frame.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: frame.len(),
            });
        }
        let delivery_time = SimTime::from_nanos(frame.get_u64_le());
        let guarantee_time = SimTime::from_nanos(frame.get_u64_le());
        let dest_node = frame.get_u32_le();
        let dest_device = frame.get_u32_le();

        if delivery_time == SimTime::ZERO && !frame.is_empty() {
            return Err(DecodeError::UnexpectedPayload { len: frame.len() });
        }

        Ok(Self {
            delivery_time,
            guarantee_time,
            dest_node,
            dest_device,
            payload: frame,
        })
    }
}

/// Contribution of one logical process to a granted-time-window round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct LbtsMessage {
    /// Timestamp of the earliest pending local event.
    pub(crate) smallest_time: SimTime,
    /// Total number of messages sent.
    pub(crate) tx_count: u64,
    /// Total number of messages received.
    pub(crate) rx_count: u64,
    pub(crate) system_id: u32,
    /// Whether the local event loop has nothing left to do.
    pub(crate) is_finished: bool,
}

impl LbtsMessage {
    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LBTS_LEN);
        buf.put_u64_le(self.smallest_time.as_nanos());
        buf.put_u64_le(self.tx_count);
        buf.put_u64_le(self.rx_count);
        buf.put_u32_le(self.system_id);
        buf.put_u8(self.is_finished as u8);

        buf.freeze()
    }

    pub(crate) fn decode(mut buf: Bytes) -> Result<Self, DecodeError> {
        expect_len(&buf, LBTS_LEN)?;

        Ok(Self {
            smallest_time: SimTime::from_nanos(buf.get_u64_le()),
            tx_count: buf.get_u64_le(),
            rx_count: buf.get_u64_le(),
            system_id: buf.get_u32_le(),
            is_finished: buf.get_u8() != 0,
        })
    }
}

/// Encodes a lookahead, with `Duration::MAX` standing for "unbounded".
pub(crate) fn encode_lookahead(lookahead: Duration) -> Bytes {
    let nanos = u64::try_from(lookahead.as_nanos()).unwrap_or(u64::MAX);
    let mut buf = BytesMut::with_capacity(LOOKAHEAD_LEN);
    buf.put_u64_le(nanos);

    buf.freeze()
}

/// Decodes a lookahead encoded with [`encode_lookahead`].
pub(crate) fn decode_lookahead(mut buf: Bytes) -> Result<Duration, DecodeError> {
    expect_len(&buf, LOOKAHEAD_LEN)?;

    Ok(match buf.get_u64_le() {
        u64::MAX => Duration::MAX,
        nanos => Duration::from_nanos(nanos),
    })
}

fn expect_len(buf: &Bytes, expected: usize) -> Result<(), DecodeError> {
    if buf.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: buf.len(),
        });
    }

    Ok(())
}

/// Error returned when a received frame is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is shorter than the message header.
    Truncated {
        /// Minimum frame size.
        expected: usize,
        /// Actual frame size.
        actual: usize,
    },
    /// A null message carries a payload.
    UnexpectedPayload {
        /// Size of the payload.
        len: usize,
    },
    /// A fixed-size collective contribution has the wrong size.
    LengthMismatch {
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { expected, actual } => write!(
                fmt,
                "received a {}-byte frame, shorter than the {}-byte header",
                actual, expected
            ),
            Self::UnexpectedPayload { len } => {
                write!(fmt, "received a null message with a {}-byte payload", len)
            }
            Self::LengthMismatch { expected, actual } => write!(
                fmt,
                "received a {}-byte collective contribution instead of {} bytes",
                actual, expected
            ),
        }
    }
}

impl Error for DecodeError {}
