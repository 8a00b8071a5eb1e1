/// Delta frame decoder
///
/// Turns the first 26 bytes of a buffer into a `DeltaUpdate`. Anything past the record is
/// left alone: the transport occasionally appends framing bytes, and those must never
/// shift where the next record starts.

use crate::fixed::FixedPoint;
use crate::protocol::*;
use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("invalid side flag: {0}")]
    InvalidSide(u16),

    #[error("{field} out of range: {value}")]
    ValueOutOfRange { field: &'static str, value: i64 },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

fn non_negative(field: &'static str, value: i64) -> DecodeResult<i64> {
    if value < 0 {
        // An unsigned wire value with the top bit set lands here
        return Err(DecodeError::ValueOutOfRange { field, value });
    }
    Ok(value)
}

pub struct Decoder;

impl Decoder {
    /// Decode one delta from the front of `buffer`.
    pub fn decode(buffer: &[u8]) -> DecodeResult<DeltaUpdate> {
        if buffer.len() < FRAME_SIZE {
            return Err(DecodeError::BufferTooSmall {
                need: FRAME_SIZE,
                have: buffer.len(),
            });
        }

        let flag = BigEndian::read_u16(&buffer[SIDE_OFFSET..ORDINAL_OFFSET]);
        let side = Side::from_flag(flag).ok_or(DecodeError::InvalidSide(flag))?;

        let ordinal = non_negative(
            "ordinal",
            BigEndian::read_i64(&buffer[ORDINAL_OFFSET..PRICE_OFFSET]),
        )?;
        let price = non_negative(
            "price",
            BigEndian::read_i64(&buffer[PRICE_OFFSET..QUANTITY_OFFSET]),
        )?;
        let quantity = non_negative(
            "quantity",
            BigEndian::read_i64(&buffer[QUANTITY_OFFSET..FRAME_SIZE]),
        )?;

        Ok(DeltaUpdate {
            side,
            ordinal,
            price: FixedPoint::from_raw(price),
            quantity: FixedPoint::from_raw(quantity),
        })
    }

    /// Walk a byte stream of back-to-back records.
    ///
    /// Every complete 26-byte record is handed to `callback`, including ones that fail to
    /// decode, so alignment never drifts. Stops early if the callback returns false.
    /// Returns the number of bytes consumed; a trailing partial record is left for the
    /// caller to prepend to the next read.
    pub fn decode_stream<F>(buffer: &[u8], mut callback: F) -> usize
    where
        F: FnMut(DecodeResult<DeltaUpdate>) -> bool,
    {
        let mut offset = 0;

        while buffer.len() - offset >= FRAME_SIZE {
            let result = Self::decode(&buffer[offset..offset + FRAME_SIZE]);
            offset += FRAME_SIZE;
            if !callback(result) {
                break;
            }
        }

        offset
    }
}
