/// Binary delta frame format
///
/// Fixed record: 26 bytes, big-endian
///   - side: u16 (2 bytes) - 1 = bid, 0 = ask
///   - ordinal: i64 (8 bytes) - update id this delta produces
///   - price: i64 (8 bytes) - fixed-point: price * 10^7
///   - quantity: i64 (8 bytes) - fixed-point: absolute resulting quantity * 10^7

use crate::fixed::FixedPoint;
use byteorder::{BigEndian, ByteOrder};

pub const FRAME_SIZE: usize = 26;

pub const SIDE_OFFSET: usize = 0;
pub const ORDINAL_OFFSET: usize = 2;
pub const PRICE_OFFSET: usize = 10;
pub const QUANTITY_OFFSET: usize = 18;

pub const BID_FLAG: u16 = 1;
pub const ASK_FLAG: u16 = 0;

// Compile-time checks for the record layout
const _: () = {
    assert!(ORDINAL_OFFSET == SIDE_OFFSET + 2);
    assert!(PRICE_OFFSET == ORDINAL_OFFSET + 8);
    assert!(QUANTITY_OFFSET == PRICE_OFFSET + 8);
    assert!(FRAME_SIZE == QUANTITY_OFFSET + 8);
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn from_flag(v: u16) -> Option<Self> {
        match v {
            BID_FLAG => Some(Side::Bid),
            ASK_FLAG => Some(Side::Ask),
            _ => None,
        }
    }

    pub fn flag(self) -> u16 {
        match self {
            Side::Bid => BID_FLAG,
            Side::Ask => ASK_FLAG,
        }
    }
}

/// One decoded delta: the absolute quantity now resting at `price` on `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaUpdate {
    pub side: Side,
    pub ordinal: i64,
    pub price: FixedPoint,
    pub quantity: FixedPoint,
}

impl DeltaUpdate {
    pub fn new(side: Side, ordinal: i64, price: FixedPoint, quantity: FixedPoint) -> Self {
        DeltaUpdate {
            side,
            ordinal,
            price,
            quantity,
        }
    }

    /// Zero quantity means the level is gone.
    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Encode into the server's wire layout.
    pub fn to_frame(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        BigEndian::write_u16(&mut frame[SIDE_OFFSET..ORDINAL_OFFSET], self.side.flag());
        BigEndian::write_i64(&mut frame[ORDINAL_OFFSET..PRICE_OFFSET], self.ordinal);
        BigEndian::write_i64(&mut frame[PRICE_OFFSET..QUANTITY_OFFSET], self.price.raw());
        BigEndian::write_i64(&mut frame[QUANTITY_OFFSET..FRAME_SIZE], self.quantity.raw());
        frame
    }
}
