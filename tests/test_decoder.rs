/// Frame conformance and decoder tests

use book_sync::{Decoder, DecodeError, DeltaUpdate, FixedPoint, Side, FRAME_SIZE};
use byteorder::{BigEndian, ByteOrder};

fn create_delta_msg(flag: u16, ordinal: i64, price: i64, quantity: i64) -> Vec<u8> {
    let mut msg = vec![0u8; FRAME_SIZE];
    BigEndian::write_u16(&mut msg[0..2], flag);
    BigEndian::write_i64(&mut msg[2..10], ordinal);
    BigEndian::write_i64(&mut msg[10..18], price);
    BigEndian::write_i64(&mut msg[18..26], quantity);
    msg
}

#[test]
fn test_decode_ask() {
    let msg = create_delta_msg(0, 7, 11_000, 4_000);
    let update = Decoder::decode(&msg).unwrap();

    assert_eq!(update.side, Side::Ask);
    assert_eq!(update.ordinal, 7);
    assert_eq!(update.price.to_string(), "0.0011000");
    assert_eq!(update.quantity.to_string(), "0.0004000");
}

#[test]
fn test_decode_bid_removal() {
    let msg = create_delta_msg(1, 8, 10_000, 0);
    let update = Decoder::decode(&msg).unwrap();

    assert_eq!(update.side, Side::Bid);
    assert!(update.is_removal());
}

#[test]
fn test_decode_large_values() {
    // 123456.7890123 as scaled integers
    let msg = create_delta_msg(1, i64::MAX, 1_234_567_890_123, 1);
    let update = Decoder::decode(&msg).unwrap();

    assert_eq!(update.ordinal, i64::MAX);
    assert_eq!(update.price.to_string(), "123456.7890123");
    assert_eq!(update.quantity.to_string(), "0.0000001");
}

#[test]
fn test_invalid_side_flag() {
    let msg = create_delta_msg(2, 1, 10_000, 1_000);
    assert_eq!(Decoder::decode(&msg), Err(DecodeError::InvalidSide(2)));

    let msg = create_delta_msg(0xFFFF, 1, 10_000, 1_000);
    assert_eq!(Decoder::decode(&msg), Err(DecodeError::InvalidSide(0xFFFF)));
}

#[test]
fn test_short_frame_rejected() {
    let msg = create_delta_msg(1, 1, 10_000, 1_000);
    assert_eq!(
        Decoder::decode(&msg[..25]),
        Err(DecodeError::BufferTooSmall { need: 26, have: 25 })
    );
    assert_eq!(
        Decoder::decode(&[]),
        Err(DecodeError::BufferTooSmall { need: 26, have: 0 })
    );
}

#[test]
fn test_trailing_bytes_ignored() {
    let mut msg = create_delta_msg(1, 9, 10_000, 1_000);
    msg.extend_from_slice(&[0xAB, 0xCD]);
    assert_eq!(msg.len(), 28);

    let update = Decoder::decode(&msg).unwrap();
    assert_eq!(update.ordinal, 9);
    assert_eq!(update.price.raw(), 10_000);
    assert_eq!(update.quantity.raw(), 1_000);
}

#[test]
fn test_negative_fields_rejected() {
    for (msg, field) in [
        (create_delta_msg(1, -1, 1, 1), "ordinal"),
        (create_delta_msg(1, 1, -1, 1), "price"),
        (create_delta_msg(1, 1, 1, -5), "quantity"),
    ] {
        match Decoder::decode(&msg) {
            Err(DecodeError::ValueOutOfRange { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected {} out of range, got {:?}", field, other),
        }
    }
}

#[test]
fn test_frame_matches_encoder() {
    let update = DeltaUpdate::new(
        Side::Ask,
        12,
        FixedPoint::from_raw(12_000_000),
        FixedPoint::from_raw(5_000_000),
    );
    let frame = update.to_frame();
    assert_eq!(frame.to_vec(), create_delta_msg(0, 12, 12_000_000, 5_000_000));
}

#[test]
fn test_decode_stream_keeps_alignment() {
    let mut buffer = Vec::new();
    buffer.extend(create_delta_msg(1, 1, 10_000, 1_000));
    buffer.extend(create_delta_msg(9, 2, 10_000, 1_000)); // bad side, still 26 bytes
    buffer.extend(create_delta_msg(0, 3, 11_000, 2_000));
    buffer.extend(&[0u8; 10]); // partial record

    let mut ordinals = Vec::new();
    let mut errors = 0;
    let consumed = Decoder::decode_stream(&buffer, |result| {
        match result {
            Ok(update) => ordinals.push(update.ordinal),
            Err(_) => errors += 1,
        }
        true
    });

    assert_eq!(consumed, 3 * FRAME_SIZE);
    assert_eq!(ordinals, vec![1, 3]);
    assert_eq!(errors, 1);
}

#[test]
fn test_decode_stream_stops_early() {
    let mut buffer = Vec::new();
    for ordinal in 1..=5 {
        buffer.extend(create_delta_msg(1, ordinal, 10_000, 1_000));
    }

    let mut seen = 0;
    let consumed = Decoder::decode_stream(&buffer, |_| {
        seen += 1;
        seen < 2
    });

    assert_eq!(seen, 2);
    assert_eq!(consumed, 2 * FRAME_SIZE);
}
