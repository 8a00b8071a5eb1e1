/// Synthetic delta feed generator
///
/// Writes back-to-back 26-byte big-endian delta frames with contiguous ordinals,
/// plus the matching snapshot JSON at ordinal 0, to a file or stdout.
/// Useful for replay testing and benchmarking.

use std::env;
use std::fs::File;
use std::io::Write;

use book_sync::{BookSnapshot, DeltaUpdate, FixedPoint, OrderBook, Side, Submitter};
use rand::Rng;

const MID_PRICE: i64 = 10_000; // 0.0010000
const TICK: i64 = 100;
const LEVELS: i64 = 100;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();

    let output_path = if args.len() > 1 {
        args[1].clone()
    } else {
        "/tmp/delta_feed.bin".to_string()
    };

    let frame_count: i64 = if args.len() > 2 {
        args[2].parse().unwrap_or(10000)
    } else {
        10000
    };

    let mut output: Box<dyn Write> = if output_path == "stdout" {
        Box::new(std::io::stdout())
    } else {
        Box::new(File::create(&output_path)?)
    };

    let mut rng = rand::thread_rng();

    // Seed book at ordinal 0
    let mut book = OrderBook::new();
    for i in 1..=LEVELS / 2 {
        let qty = FixedPoint::from_raw(rng.gen_range(1_000..100_000));
        book.apply(Side::Bid, FixedPoint::from_raw(MID_PRICE - i * TICK), qty);
        let qty = FixedPoint::from_raw(rng.gen_range(1_000..100_000));
        book.apply(Side::Ask, FixedPoint::from_raw(MID_PRICE + i * TICK), qty);
    }
    let snapshot: BookSnapshot = Submitter::new(LEVELS as usize).render(&book);

    eprintln!("Generating {} frames to {}", frame_count, output_path);

    for ordinal in 1..=frame_count {
        let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
        let offset = rng.gen_range(1..=LEVELS) * TICK;
        let price = match side {
            Side::Bid => MID_PRICE - offset,
            Side::Ask => MID_PRICE + offset,
        };

        // roughly one in five updates removes a level
        let quantity = if rng.gen_range(0..5) == 0 {
            0
        } else {
            rng.gen_range(1_000..100_000)
        };

        let update = DeltaUpdate::new(
            side,
            ordinal,
            FixedPoint::from_raw(price),
            FixedPoint::from_raw(quantity),
        );
        book.apply_delta(&update);
        output.write_all(&update.to_frame())?;

        if ordinal % 1000 == 0 {
            eprintln!("Generated {} frames", ordinal);
        }
    }

    if output_path != "stdout" {
        let snapshot_path = format!("{}.snapshot.json", output_path);
        let json = serde_json::to_string(&snapshot).map_err(std::io::Error::other)?;
        std::fs::write(&snapshot_path, json)?;
        eprintln!("Snapshot at ordinal 0 written to {}", snapshot_path);
    }

    eprintln!("Feed generation complete: {} frames", frame_count);
    eprintln!("File size: {} bytes", frame_count * book_sync::FRAME_SIZE as i64);
    eprintln!(
        "Final book at ordinal {}: {} bids, {} asks",
        book.last_update_id(),
        book.bid_levels(),
        book.ask_levels()
    );

    Ok(())
}
