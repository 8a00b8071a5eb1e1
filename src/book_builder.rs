/// Price level store
///
/// Maintains bid/ask levels using BTreeMap keyed by price, so every mutation is
/// O(log depth) and reads come out already ordered. Deltas carry the absolute
/// resulting quantity at a level, never an increment.

use std::collections::BTreeMap;

use crate::fixed::FixedPoint;
use crate::protocol::{DeltaUpdate, Side};

/// Levels kept per side when no cap is configured.
pub const DEFAULT_MAX_LEVELS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: FixedPoint,
    pub quantity: FixedPoint,
}

impl PriceLevel {
    pub fn new(price: FixedPoint, quantity: FixedPoint) -> Self {
        PriceLevel { price, quantity }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    // price -> quantity; best bid is the last key, best ask the first
    bids: BTreeMap<FixedPoint, FixedPoint>,
    asks: BTreeMap<FixedPoint, FixedPoint>,

    last_update_id: i64,
    max_levels: usize,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_MAX_LEVELS)
    }

    /// Book retaining at most `max_levels` per side; the worst levels are evicted first.
    pub fn with_max_levels(max_levels: usize) -> Self {
        OrderBook {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            max_levels: max_levels.max(1),
        }
    }

    /// Set the level at `price` to `quantity`, removing it when quantity is zero.
    pub fn apply(&mut self, side: Side, price: FixedPoint, quantity: FixedPoint) {
        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };

        if !quantity.is_positive() {
            levels.remove(&price);
            return;
        }

        levels.insert(price, quantity);
        if levels.len() > self.max_levels {
            match side {
                Side::Bid => levels.pop_first(),
                Side::Ask => levels.pop_last(),
            };
        }
    }

    /// Apply a decoded delta and advance `last_update_id` to its ordinal.
    pub fn apply_delta(&mut self, update: &DeltaUpdate) {
        self.apply(update.side, update.price, update.quantity);
        self.last_update_id = update.ordinal;
    }

    /// Replace the whole book with the given levels at `ordinal`.
    ///
    /// Levels with a non-positive quantity are skipped. The new sides are built before
    /// the old ones are dropped, so the book is never observed half-replaced.
    pub fn reset_from<B, A>(&mut self, bids: B, asks: A, ordinal: i64)
    where
        B: IntoIterator<Item = PriceLevel>,
        A: IntoIterator<Item = PriceLevel>,
    {
        let mut fresh = OrderBook::with_max_levels(self.max_levels);
        for level in bids {
            fresh.apply(Side::Bid, level.price, level.quantity);
        }
        for level in asks {
            fresh.apply(Side::Ask, level.price, level.quantity);
        }
        fresh.last_update_id = ordinal;
        *self = fresh;
    }

    /// Drop every level; `last_update_id` is kept for diagnostics.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Top `depth` levels per side: bids descending, asks ascending.
    pub fn snapshot_view(&self, depth: usize) -> BookDepth {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&p, &q)| PriceLevel::new(p, q))
            .collect();

        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(&p, &q)| PriceLevel::new(p, q))
            .collect();

        BookDepth {
            last_update_id: self.last_update_id,
            bids,
            asks,
        }
    }

    pub fn quantity_at(&self, side: Side, price: FixedPoint) -> Option<FixedPoint> {
        match side {
            Side::Bid => self.bids.get(&price).copied(),
            Side::Ask => self.asks.get(&price).copied(),
        }
    }

    /// Get best bid price and quantity
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(&p, &q)| PriceLevel::new(p, q))
    }

    /// Get best ask price and quantity
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(&p, &q)| PriceLevel::new(p, q))
    }

    /// Best ask minus best bid in fixed-point units; None when one side is empty or crossed
    pub fn spread(&self) -> Option<FixedPoint> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid.price < ask.price => {
                Some(FixedPoint::from_raw(ask.price.raw() - bid.price.raw()))
            }
            _ => None,
        }
    }

    pub fn last_update_id(&self) -> i64 {
        self.last_update_id
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Get bid side level count
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Get ask side level count
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered, depth-limited copy of the book at one ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDepth {
    pub last_update_id: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
