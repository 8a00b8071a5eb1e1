/// JSON book shape shared by `GET /snapshot` and `POST /assertion`
///
/// `{"lastUpdateId": 5, "bids": [["0.0010000","0.0001000"]], "asks": [...]}`
/// with price first and quantity second, both seven-digit decimal strings.

use serde::{Deserialize, Serialize};

use crate::book_builder::{BookDepth, PriceLevel};
use crate::error::{ClientError, ClientResult};
use crate::fixed::FixedPoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub last_update_id: i64,
    pub bids: Vec<[FixedPoint; 2]>,
    pub asks: Vec<[FixedPoint; 2]>,
}

impl BookSnapshot {
    pub fn bid_levels(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids.iter().map(|[p, q]| PriceLevel::new(*p, *q))
    }

    pub fn ask_levels(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter().map(|[p, q]| PriceLevel::new(*p, *q))
    }

    /// Reject a book the server should never have sent.
    ///
    /// Every level needs a non-negative price and a positive quantity; bids must be
    /// strictly descending and asks strictly ascending, which also rules out repeated
    /// prices within a side.
    pub fn validate(&self) -> ClientResult<()> {
        if self.last_update_id < 0 {
            return Err(malformed(format!("negative lastUpdateId {}", self.last_update_id)));
        }
        check_side("bids", &self.bids, |prev, next| prev > next)?;
        check_side("asks", &self.asks, |prev, next| prev < next)
    }
}

fn malformed(reason: String) -> ClientError {
    ClientError::ServerProtocol(format!("malformed snapshot: {}", reason))
}

fn check_side<F>(side: &str, levels: &[[FixedPoint; 2]], ordered: F) -> ClientResult<()>
where
    F: Fn(FixedPoint, FixedPoint) -> bool,
{
    let mut previous: Option<FixedPoint> = None;
    for (idx, [price, quantity]) in levels.iter().enumerate() {
        if *price < FixedPoint::ZERO {
            return Err(malformed(format!("{}[{}] has negative price {}", side, idx, price)));
        }
        if !quantity.is_positive() {
            return Err(malformed(format!(
                "{}[{}] has non-positive quantity {}",
                side, idx, quantity
            )));
        }
        if let Some(prev) = previous {
            if !ordered(prev, *price) {
                return Err(malformed(format!(
                    "{}[{}] price {} out of order after {}",
                    side, idx, price, prev
                )));
            }
        }
        previous = Some(*price);
    }
    Ok(())
}

impl From<&BookDepth> for BookSnapshot {
    fn from(depth: &BookDepth) -> Self {
        BookSnapshot {
            last_update_id: depth.last_update_id,
            bids: depth.bids.iter().map(|l| [l.price, l.quantity]).collect(),
            asks: depth.asks.iter().map(|l| [l.price, l.quantity]).collect(),
        }
    }
}
