//! Reservation-derived price quotes.
//!
//! A quote wraps each allowed pair type's reservation bounds in a bid/ask
//! band. With `spread = 0` the band collapses to the reservation price
//! itself, which is what lets many CES mixtures find any trade at all.
//! Refreshing is idempotent: same utility + inventory in, same quote out.

use serde::{Deserialize, Serialize};

use crate::types::{ExchangeRegime, Inventory, Price, TradePair};
use crate::utility::Utility;

// === PRICE BAND ===

/// One pair type's quote: reservation bounds plus the spread-adjusted
/// ask (seller side) and bid (buyer side).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub p_min: Price,
    pub p_max: Price,
    pub ask: Price,
    pub bid: Price,
}

impl PriceBand {
    fn from_bounds(p_min: Price, p_max: Price, spread: f64) -> Self {
        Self {
            p_min,
            p_max,
            ask: p_min * (1.0 + spread),
            bid: p_max * (1.0 - spread),
        }
    }

    /// The saturation marker (`p_min = ∞`, `p_max = 0`): nothing can be
    /// quoted in this pair, downstream must hard-skip it.
    pub fn is_no_trade(&self) -> bool {
        self.p_min.is_infinite() && self.p_max == 0.0
    }
}

// === QUOTE ===

/// All price bands an agent currently quotes. Pair types outside the
/// exchange regime are absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub a_in_b: Option<PriceBand>,
    pub a_in_m: Option<PriceBand>,
    pub b_in_m: Option<PriceBand>,
}

impl Quote {
    /// Compute the full quote for an inventory under a regime.
    pub fn compute(
        utility: &Utility,
        inv: &Inventory,
        regime: ExchangeRegime,
        lambda: f64,
        spread: f64,
        eps: f64,
    ) -> Self {
        let mut quote = Quote::default();
        for &pair in TradePair::allowed(regime) {
            let (p_min, p_max) = match pair {
                TradePair::AInB => utility.reservation_bounds_a_in_b(inv.a, inv.b, eps),
                TradePair::AInM | TradePair::BInM => {
                    let (traded, _) = pair.goods();
                    utility.reservation_bounds_in_money(traded, inv.a, inv.b, lambda, eps)
                }
            };
            let band = PriceBand::from_bounds(p_min, p_max, spread);
            match pair {
                TradePair::AInB => quote.a_in_b = Some(band),
                TradePair::AInM => quote.a_in_m = Some(band),
                TradePair::BInM => quote.b_in_m = Some(band),
            }
        }
        quote
    }

    pub fn band(&self, pair: TradePair) -> Option<&PriceBand> {
        match pair {
            TradePair::AInB => self.a_in_b.as_ref(),
            TradePair::AInM => self.a_in_m.as_ref(),
            TradePair::BInM => self.b_in_m.as_ref(),
        }
    }
}
