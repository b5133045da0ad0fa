//! Pairwise surplus from quotes.
//!
//! The surplus of a prospective pair is the best bid/ask overlap across both
//! trade directions of every pair type the regime allows. It is a quote-level
//! estimate — bargaining later verifies an actual integer block exists.

use crate::agent::Agent;
use crate::types::{AgentId, ExchangeRegime, TradePair};

/// Best quoted overlap for an unordered pair, with the direction that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurplusQuote {
    pub surplus: f64,
    pub pair: TradePair,
    pub seller: AgentId,
    pub buyer: AgentId,
}

/// Tiebreaks, in order: larger surplus; lower-id buyer; canonical pair-type
/// order. Returns `None` when no direction overlaps at all.
pub fn compute_surplus(a: &Agent, b: &Agent, regime: ExchangeRegime) -> Option<SurplusQuote> {
    let mut best: Option<SurplusQuote> = None;
    for &pair in TradePair::allowed(regime) {
        // Lower-id buyer first so strict improvement keeps the tiebreak.
        let (first_buyer, first_seller) = if a.id < b.id { (a, b) } else { (b, a) };
        for (buyer, seller) in [(first_buyer, first_seller), (first_seller, first_buyer)] {
            let (Some(ask_band), Some(bid_band)) = (seller.quote.band(pair), buyer.quote.band(pair))
            else {
                continue;
            };
            if ask_band.is_no_trade() || bid_band.is_no_trade() {
                continue;
            }
            let surplus = bid_band.bid - ask_band.ask;
            if !surplus.is_finite() {
                continue;
            }
            if best.map_or(true, |cur| surplus > cur.surplus) {
                best = Some(SurplusQuote {
                    surplus,
                    pair,
                    seller: seller.id,
                    buyer: buyer.id,
                });
            }
        }
    }
    best
}
