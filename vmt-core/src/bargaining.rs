//! Compensating-block bargaining.
//!
//! For one paired, adjacent pair the protocol searches the integer lattice
//! for the first block `(Δq, Δpay)` at a price inside the quoted `[ask, bid]`
//! window that strictly improves *both* agents' total utility, evaluated on
//! raw inventories. Directions (who sells which good) are tried best quoted
//! overlap first; if every direction exhausts, the pair splits with a mutual
//! cooldown.
//!
//! The candidate enumeration is fully deterministic: for each block size the
//! seller's edge comes first, then the prices that snap the payment to each
//! reachable integer (ascending), then the midpoint and the buyer's edge.

use crate::agent::Agent;
use crate::events::PairReason;
use crate::protocols::{
    BargainingProtocol, Effect, ProtocolContext, TradeTuple, WorldView,
};
use crate::types::{AgentId, Inventory, InventoryDelta, Price, TradePair};
use crate::utility::Utility;

pub struct CompensatingBlock;

struct Direction {
    seller: AgentId,
    buyer: AgentId,
    pair: TradePair,
    ask: Price,
    bid: Price,
    overlap: f64,
}

impl BargainingProtocol for CompensatingBlock {
    fn name(&self) -> &'static str {
        "compensating_block"
    }

    fn bargain(
        &self,
        view: &WorldView<'_>,
        a: AgentId,
        b: AgentId,
        ctx: &mut ProtocolContext<'_>,
    ) -> Vec<Effect> {
        let world = view.world;
        let eps = ctx.params.epsilon;
        let agent_a = world.agent(a);
        let agent_b = world.agent(b);

        let mut directions: Vec<Direction> = Vec::new();
        for &pair in TradePair::allowed(ctx.regime) {
            // Lower-id buyer enumerated first so the stable sort keeps the
            // directional tiebreak.
            let (first_buyer, first_seller) = if a < b {
                (agent_a, agent_b)
            } else {
                (agent_b, agent_a)
            };
            for (buyer, seller) in [(first_buyer, first_seller), (first_seller, first_buyer)] {
                let (Some(ask_band), Some(bid_band)) =
                    (seller.quote.band(pair), buyer.quote.band(pair))
                else {
                    continue;
                };
                if ask_band.is_no_trade() || bid_band.is_no_trade() {
                    continue;
                }
                let (ask, bid) = (ask_band.ask, bid_band.bid);
                if !(bid - ask).is_finite() || bid <= ask + eps {
                    continue;
                }
                directions.push(Direction {
                    seller: seller.id,
                    buyer: buyer.id,
                    pair,
                    ask,
                    bid,
                    overlap: bid - ask,
                });
            }
        }
        // Larger overlap first; on ties the lower-id buyer, then the
        // canonical pair-type order (the sort is stable).
        directions.sort_by(|x, y| {
            y.overlap
                .partial_cmp(&x.overlap)
                .unwrap()
                .then(x.buyer.cmp(&y.buyer))
        });

        for dir in &directions {
            let seller = world.agent(dir.seller);
            let buyer = world.agent(dir.buyer);
            if let Some(tuple) = search_block(dir, seller, buyer, ctx) {
                return vec![Effect::Trade(tuple)];
            }
        }
        vec![Effect::Unpair {
            a,
            b,
            reason: PairReason::TradeFailed,
            cooldown: true,
        }]
    }
}

/// Round-half-up on the integer payment. `floor(x + 0.5)` is the same IEEE
/// operation everywhere; `round()`'s tie handling is not relied upon.
fn round_half_up(x: f64) -> u64 {
    (x + 0.5).floor() as u64
}

fn search_block(
    dir: &Direction,
    seller: &Agent,
    buyer: &Agent,
    ctx: &ProtocolContext<'_>,
) -> Option<TradeTuple> {
    let eps = ctx.params.epsilon;
    let (traded, payment) = dir.pair.goods();
    let qty_cap = ctx.params.delta_a_max.min(seller.inventory.get(traded));
    let pay_cap = buyer.inventory.get(payment);
    let midpoint = 0.5 * (dir.ask + dir.bid);

    for qty in 1..=qty_cap {
        let qf = qty as f64;
        // The seller's edge first, then the prices that snap the payment to
        // each reachable integer in-window (ascending), then midpoint and
        // the buyer's edge. Ascending integer prices keep mirror-image
        // endowments on a symmetric path to the split both sides prefer.
        let mut candidates: Vec<Price> = vec![dir.ask];
        let k_lo = (dir.ask * qf).ceil().max(1.0) as u64;
        let k_hi = ((dir.bid * qf).floor() as u64).min(pay_cap);
        for k in k_lo..=k_hi {
            candidates.push(k as f64 / qf);
        }
        candidates.push(midpoint);
        candidates.push(dir.bid);

        for &price in &candidates {
            let pay = round_half_up(price * qf);
            if pay > pay_cap {
                continue;
            }
            let seller_delta = InventoryDelta::seller_side(dir.pair, qty, pay);
            let buyer_delta = seller_delta.negated();
            let Some(s_gain) = gain(&seller.utility, &seller.inventory, seller_delta, seller.lambda)
            else {
                continue;
            };
            let Some(b_gain) = gain(&buyer.utility, &buyer.inventory, buyer_delta, buyer.lambda)
            else {
                continue;
            };
            if s_gain > eps && b_gain > eps {
                return Some(TradeTuple {
                    buyer: buyer.id,
                    seller: seller.id,
                    pair: dir.pair,
                    qty,
                    pay,
                    price,
                    surplus_buyer: b_gain,
                    surplus_seller: s_gain,
                });
            }
        }
    }
    None
}

/// Utility change from applying `delta`, or `None` when infeasible.
fn gain(utility: &Utility, inv: &Inventory, delta: InventoryDelta, lambda: f64) -> Option<f64> {
    let after = inv.applied(delta)?;
    Some(utility.u_total(&after, lambda) - utility.u_total(inv, lambda))
}
