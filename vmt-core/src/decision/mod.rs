//! Decision phase protocols: three-pass matching and forage target search.
//!
//! Matching runs first and owns everything trade-shaped; the search protocol
//! then fills in forage targets (or idle) for agents the matcher left
//! undecided. Both write their conclusions into the per-agent scratch so the
//! scheduler can emit decision and preference telemetry afterwards.

pub mod surplus;

use std::collections::HashSet;

use crate::agent::{DecisionOutcome, PreferenceEntry, Target};
use crate::events::{PairReason, TargetType};
use crate::protocols::{Effect, MatchingProtocol, ProtocolContext, SearchProtocol, WorldView};
use crate::types::{AgentId, Good, InventoryDelta, Position};

pub use surplus::{SurplusQuote, compute_surplus};

// === THREE-PASS MATCHING ===

/// Pass 1 builds each unpaired agent's ranked preference list and targets
/// its head; pass 2 pairs mutual first choices; pass 3 greedily pairs the
/// remaining candidates by descending discounted surplus, using the pass-1
/// snapshots without recomputation.
pub struct ThreePassMatching;

impl MatchingProtocol for ThreePassMatching {
    fn name(&self) -> &'static str {
        "three_pass_matching"
    }

    fn run(&self, view: &WorldView<'_>, ctx: &mut ProtocolContext<'_>) -> Vec<Effect> {
        let world = view.world;
        let n = world.len();
        let mut effects = Vec::new();
        let mut head_target: Vec<Option<AgentId>> = vec![None; n];

        // === PASS 1: preference build (ascending id) ===
        for i in 0..n {
            let agent = &world.agents()[i];
            if let Some(partner) = agent.paired_with {
                // Lock onto the partner; validate reciprocity defensively.
                if world.agent(partner).paired_with != Some(agent.id) {
                    tracing::warn!(
                        tick = view.tick,
                        agent = agent.id.0,
                        partner = partner.0,
                        "asymmetric pairing found in matching, unpairing"
                    );
                    effects.push(Effect::Unpair {
                        a: agent.id,
                        b: partner,
                        reason: PairReason::Integrity,
                        cooldown: false,
                    });
                    continue;
                }
                effects.push(Effect::SetTarget {
                    agent: agent.id,
                    target: Some(Target::Agent(partner)),
                });
                ctx.scratch[i].decision = Some(DecisionOutcome {
                    target_type: TargetType::TradePaired,
                    partner: Some(partner),
                    expected_surplus: None,
                    target_pos: Some(world.agent(partner).pos),
                });
                continue;
            }
            if !view.mode.allows_trade() {
                continue;
            }

            let mut prefs: Vec<PreferenceEntry> = Vec::new();
            for neighbor in &ctx.scratch[i].neighbors {
                let other = world.agent(neighbor.id);
                let Some(sq) = compute_surplus(agent, other, ctx.regime) else {
                    continue;
                };
                if sq.surplus <= 0.0 {
                    continue;
                }
                prefs.push(PreferenceEntry {
                    partner: neighbor.id,
                    surplus: sq.surplus,
                    discounted: sq.surplus * ctx.params.beta.powi(neighbor.dist as i32),
                    dist: neighbor.dist,
                });
            }
            sort_preferences(&mut prefs);
            if let Some(head) = prefs.first() {
                head_target[i] = Some(head.partner);
                effects.push(Effect::SetTarget {
                    agent: agent.id,
                    target: Some(Target::Agent(head.partner)),
                });
                ctx.scratch[i].decision = Some(DecisionOutcome {
                    target_type: TargetType::Trade,
                    partner: Some(head.partner),
                    expected_surplus: Some(head.discounted),
                    target_pos: Some(world.agent(head.partner).pos),
                });
            }
            ctx.scratch[i].preferences = prefs;
        }

        effects.extend(pair_passes(view, ctx, &head_target));
        effects
    }
}

/// Descending discounted score, lower partner id on ties.
pub(crate) fn sort_preferences(prefs: &mut [PreferenceEntry]) {
    prefs.sort_by(|x, y| {
        y.discounted
            .partial_cmp(&x.discounted)
            .unwrap()
            .then(x.partner.cmp(&y.partner))
    });
}

/// Passes 2 and 3 over already-built preference lists.
///
/// `head_target[i]` is agent `i`'s pass-1 first choice. Pass 3 consumes the
/// preference snapshots exactly as pass 1 left them; nothing is recomputed
/// after assignments (required for reproducibility).
pub(crate) fn pair_passes(
    view: &WorldView<'_>,
    ctx: &mut ProtocolContext<'_>,
    head_target: &[Option<AgentId>],
) -> Vec<Effect> {
    let world = view.world;
    let n = world.len();
    let mut effects = Vec::new();
    let mut newly_paired = vec![false; n];

    // === PASS 2: mutual consent (ascending id, each pair once) ===
    for i in 0..n {
        let agent = &world.agents()[i];
        if agent.is_paired() || newly_paired[i] {
            continue;
        }
        let Some(target) = head_target[i] else { continue };
        if agent.id >= target {
            continue;
        }
        let j = world.index_of(target);
        if world.agents()[j].is_paired() || newly_paired[j] {
            continue;
        }
        if head_target[j] != Some(agent.id) {
            continue;
        }
        newly_paired[i] = true;
        newly_paired[j] = true;
        let surplus = own_discounted(&ctx.scratch[i].preferences, target);
        effects.push(Effect::Pair {
            a: agent.id,
            b: target,
            reason: PairReason::MutualConsent,
            surplus,
        });
        let (pos_i, pos_j) = (world.agents()[i].pos, world.agents()[j].pos);
        upgrade_to_pair(ctx, i, target, surplus, pos_j);
        let surplus_j = own_discounted(&ctx.scratch[j].preferences, agent.id);
        upgrade_to_pair(ctx, j, agent.id, surplus_j, pos_i);
    }

    // === PASS 3: surplus-greedy fallback over pass-1 snapshots ===
    let mut candidates: Vec<(f64, AgentId, AgentId)> = Vec::new();
    for i in 0..n {
        if world.agents()[i].is_paired() || newly_paired[i] {
            continue;
        }
        let owner = world.agents()[i].id;
        for pref in &ctx.scratch[i].preferences {
            let j = world.index_of(pref.partner);
            if world.agents()[j].is_paired() || newly_paired[j] {
                continue;
            }
            candidates.push((pref.discounted, owner, pref.partner));
        }
    }
    candidates.sort_by(|x, y| {
        y.0.partial_cmp(&x.0)
            .unwrap()
            .then(x.1.cmp(&y.1))
            .then(x.2.cmp(&y.2))
    });
    for (discounted, a, b) in candidates {
        let (i, j) = (world.index_of(a), world.index_of(b));
        if newly_paired[i] || newly_paired[j] {
            continue;
        }
        newly_paired[i] = true;
        newly_paired[j] = true;
        effects.push(Effect::Pair {
            a,
            b,
            reason: PairReason::GreedyFallback,
            surplus: Some(discounted),
        });
        // Retarget both onto each other; b may have chased someone else.
        effects.push(Effect::SetTarget {
            agent: a,
            target: Some(Target::Agent(b)),
        });
        effects.push(Effect::SetTarget {
            agent: b,
            target: Some(Target::Agent(a)),
        });
        upgrade_to_pair(ctx, i, b, Some(discounted), world.agents()[j].pos);
        upgrade_to_pair(ctx, j, a, Some(discounted), world.agents()[i].pos);
    }

    effects
}

fn own_discounted(prefs: &[PreferenceEntry], partner: AgentId) -> Option<f64> {
    prefs
        .iter()
        .find(|p| p.partner == partner)
        .map(|p| p.discounted)
}

fn upgrade_to_pair(
    ctx: &mut ProtocolContext<'_>,
    index: usize,
    partner: AgentId,
    surplus: Option<f64>,
    partner_pos: Position,
) {
    ctx.scratch[index].decision = Some(DecisionOutcome {
        target_type: TargetType::TradeNewPair,
        partner: Some(partner),
        expected_surplus: surplus,
        target_pos: Some(partner_pos),
    });
}

// === FORAGE TARGET SEARCH ===

/// Distance-discounted forage targeting: among visible, claimable,
/// non-empty cells, pick the one maximizing the utility gain of one
/// harvest, discounted by `beta^distance`.
pub struct DistanceDiscountedSearch;

impl SearchProtocol for DistanceDiscountedSearch {
    fn name(&self) -> &'static str {
        "distance_discounted_search"
    }

    fn run(&self, view: &WorldView<'_>, ctx: &mut ProtocolContext<'_>) -> Vec<Effect> {
        let world = view.world;
        let mut effects = Vec::new();
        // Cells claimed earlier in this pass: perception snapshots predate
        // the pass, so later agents must not re-pick them.
        let mut claimed_now: HashSet<Position> = HashSet::new();
        for i in 0..world.len() {
            let agent = &world.agents()[i];
            if agent.is_paired() || ctx.scratch[i].decision.is_some() {
                continue;
            }
            let chosen = if view.mode.allows_forage() && ctx.params.forage_rate > 0 {
                best_cell(ctx, i, agent, &claimed_now)
            } else {
                None
            };
            match chosen {
                Some(pos) => {
                    if let Some(old) = agent.claimed_cell {
                        if old != pos {
                            effects.push(Effect::ReleaseClaim {
                                agent: agent.id,
                                cell: old,
                            });
                        }
                    }
                    if ctx.params.enable_resource_claiming {
                        claimed_now.insert(pos);
                        if agent.claimed_cell != Some(pos) {
                            effects.push(Effect::ClaimResource {
                                agent: agent.id,
                                cell: pos,
                            });
                        }
                    }
                    effects.push(Effect::SetTarget {
                        agent: agent.id,
                        target: Some(Target::Cell(pos)),
                    });
                    ctx.scratch[i].decision = Some(DecisionOutcome {
                        target_type: TargetType::Forage,
                        partner: None,
                        expected_surplus: None,
                        target_pos: Some(pos),
                    });
                }
                None => {
                    ctx.scratch[i].decision = Some(DecisionOutcome {
                        target_type: TargetType::Idle,
                        partner: None,
                        expected_surplus: None,
                        target_pos: None,
                    });
                }
            }
        }
        effects
    }
}

fn best_cell(
    ctx: &ProtocolContext<'_>,
    index: usize,
    agent: &crate::agent::Agent,
    claimed_now: &HashSet<Position>,
) -> Option<Position> {
    struct Candidate {
        score: f64,
        dist: u32,
        good: Good,
        pos: Position,
    }
    let mut best: Option<Candidate> = None;
    for cell in &ctx.scratch[index].visible_cells {
        if ctx.params.enable_resource_claiming
            && (!cell_claimable(cell.claimant, agent.id) || claimed_now.contains(&cell.pos))
        {
            continue;
        }
        let harvest = cell.amount.min(ctx.params.forage_rate);
        let after = agent
            .inventory
            .applied(InventoryDelta::gain(cell.good, harvest))
            .expect("harvest gain is always feasible");
        let du = agent.utility.u_total(&after, agent.lambda) - agent.u_total();
        if du <= 0.0 {
            continue;
        }
        let candidate = Candidate {
            score: du * ctx.params.beta.powi(cell.dist as i32),
            dist: cell.dist,
            good: cell.good,
            pos: cell.pos,
        };
        let better = match &best {
            None => true,
            // score desc, then dist asc, A before B, lowest (x, y).
            Some(cur) => {
                candidate.score > cur.score
                    || (candidate.score == cur.score
                        && (candidate.dist, candidate.good, candidate.pos)
                            < (cur.dist, cur.good, cur.pos))
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best.map(|c| c.pos)
}

fn cell_claimable(claimant: Option<AgentId>, agent: AgentId) -> bool {
    claimant.is_none() || claimant == Some(agent)
}
