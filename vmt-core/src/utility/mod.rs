//! The closed set of utility families.
//!
//! Each family prices trades through its marginal rate of substitution and
//! values inventories through `u`. The quoting path (`reservation_bounds_*`)
//! is allowed to ε-shift zero or subsistence-level inventories so the MRS
//! stays finite; the valuation path (`u`, `u_total`, `improves`) never is —
//! improvement tests always see raw integer inventories.
//!
//! Money is quasilinear: `u_total = u(A, B) + λ·M`.

pub mod quote;

use serde::{Deserialize, Serialize};

use crate::types::{Good, Inventory, InventoryDelta, Price};

/// Floor applied to log arguments and denominators so every family stays
/// finite on the whole non-negative integer lattice.
const LOG_FLOOR: f64 = 1e-12;

/// Floor for translog factor elasticities; keeps quoted prices strictly
/// positive as required for that family.
const ELASTICITY_FLOOR: f64 = 1e-9;

/// Cap on log-space exponents before `exp`, safely inside f64 range.
const EXP_CAP: f64 = 700.0;

// === FAMILIES ===

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Utility {
    /// Constant elasticity of substitution; `rho = 0` is the Cobb-Douglas
    /// limit. `rho = 1` (perfect substitutes) is excluded by validation.
    Ces { rho: f64, w_a: f64, w_b: f64 },
    /// Perfect substitutes with fixed values per unit.
    Linear { v_a: f64, v_b: f64 },
    /// Bliss-point quadratic with cross-term `gamma`. Saturates: beyond the
    /// bliss point marginal utilities go negative and quoting reports
    /// "no trade feasible".
    Quadratic {
        a_star: f64,
        b_star: f64,
        sigma_a: f64,
        sigma_b: f64,
        gamma: f64,
    },
    /// Second-order flexible form in logs; symmetric `beta` matrix.
    Translog {
        alpha_0: f64,
        alpha_a: f64,
        alpha_b: f64,
        beta_aa: f64,
        beta_bb: f64,
        beta_ab: f64,
    },
    /// Log utility over holdings above subsistence `(gamma_a, gamma_b)`.
    StoneGeary {
        gamma_a: f64,
        gamma_b: f64,
        alpha_a: f64,
        alpha_b: f64,
    },
}

impl Utility {
    pub fn family_name(&self) -> &'static str {
        match self {
            Utility::Ces { .. } => "ces",
            Utility::Linear { .. } => "linear",
            Utility::Quadratic { .. } => "quadratic",
            Utility::Translog { .. } => "translog",
            Utility::StoneGeary { .. } => "stone_geary",
        }
    }

    // === VALUATION ===

    /// Utility of an integer goods bundle. Finite for every `(A, B)` on the
    /// non-negative lattice, for every family.
    pub fn u(&self, a: u64, b: u64) -> f64 {
        let (af, bf) = (a as f64, b as f64);
        match *self {
            Utility::Ces { rho, w_a, w_b } => ces_u(rho, w_a, w_b, af, bf),
            Utility::Linear { v_a, v_b } => v_a * af + v_b * bf,
            Utility::Quadratic {
                a_star,
                b_star,
                sigma_a,
                sigma_b,
                gamma,
            } => {
                let da = af - a_star;
                let db = bf - b_star;
                -0.5 * sigma_a * da * da - 0.5 * sigma_b * db * db - gamma * da * db
            }
            Utility::Translog { .. } => {
                let ln_u = self.translog_ln_u(af.max(LOG_FLOOR), bf.max(LOG_FLOOR));
                ln_u.clamp(-EXP_CAP, EXP_CAP).exp()
            }
            Utility::StoneGeary {
                gamma_a,
                gamma_b,
                alpha_a,
                alpha_b,
            } => {
                // Surplus clamped at a tiny positive value: u stays finite
                // (hugely negative) at or below subsistence.
                alpha_a * (af - gamma_a).max(LOG_FLOOR).ln()
                    + alpha_b * (bf - gamma_b).max(LOG_FLOOR).ln()
            }
        }
    }

    /// Quasilinear total utility over a full inventory.
    pub fn u_total(&self, inv: &Inventory, lambda: f64) -> f64 {
        self.u(inv.a, inv.b) + lambda * inv.m as f64
    }

    /// Strict improvement test: does applying `delta` raise `u_total` by more
    /// than `eps_u`? Infeasible deltas (negative result) never improve.
    ///
    /// Raw inventories throughout — the quoting ε-shift must not leak in here.
    pub fn improves(&self, inv: &Inventory, delta: InventoryDelta, lambda: f64, eps_u: f64) -> bool {
        match inv.applied(delta) {
            Some(after) => self.u_total(&after, lambda) > self.u_total(inv, lambda) + eps_u,
            None => false,
        }
    }

    // === MARGINAL UTILITY ===

    /// Marginal utilities `(mu_A, mu_B)` at a real-valued bundle. May be
    /// infinite at zero holdings for CES/Stone-Geary; callers on the quoting
    /// path shift their arguments first.
    pub fn mu(&self, af: f64, bf: f64) -> (f64, f64) {
        match *self {
            Utility::Ces { rho, w_a, w_b } => ces_mu(rho, w_a, w_b, af, bf),
            Utility::Linear { v_a, v_b } => (v_a, v_b),
            Utility::Quadratic {
                a_star,
                b_star,
                sigma_a,
                sigma_b,
                gamma,
            } => {
                let da = af - a_star;
                let db = bf - b_star;
                (-sigma_a * da - gamma * db, -sigma_b * db - gamma * da)
            }
            Utility::Translog { .. } => {
                let (af, bf) = (af.max(LOG_FLOOR), bf.max(LOG_FLOOR));
                let u = self.translog_ln_u(af, bf).clamp(-EXP_CAP, EXP_CAP).exp();
                let (ea, eb) = self.translog_elasticities(af, bf);
                (u * ea / af, u * eb / bf)
            }
            Utility::StoneGeary {
                gamma_a,
                gamma_b,
                alpha_a,
                alpha_b,
            } => (
                alpha_a / (af - gamma_a).max(LOG_FLOOR),
                alpha_b / (bf - gamma_b).max(LOG_FLOOR),
            ),
        }
    }

    // === RESERVATION BOUNDS ===

    /// Reservation price bounds for A priced in B.
    ///
    /// Returns `(p_min, p_max)` with `p_min <= p_max`, finite except for the
    /// quadratic saturation marker `(∞, 0)` which downstream treats as a hard
    /// skip. The ε-shift applies only here, never to `u`.
    pub fn reservation_bounds_a_in_b(&self, a: u64, b: u64, eps: f64) -> (Price, Price) {
        match *self {
            Utility::Linear { v_a, v_b } => {
                let p = v_a / v_b;
                (p, p)
            }
            Utility::Quadratic { .. } => {
                let (mu_a, mu_b) = self.mu(a as f64, b as f64);
                if mu_a <= 0.0 && mu_b <= 0.0 {
                    // At or beyond bliss in both goods: no trade feasible.
                    return (f64::INFINITY, 0.0);
                }
                let p = mu_a.max(0.0) / mu_b.max(eps);
                (p, p)
            }
            Utility::Translog { .. } => {
                let af = (a as f64).max(eps);
                let bf = (b as f64).max(eps);
                let (ea, eb) = self.translog_elasticities(af, bf);
                // Log-space MRS keeps the ratio finite under extreme holdings.
                let ln_mrs = ea.max(ELASTICITY_FLOOR).ln() - eb.max(ELASTICITY_FLOOR).ln()
                    + bf.ln()
                    - af.ln();
                let p = ln_mrs.clamp(-EXP_CAP, EXP_CAP).exp();
                (p, p)
            }
            Utility::Ces { .. } => {
                let (af, bf) = shift_if_zero(a, b, eps);
                let (mu_a, mu_b) = self.mu(af, bf);
                let p = mu_a / mu_b.max(LOG_FLOOR);
                (p, p)
            }
            Utility::StoneGeary {
                gamma_a,
                gamma_b,
                alpha_a,
                alpha_b,
            } => {
                let (af, bf) = shift_if_zero(a, b, eps);
                // The shift also guards the subsistence boundary itself.
                let p = (alpha_a * (bf - gamma_b).max(eps)) / (alpha_b * (af - gamma_a).max(eps));
                (p, p)
            }
        }
    }

    /// Reservation price bounds for `good` priced in money, under the
    /// quasilinear model: `mu_good / λ`.
    pub fn reservation_bounds_in_money(
        &self,
        good: Good,
        a: u64,
        b: u64,
        lambda: f64,
        eps: f64,
    ) -> (Price, Price) {
        debug_assert!(good != Good::Money);
        let (af, bf) = shift_if_zero(a, b, eps);
        let (mu_a, mu_b) = self.mu(af, bf);
        let mu = match good {
            Good::A => mu_a,
            _ => mu_b,
        };
        let p = mu.max(0.0) / lambda;
        (p, p)
    }

    // === TRANSLOG INTERNALS ===

    fn translog_ln_u(&self, af: f64, bf: f64) -> f64 {
        let Utility::Translog {
            alpha_0,
            alpha_a,
            alpha_b,
            beta_aa,
            beta_bb,
            beta_ab,
        } = *self
        else {
            unreachable!("translog_ln_u on non-translog family");
        };
        let la = af.ln();
        let lb = bf.ln();
        alpha_0
            + alpha_a * la
            + alpha_b * lb
            + 0.5 * beta_aa * la * la
            + 0.5 * beta_bb * lb * lb
            + beta_ab * la * lb
    }

    fn translog_elasticities(&self, af: f64, bf: f64) -> (f64, f64) {
        let Utility::Translog {
            alpha_a,
            alpha_b,
            beta_aa,
            beta_bb,
            beta_ab,
            ..
        } = *self
        else {
            unreachable!("translog_elasticities on non-translog family");
        };
        let la = af.ln();
        let lb = bf.ln();
        (
            alpha_a + beta_aa * la + beta_ab * lb,
            alpha_b + beta_bb * lb + beta_ab * la,
        )
    }
}

/// The zero-inventory ε-shift: both coordinates move together so the shift
/// is symmetric across agents.
fn shift_if_zero(a: u64, b: u64, eps: f64) -> (f64, f64) {
    if a == 0 || b == 0 {
        (a as f64 + eps, b as f64 + eps)
    } else {
        (a as f64, b as f64)
    }
}

// === CES MATH ===

fn ces_u(rho: f64, w_a: f64, w_b: f64, af: f64, bf: f64) -> f64 {
    if rho.abs() < 1e-12 {
        // Cobb-Douglas limit.
        return af.powf(w_a) * bf.powf(w_b);
    }
    let inner = w_a * af.powf(rho) + w_b * bf.powf(rho);
    // rho < 0 with a zero holding: inner is +inf, inf^(1/rho) -> 0.
    inner.powf(1.0 / rho)
}

fn ces_mu(rho: f64, w_a: f64, w_b: f64, af: f64, bf: f64) -> (f64, f64) {
    if rho.abs() < 1e-12 {
        let u = af.powf(w_a) * bf.powf(w_b);
        return (w_a * u / af, w_b * u / bf);
    }
    let inner = w_a * af.powf(rho) + w_b * bf.powf(rho);
    let outer = inner.powf(1.0 / rho - 1.0);
    (
        w_a * af.powf(rho - 1.0) * outer,
        w_b * bf.powf(rho - 1.0) * outer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn cobb_douglas() -> Utility {
        Utility::Ces {
            rho: 0.0,
            w_a: 0.5,
            w_b: 0.5,
        }
    }

    #[test]
    fn cobb_douglas_mrs_is_ratio_of_holdings() {
        let u = cobb_douglas();
        let (lo, hi) = u.reservation_bounds_a_in_b(2, 8, EPS);
        assert!((lo - 4.0).abs() < 1e-9, "MRS should be (wA/wB)*(B/A) = 4, got {lo}");
        assert_eq!(lo, hi);
    }

    #[test]
    fn ces_zero_inventory_bounds_are_finite() {
        for rho in [-2.0, -0.5, 0.0, 0.5] {
            let u = Utility::Ces {
                rho,
                w_a: 0.5,
                w_b: 0.5,
            };
            let (lo, hi) = u.reservation_bounds_a_in_b(0, 0, EPS);
            assert!(lo.is_finite() && hi.is_finite(), "rho={rho}: bounds ({lo}, {hi})");
            assert!(lo <= hi);
            assert!(u.u(0, 0).is_finite());
        }
    }

    #[test]
    fn ces_mrs_is_monotone_in_rho() {
        // At (2, 8) the MRS is (B/A)^(1-rho) = 4^(1-rho): strictly
        // decreasing in rho. Complements price scarce goods more steeply
        // than substitutes.
        let mut last = f64::INFINITY;
        for rho in [-2.0, -1.0, -0.5, 0.0, 0.5] {
            let u = Utility::Ces {
                rho,
                w_a: 0.5,
                w_b: 0.5,
            };
            let (p, _) = u.reservation_bounds_a_in_b(2, 8, EPS);
            assert!(p.is_finite() && p > 0.0);
            assert!(p < last, "rho={rho}: expected {p} < {last}");
            last = p;
        }
    }

    #[test]
    fn quoting_and_improvement_agree_at_the_margin() {
        // Selling one A above the reservation price improves; paying more
        // than the reservation price to buy does not.
        let u = cobb_douglas();
        let inv = Inventory::new(8, 2);
        let (mrs, _) = u.reservation_bounds_a_in_b(8, 2, EPS);
        assert!((mrs - 0.25).abs() < 1e-12);
        // Sell 1 A for 1 B: price 1 > 0.25.
        assert!(u.improves(&inv, InventoryDelta::new(-1, 1, 0), 0.0, 1e-12));
        // Buy 1 A for 2 B: price 2 > 0.25, far above what A is worth here.
        assert!(!u.improves(&inv, InventoryDelta::new(1, -2, 0), 0.0, 1e-12));
    }

    #[test]
    fn ces_acceptance_insensitive_to_eps_away_from_zero() {
        // With positive holdings the shift never fires, so any eps in
        // (0, 1e-6] quotes identically.
        let u = cobb_douglas();
        let base = u.reservation_bounds_a_in_b(3, 7, 1e-12);
        for eps in [1e-12, 1e-9, 1e-6] {
            assert_eq!(u.reservation_bounds_a_in_b(3, 7, eps), base);
        }
    }

    #[test]
    fn linear_bounds_are_value_ratio() {
        let u = Utility::Linear { v_a: 3.0, v_b: 2.0 };
        assert_eq!(u.reservation_bounds_a_in_b(0, 0, EPS), (1.5, 1.5));
        assert_eq!(u.u(2, 3), 12.0);
    }

    #[test]
    fn quadratic_at_bliss_reports_no_trade() {
        let u = Utility::Quadratic {
            a_star: 5.0,
            b_star: 5.0,
            sigma_a: 1.0,
            sigma_b: 1.0,
            gamma: 0.0,
        };
        let (lo, hi) = u.reservation_bounds_a_in_b(5, 5, EPS);
        assert!(lo.is_infinite() && hi == 0.0, "bliss point must hard-skip, got ({lo}, {hi})");
        // Below bliss, quoting works normally.
        let (lo, hi) = u.reservation_bounds_a_in_b(2, 4, EPS);
        assert!(lo.is_finite() && lo > 0.0);
        assert_eq!(lo, hi);
    }

    #[test]
    fn translog_bounds_strictly_positive_and_finite() {
        let u = Utility::Translog {
            alpha_0: 0.0,
            alpha_a: 0.6,
            alpha_b: 0.4,
            beta_aa: -0.05,
            beta_bb: -0.05,
            beta_ab: 0.02,
        };
        for (a, b) in [(0, 0), (1, 1), (1000, 1), (1, 1000)] {
            let (lo, hi) = u.reservation_bounds_a_in_b(a, b, EPS);
            assert!(lo > 0.0 && lo.is_finite(), "({a},{b}): p_min = {lo}");
            assert!(hi > 0.0 && hi.is_finite(), "({a},{b}): p_max = {hi}");
        }
        assert!(u.u(0, 0).is_finite());
    }

    #[test]
    fn stone_geary_near_subsistence_quotes_large_finite_mrs() {
        let u = Utility::StoneGeary {
            gamma_a: 3.0,
            gamma_b: 2.0,
            alpha_a: 0.5,
            alpha_b: 0.5,
        };
        // A = gamma_a + 1: giving up A is nearly unbearable, so the price of
        // A in B is large but finite.
        let (lo, hi) = u.reservation_bounds_a_in_b(4, 20, EPS);
        assert!(lo.is_finite() && lo > 1.0, "expected large finite MRS, got {lo}");
        assert_eq!(lo, hi);
        assert!(u.u(3, 2).is_finite(), "u at subsistence must stay finite");
    }

    #[test]
    fn improvement_test_uses_raw_inventories() {
        let u = cobb_douglas();
        let inv = Inventory::new(8, 2);
        // Trading 1 A for 1 B moves toward balance: strictly improving.
        assert!(u.improves(&inv, InventoryDelta::new(-1, 1, 0), 0.0, 1e-12));
        // Giving A away for nothing is not.
        assert!(!u.improves(&inv, InventoryDelta::new(-1, 0, 0), 0.0, 1e-12));
        // Infeasible deltas never improve.
        assert!(!u.improves(&inv, InventoryDelta::new(-9, 5, 0), 0.0, 1e-12));
    }

    #[test]
    fn quasilinear_money_adds_linearly() {
        let u = cobb_douglas();
        let inv = Inventory::with_money(4, 4, 10);
        let lambda = 0.5;
        assert!((u.u_total(&inv, lambda) - (u.u(4, 4) + 5.0)).abs() < 1e-12);
        let (lo, hi) = u.reservation_bounds_in_money(Good::A, 4, 4, lambda, EPS);
        assert_eq!(lo, hi);
        assert!(lo > 0.0);
    }
}
