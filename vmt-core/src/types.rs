use std::fmt;

use serde::{Deserialize, Serialize};

// === TYPE ALIASES ===

pub type Tick = u64;
pub type Price = f64;

// === NEWTYPE IDS ===

/// Stable agent identifier, assigned at tick 0 and never reused.
/// Ordering on the inner integer is the primary deterministic tiebreak.
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// === POSITION ===

/// Integer cell on the finite `[0,N) × [0,N)` grid. No wraparound.
///
/// Derived ordering (x, then y) is the canonical deterministic order for
/// anything iterated by position.
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// === GOODS ===

/// The tradeable commodities. `Money` exists only under the money-enabled
/// exchange regimes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Good {
    A,
    B,
    Money,
}

impl fmt::Display for Good {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Good::A => "A",
            Good::B => "B",
            Good::Money => "M",
        };
        write!(f, "{s}")
    }
}

// === EXCHANGE REGIME ===

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeRegime {
    #[default]
    BarterOnly,
    MoneyOnly,
    Mixed,
}

impl ExchangeRegime {
    pub fn money_enabled(&self) -> bool {
        !matches!(self, ExchangeRegime::BarterOnly)
    }
}

// === TRADE PAIRS ===

/// Ordered price pair: the good being priced, in units of the good paid.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradePair {
    AInB,
    AInM,
    BInM,
}

impl TradePair {
    /// (traded good, payment good)
    pub fn goods(&self) -> (Good, Good) {
        match self {
            TradePair::AInB => (Good::A, Good::B),
            TradePair::AInM => (Good::A, Good::Money),
            TradePair::BInM => (Good::B, Good::Money),
        }
    }

    /// Pair types evaluated under a regime, in canonical order.
    pub fn allowed(regime: ExchangeRegime) -> &'static [TradePair] {
        match regime {
            ExchangeRegime::BarterOnly => &[TradePair::AInB],
            ExchangeRegime::MoneyOnly => &[TradePair::AInM, TradePair::BInM],
            ExchangeRegime::Mixed => &[TradePair::AInB, TradePair::AInM, TradePair::BInM],
        }
    }
}

impl fmt::Display for TradePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradePair::AInB => "A-B",
            TradePair::AInM => "A-M",
            TradePair::BInM => "B-M",
        };
        write!(f, "{s}")
    }
}

// === MODE ===

/// Which activities the current tick permits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Forage,
    Trade,
    Both,
}

impl Mode {
    pub fn allows_trade(&self) -> bool {
        matches!(self, Mode::Trade | Mode::Both)
    }

    pub fn allows_forage(&self) -> bool {
        matches!(self, Mode::Forage | Mode::Both)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Forage => "forage",
            Mode::Trade => "trade",
            Mode::Both => "both",
        };
        write!(f, "{s}")
    }
}

// === INVENTORY ===

/// Integer holdings of the goods. Amounts are unsigned; all mutation goes
/// through signed `InventoryDelta`s so feasibility can be checked up front.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub a: u64,
    pub b: u64,
    #[serde(default)]
    pub m: u64,
}

impl Inventory {
    pub fn new(a: u64, b: u64) -> Self {
        Self { a, b, m: 0 }
    }

    pub fn with_money(a: u64, b: u64, m: u64) -> Self {
        Self { a, b, m }
    }

    pub fn get(&self, good: Good) -> u64 {
        match good {
            Good::A => self.a,
            Good::B => self.b,
            Good::Money => self.m,
        }
    }

    /// Whether applying `delta` leaves every amount non-negative.
    pub fn can_apply(&self, delta: InventoryDelta) -> bool {
        self.a.checked_add_signed(delta.da).is_some()
            && self.b.checked_add_signed(delta.db).is_some()
            && self.m.checked_add_signed(delta.dm).is_some()
    }

    /// Apply a delta. Panics on a negative result: inventories going negative
    /// is an invariant violation, not a recoverable condition.
    pub fn apply(&mut self, delta: InventoryDelta) {
        self.a = self
            .a
            .checked_add_signed(delta.da)
            .unwrap_or_else(|| panic!("inventory A went negative: {} {delta:?}", self.a));
        self.b = self
            .b
            .checked_add_signed(delta.db)
            .unwrap_or_else(|| panic!("inventory B went negative: {} {delta:?}", self.b));
        self.m = self
            .m
            .checked_add_signed(delta.dm)
            .unwrap_or_else(|| panic!("inventory M went negative: {} {delta:?}", self.m));
    }

    /// Inventory after applying `delta`, or `None` if infeasible.
    pub fn applied(&self, delta: InventoryDelta) -> Option<Inventory> {
        Some(Inventory {
            a: self.a.checked_add_signed(delta.da)?,
            b: self.b.checked_add_signed(delta.db)?,
            m: self.m.checked_add_signed(delta.dm)?,
        })
    }
}

/// Signed change to an inventory, e.g. one side of a trade.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InventoryDelta {
    pub da: i64,
    pub db: i64,
    pub dm: i64,
}

impl InventoryDelta {
    pub fn new(da: i64, db: i64, dm: i64) -> Self {
        Self { da, db, dm }
    }

    /// Delta for receiving `qty` of `good`.
    pub fn gain(good: Good, qty: u64) -> Self {
        let qty = qty as i64;
        match good {
            Good::A => Self::new(qty, 0, 0),
            Good::B => Self::new(0, qty, 0),
            Good::Money => Self::new(0, 0, qty),
        }
    }

    /// The opposite side of this delta.
    pub fn negated(&self) -> Self {
        Self {
            da: -self.da,
            db: -self.db,
            dm: -self.dm,
        }
    }

    /// Seller-side delta for a block trade: give `qty` of `traded`, receive
    /// `pay` of the payment good.
    pub fn seller_side(pair: TradePair, qty: u64, pay: u64) -> Self {
        let (traded, payment) = pair.goods();
        let mut d = InventoryDelta::gain(payment, pay);
        let give = InventoryDelta::gain(traded, qty).negated();
        d.da += give.da;
        d.db += give.db;
        d.dm += give.dm;
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance_is_symmetric() {
        let p = Position::new(1, 4);
        let q = Position::new(-2, 6);
        assert_eq!(p.manhattan(q), 5);
        assert_eq!(q.manhattan(p), 5);
    }

    #[test]
    fn inventory_rejects_negative_results() {
        let inv = Inventory::new(3, 0);
        assert!(!inv.can_apply(InventoryDelta::new(-4, 0, 0)));
        assert!(inv.can_apply(InventoryDelta::new(-3, 2, 0)));
        assert_eq!(inv.applied(InventoryDelta::new(0, -1, 0)), None);
    }

    #[test]
    fn seller_side_moves_both_goods() {
        let d = InventoryDelta::seller_side(TradePair::AInB, 2, 5);
        assert_eq!(d, InventoryDelta::new(-2, 5, 0));
        let d = InventoryDelta::seller_side(TradePair::BInM, 1, 3);
        assert_eq!(d, InventoryDelta::new(0, -1, 3));
    }

    #[test]
    fn allowed_pairs_follow_regime() {
        assert_eq!(TradePair::allowed(ExchangeRegime::BarterOnly), &[TradePair::AInB]);
        assert_eq!(TradePair::allowed(ExchangeRegime::Mixed).len(), 3);
        assert!(!TradePair::allowed(ExchangeRegime::MoneyOnly).contains(&TradePair::AInB));
    }
}
