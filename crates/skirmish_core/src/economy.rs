//! Resource kinds and cost vectors.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Number of resource kinds.
pub const RESOURCE_COUNT: usize = 4;

/// A gatherable, spendable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Mined from gold mines.
    Gold,
    /// Cut from trees.
    Wood,
    /// Quarried stone.
    Stone,
    /// Food, produced by farms and garrisons.
    Food,
}

impl ResourceKind {
    /// All kinds in ledger order.
    pub const ALL: [Self; RESOURCE_COUNT] = [Self::Gold, Self::Wood, Self::Stone, Self::Food];

    /// Ledger index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Gold => 0,
            Self::Wood => 1,
            Self::Stone => 2,
            Self::Food => 3,
        }
    }

    /// Lower-case name used in logs and replay records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Wood => "wood",
            Self::Stone => "stone",
            Self::Food => "food",
        }
    }

    /// Parse the lower-case name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An amount of every resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Costs(pub [i32; RESOURCE_COUNT]);

impl Costs {
    /// No cost.
    pub const ZERO: Self = Self([0; RESOURCE_COUNT]);

    /// Cost in gold only.
    #[must_use]
    pub const fn gold(amount: i32) -> Self {
        Self([amount, 0, 0, 0])
    }

    /// Builder-style setter.
    #[must_use]
    pub const fn with(mut self, kind: ResourceKind, amount: i32) -> Self {
        self.0[kind.index()] = amount;
        self
    }

    /// Whether every component is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }

    /// Scale by a percentage, rounding towards zero.
    #[must_use]
    pub fn percent(&self, percent: i32) -> Self {
        let mut out = *self;
        for v in &mut out.0 {
            *v = (i64::from(*v) * i64::from(percent) / 100) as i32;
        }
        out
    }

    /// Whether `available` covers this cost.
    #[must_use]
    pub fn affordable_from(&self, available: &Self) -> bool {
        self.0.iter().zip(available.0.iter()).all(|(c, a)| a >= c)
    }

    /// First resource kind `available` cannot cover.
    #[must_use]
    pub fn first_shortfall(&self, available: &Self) -> Option<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| available[*k] < self[*k])
    }
}

impl Index<ResourceKind> for Costs {
    type Output = i32;

    fn index(&self, kind: ResourceKind) -> &i32 {
        &self.0[kind.index()]
    }
}

impl IndexMut<ResourceKind> for Costs {
    fn index_mut(&mut self, kind: ResourceKind) -> &mut i32 {
        &mut self.0[kind.index()]
    }
}

impl std::ops::AddAssign for Costs {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a += b;
        }
    }
}

impl std::ops::SubAssign for Costs {
    fn sub_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a -= b;
        }
    }
}
