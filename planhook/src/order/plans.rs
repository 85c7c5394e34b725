//! Product title to plan tier mapping.

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// Version tag of [`PLAN_TABLE`]. Bump whenever the table changes.
pub const PLAN_TABLE_VERSION: &str = "2024-01";

/// Product titles sold on the storefront and the tier each one grants.
pub const PLAN_TABLE: &[(&str, PlanTier)] = &[
    ("Free", PlanTier::Free),
    ("Starter", PlanTier::Starter),
    ("Pro", PlanTier::Pro),
    ("Enterprise", PlanTier::Enterprise),
];

/// Subscription plan tier, stored as its integer level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn level(self) -> i16 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Starter => 1,
            PlanTier::Pro => 2,
            PlanTier::Enterprise => 3,
        }
    }

    pub fn from_level(level: i16) -> Option<Self> {
        match level {
            0 => Some(PlanTier::Free),
            1 => Some(PlanTier::Starter),
            2 => Some(PlanTier::Pro),
            3 => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

impl Serialize for PlanTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.level())
    }
}

/// Immutable lookup from product title to plan tier.
///
/// Lookup is total: titles outside the table resolve to [`PlanTier::Free`].
/// Titles match exactly, including case.
#[derive(Debug, Clone)]
pub struct PlanMapping {
    version: &'static str,
    tiers: HashMap<String, PlanTier>,
}

impl PlanMapping {
    pub fn new(version: &'static str, table: &[(&str, PlanTier)]) -> Self {
        Self {
            version,
            tiers: table
                .iter()
                .map(|(title, tier)| (title.to_string(), *tier))
                .collect(),
        }
    }

    pub fn resolve(&self, product_title: &str) -> PlanTier {
        self.tiers.get(product_title).copied().unwrap_or_default()
    }

    /// Whether the title is listed, as opposed to falling back to the default.
    pub fn is_known(&self, product_title: &str) -> bool {
        self.tiers.contains_key(product_title)
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for PlanMapping {
    fn default() -> Self {
        Self::new(PLAN_TABLE_VERSION, PLAN_TABLE)
    }
}
