//! Simulation rules configuration.
//!
//! Every peer of a session must run with the same configuration; it is part
//! of the serialized simulation state and therefore of every replay.

use serde::{Deserialize, Serialize};

use crate::clock::TICK_RATE;
use crate::error::{GameError, Result};

/// Which cost a cancellation refund is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundBasis {
    /// The cost deducted when the order was issued.
    IssueSnapshot,
    /// The cost the payer would be charged right now.
    CurrentCost,
}

/// What replay does when a recorded seed disagrees with the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DesyncPolicy {
    /// Record a diagnostic and keep playing.
    Report,
    /// Panic immediately.
    Panic,
}

impl Default for DesyncPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Report
        }
    }
}

/// Tunable rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks per simulated second; cadence intervals derive from it.
    pub ticks_per_second: u32,
    /// Maximum number of orders a unit may queue.
    pub max_queue_depth: usize,
    /// Allow queueing several train orders on one building.
    pub training_queue: bool,
    /// Percent of the cost refunded when training is cancelled.
    pub cancel_train_refund_percent: i32,
    /// Percent refunded when research is cancelled.
    pub cancel_research_refund_percent: i32,
    /// Percent refunded when an upgrade-to is cancelled.
    pub cancel_upgrade_refund_percent: i32,
    /// Percent refunded when a construction is cancelled or destroyed.
    pub cancel_build_refund_percent: i32,
    /// Cost a refund is computed from.
    pub refund_basis: RefundBasis,
    /// Outside-builder structures only progress while a builder works on them.
    pub help_build_required: bool,
    /// Failed routes a builder tolerates on the way to its site.
    pub build_retry_limit: u32,
    /// Search radius for resource sources around a gather position.
    pub resource_search_radius: u32,
    /// Search radius for depots.
    pub depot_search_radius: u32,
    /// Radius searched for free tiles when dropping units out.
    pub drop_out_radius: u32,
    /// Income per tile of distance between trade partners, in percent.
    pub trade_income_percent: i32,
    /// Ticks a blocked mover waits before planning a new route.
    pub repath_after_blocked: u32,
    /// Desync handling during replay.
    pub desync_policy: DesyncPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: TICK_RATE,
            max_queue_depth: 0x7F,
            training_queue: true,
            cancel_train_refund_percent: 100,
            cancel_research_refund_percent: 100,
            cancel_upgrade_refund_percent: 100,
            cancel_build_refund_percent: 75,
            refund_basis: RefundBasis::IssueSnapshot,
            help_build_required: false,
            build_retry_limit: 10,
            resource_search_radius: 12,
            depot_search_radius: 64,
            drop_out_radius: 8,
            trade_income_percent: 50,
            repath_after_blocked: 10,
            desync_policy: DesyncPolicy::default(),
        }
    }
}

impl SimConfig {
    /// Parse from RON text; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed text.
    pub fn from_ron_str(label: &str, text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })
    }
}
