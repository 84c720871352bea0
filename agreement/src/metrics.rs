//! Metrics reported while routing events.

use crate::{error::Error, events::ThresholdKind};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Label identifying why a vote was filtered.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Reason {
    pub reason: String,
}

impl Reason {
    pub fn new(err: &Error) -> Self {
        Self {
            reason: err.reason().to_string(),
        }
    }
}

/// Label identifying the kind of threshold reached.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Kind {
    pub kind: String,
}

impl Kind {
    pub fn new(kind: ThresholdKind) -> Self {
        Self {
            kind: kind.as_str().to_string(),
        }
    }
}

/// Metrics reported by the [crate::Router].
#[derive(Clone, Default)]
pub struct Metrics {
    /// Votes dropped by a state machine, by reason.
    pub filtered_votes: Family<Reason, Counter>,
    /// Proposal-values accepted (by credential or by threshold).
    pub accepted_proposals: Counter,
    /// Periods whose lowest-credential proposal was frozen.
    pub frozen_periods: Counter,
    /// Thresholds reached, by kind.
    pub thresholds: Family<Kind, Counter>,
    /// Live proposal trackers.
    pub tracked_periods: Gauge,
    /// Rounds whose state was discarded.
    pub concluded_rounds: Counter,
}

impl Metrics {
    /// Creates metrics and registers them with `registry`.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "filtered_votes",
            "votes dropped by a state machine",
            metrics.filtered_votes.clone(),
        );
        registry.register(
            "accepted_proposals",
            "proposal-values accepted for a period",
            metrics.accepted_proposals.clone(),
        );
        registry.register(
            "frozen_periods",
            "periods whose lowest-credential proposal was frozen",
            metrics.frozen_periods.clone(),
        );
        registry.register(
            "thresholds",
            "vote thresholds reached",
            metrics.thresholds.clone(),
        );
        registry.register(
            "tracked_periods",
            "periods with live proposal trackers",
            metrics.tracked_periods.clone(),
        );
        registry.register(
            "concluded_rounds",
            "rounds whose agreement state was discarded",
            metrics.concluded_rounds.clone(),
        );
        metrics
    }
}
