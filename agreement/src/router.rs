//! Own the state machines of every live round and route events to them.

use crate::{
    config::{Config, ConfigError},
    events::{Event, ProposalEvent, Tag, ThresholdKind, VoteEvent},
    metrics::{Kind, Metrics, Reason},
    tracker::ProposalTracker,
    votes::VoteTracker,
    types::{Period, Round, Step},
};
use bytes::{Buf, Bytes, BytesMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use prometheus_client::registry::Registry;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors that can occur when restoring a [Router] from a checkpoint.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid checkpoint: {0}")]
    Codec(#[from] CodecError),
}

/// Dispatches events to the [ProposalTracker] of each `(round, period)` and the [VoteTracker]
/// of each `(round, period, step)`.
///
/// The router is the only owner of these state machines. Taking `&mut self` on every dispatch
/// means each instance handles one event at a time, in delivery order. Instances are created
/// on the first event that can change them and are discarded with their round by
/// [Router::conclude].
pub struct Router {
    cfg: Config,
    concluded: Option<Round>,
    proposals: BTreeMap<(Round, Period), ProposalTracker>,
    votes: BTreeMap<(Round, Period, Step), VoteTracker>,
    metrics: Metrics,
}

impl Router {
    /// Creates an empty router and registers its metrics with `registry`.
    pub fn new(cfg: Config, registry: &mut Registry) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            concluded: None,
            proposals: BTreeMap::new(),
            votes: BTreeMap::new(),
            metrics: Metrics::init(registry),
        })
    }

    /// Returns the most recent round whose state was discarded.
    pub const fn concluded(&self) -> Option<Round> {
        self.concluded
    }

    pub fn proposal_tracker(&self, round: Round, period: Period) -> Option<&ProposalTracker> {
        self.proposals.get(&(round, period))
    }

    pub fn vote_tracker(&self, round: Round, period: Period, step: Step) -> Option<&VoteTracker> {
        self.votes.get(&(round, period, step))
    }

    /// Returns the number of live `(round, period)` instances.
    pub fn tracked_periods(&self) -> usize {
        self.proposals.len()
    }

    /// Delivers `event` to the state machine responsible for it and returns what it emitted.
    ///
    /// Events for concluded rounds (and events that would exceed
    /// [Config::max_tracked_periods] or [Config::max_tracked_steps]) are dropped and answered
    /// with [Event::Empty].
    ///
    /// When a vote completes a soft or cert threshold, the threshold is also delivered to the
    /// period's [ProposalTracker] before being returned.
    ///
    /// # Panics
    ///
    /// Panics if `event` is not handled by any state machine (for example an event that is
    /// only ever emitted). This is a bug in the caller.
    pub fn dispatch(&mut self, event: Event) -> Event {
        let kind = event.kind();
        let (Some(tag), Some((round, period, step))) = (event.tag(), event.position()) else {
            panic!("router: no state machine handles events of type {kind:?}");
        };
        if self.concluded.is_some_and(|concluded| round <= concluded) {
            trace!(%round, %period, ?kind, "dropping event for concluded round");
            return Event::Empty;
        }

        match tag {
            Tag::ProposalPeriod => {
                let event = ProposalEvent::try_from(event).unwrap_or_else(|event| {
                    panic!("proposal tracker: bad event type: {:?}", event.kind())
                });
                self.deliver_proposal(round, period, event)
            }
            Tag::VoteStep => {
                let event = VoteEvent::try_from(event).unwrap_or_else(|event| {
                    panic!("vote tracker: bad event type: {:?}", event.kind())
                });
                self.deliver_vote(round, period, step, event)
            }
        }
    }

    /// Discards all state for rounds up to and including `round`.
    pub fn conclude(&mut self, round: Round) {
        if self.concluded.is_some_and(|concluded| round <= concluded) {
            return;
        }
        self.proposals.retain(|(r, _), _| *r > round);
        self.votes.retain(|(r, _, _), _| *r > round);
        self.concluded = Some(round);
        self.metrics.concluded_rounds.inc();
        self.update_tracked();
        debug!(%round, remaining = self.proposals.len(), "concluded round");
    }

    fn deliver_proposal(&mut self, round: Round, period: Period, event: ProposalEvent) -> Event {
        // Reads and filter requests never create state
        if matches!(
            event,
            ProposalEvent::VoteFilterRequest(_)
                | ProposalEvent::ReadLowestVote(_)
                | ProposalEvent::ReadStaging(_)
        ) {
            let output = match self.proposals.get_mut(&(round, period)) {
                Some(tracker) => tracker.handle(event),
                None => ProposalTracker::new().handle(event),
            };
            self.record(&output);
            return output;
        }

        let Some(tracker) = self.admit(round, period) else {
            return Event::Empty;
        };
        let output = tracker.handle(event);
        self.record(&output);
        output
    }

    fn deliver_vote(&mut self, round: Round, period: Period, step: Step, event: VoteEvent) -> Event {
        let Some(kind) = ThresholdKind::from_step(step) else {
            panic!("vote tracker: no threshold for step {step}");
        };
        let threshold = self.cfg.threshold(kind);
        if let VoteEvent::FilterRequest(_) = event {
            let output = match self.votes.get_mut(&(round, period, step)) {
                Some(tracker) => tracker.handle(event, threshold),
                None => VoteTracker::new().handle(event, threshold),
            };
            self.record(&output);
            return output;
        }

        if !self.votes.contains_key(&(round, period, step)) {
            let tracked = self.tracked_steps(round, period);
            if tracked >= self.cfg.max_tracked_steps {
                warn!(%round, %period, %step, tracked, "too many steps tracked for period");
                return Event::Empty;
            }
        }
        if self.admit(round, period).is_none() {
            return Event::Empty;
        }
        let output = self
            .votes
            .entry((round, period, step))
            .or_default()
            .handle(event, threshold);
        self.record(&output);

        // Soft and cert thresholds stage the period's value
        if let Event::Threshold(t) = &output {
            if matches!(t.kind, ThresholdKind::Soft | ThresholdKind::Cert) {
                if let Some(tracker) = self.proposals.get_mut(&(round, period)) {
                    let staged = tracker.handle(ProposalEvent::Threshold(*t));
                    self.record(&staged);
                }
            }
        }
        output
    }

    /// Returns the [ProposalTracker] of `(round, period)`, creating it if the round is not
    /// already tracking [Config::max_tracked_periods] periods.
    fn admit(&mut self, round: Round, period: Period) -> Option<&mut ProposalTracker> {
        if !self.proposals.contains_key(&(round, period)) {
            let tracked = self
                .proposals
                .range((round, Period::zero())..=(round, Period::new(u64::MAX)))
                .count();
            if tracked >= self.cfg.max_tracked_periods {
                warn!(%round, %period, tracked, "too many periods tracked for round");
                return None;
            }
            self.proposals.insert((round, period), ProposalTracker::new());
            self.update_tracked();
        }
        self.proposals.get_mut(&(round, period))
    }

    fn tracked_steps(&self, round: Round, period: Period) -> usize {
        self.votes
            .range((round, period, Step::zero())..=(round, period, Step::new(u64::MAX)))
            .count()
    }

    fn update_tracked(&self) {
        let tracked = i64::try_from(self.proposals.len()).unwrap_or(i64::MAX);
        self.metrics.tracked_periods.set(tracked);
    }

    fn record(&self, output: &Event) {
        match output {
            Event::VoteFiltered(filtered) => {
                self.metrics
                    .filtered_votes
                    .get_or_create(&Reason::new(&filtered.err))
                    .inc();
                trace!(
                    sender = %filtered.sender,
                    round = %filtered.round,
                    period = %filtered.period,
                    step = %filtered.step,
                    err = %filtered.err,
                    note = ?filtered.late_credential_tracking_note,
                    "filtered vote"
                );
            }
            Event::ProposalAccepted(accepted) => {
                self.metrics.accepted_proposals.inc();
                debug!(
                    round = %accepted.round,
                    period = %accepted.period,
                    proposal = ?accepted.proposal,
                    "accepted proposal"
                );
            }
            Event::ProposalFrozen(frozen) => {
                self.metrics.frozen_periods.inc();
                debug!(
                    round = %frozen.round,
                    period = %frozen.period,
                    proposal = ?frozen.proposal,
                    "froze proposal"
                );
            }
            Event::Threshold(threshold) => {
                self.metrics
                    .thresholds
                    .get_or_create(&Kind::new(threshold.kind))
                    .inc();
                debug!(
                    kind = threshold.kind.as_str(),
                    round = %threshold.round,
                    period = %threshold.period,
                    step = %threshold.step,
                    proposal = ?threshold.proposal,
                    "reached threshold"
                );
            }
            Event::Empty
            | Event::VoteFilterRequest(_)
            | Event::VoteVerified(_)
            | Event::ReadLowestVote(_)
            | Event::ReadStaging(_) => {}
        }
    }

    /// Serializes the state of every live state machine.
    ///
    /// Equal router states always produce identical bytes.
    pub fn checkpoint(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.checkpoint_size());
        self.concluded.write(&mut buf);

        let proposals = u32::try_from(self.proposals.len()).expect("too many periods");
        proposals.write(&mut buf);
        for ((round, period), tracker) in &self.proposals {
            round.write(&mut buf);
            period.write(&mut buf);
            tracker.write(&mut buf);
        }

        let votes = u32::try_from(self.votes.len()).expect("too many steps");
        votes.write(&mut buf);
        for ((round, period, step), tracker) in &self.votes {
            round.write(&mut buf);
            period.write(&mut buf);
            step.write(&mut buf);
            tracker.write(&mut buf);
        }
        buf.freeze()
    }

    fn checkpoint_size(&self) -> usize {
        self.concluded.encode_size()
            + u32::SIZE
            + self
                .proposals
                .values()
                .map(|tracker| Round::SIZE + Period::SIZE + tracker.encode_size())
                .sum::<usize>()
            + u32::SIZE
            + self
                .votes
                .values()
                .map(|tracker| Round::SIZE + Period::SIZE + Step::SIZE + tracker.encode_size())
                .sum::<usize>()
    }

    /// Rebuilds a router from the output of [Router::checkpoint].
    ///
    /// Delivering the same events to the restored router produces the same outputs as
    /// delivering them to the router that was checkpointed.
    pub fn restore(
        cfg: Config,
        registry: &mut Registry,
        mut buf: impl Buf,
    ) -> Result<Self, RestoreError> {
        let mut router = Self::new(cfg, registry)?;
        let max_senders = router.cfg.max_senders;
        router.concluded = Option::<Round>::read(&mut buf)?;

        let proposals = u32::read(&mut buf)?;
        for _ in 0..proposals {
            let round = Round::read(&mut buf)?;
            let period = Period::read(&mut buf)?;
            let tracker = ProposalTracker::read_cfg(&mut buf, &max_senders)?;
            if router.concluded.is_some_and(|concluded| round <= concluded) {
                return Err(CodecError::Invalid("agreement::Router", "concluded round").into());
            }
            if router.proposals.insert((round, period), tracker).is_some() {
                return Err(CodecError::Invalid("agreement::Router", "duplicate period").into());
            }
            let tracked = router
                .proposals
                .range((round, Period::zero())..=(round, Period::new(u64::MAX)))
                .count();
            if tracked > router.cfg.max_tracked_periods {
                return Err(CodecError::Invalid("agreement::Router", "too many periods").into());
            }
        }

        let votes = u32::read(&mut buf)?;
        for _ in 0..votes {
            let round = Round::read(&mut buf)?;
            let period = Period::read(&mut buf)?;
            let step = Step::read(&mut buf)?;
            let tracker = VoteTracker::read_cfg(&mut buf, &max_senders)?;
            if step.is_propose() {
                return Err(CodecError::Invalid("agreement::Router", "propose step").into());
            }
            if !router.proposals.contains_key(&(round, period)) {
                return Err(CodecError::Invalid("agreement::Router", "untracked period").into());
            }
            if router.votes.insert((round, period, step), tracker).is_some() {
                return Err(CodecError::Invalid("agreement::Router", "duplicate step").into());
            }
            if router.tracked_steps(round, period) > router.cfg.max_tracked_steps {
                return Err(CodecError::Invalid("agreement::Router", "too many steps").into());
            }
        }

        if buf.has_remaining() {
            return Err(CodecError::ExtraData(buf.remaining()).into());
        }
        router.update_tracked();
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{Error, SeekerError},
        events::{Filtered, Frozen, LowestVote, ProposalAccepted, Staging, Threshold},
        seeker::tests::{vote as proposal_vote, vote_at},
        types::{Address, Credential, ProposalValue, UnauthenticatedVote, Vote},
    };
    use commonware_cryptography::sha256::Digest;
    use commonware_macros::test_traced;
    use prometheus_client::encoding::text::encode;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn config() -> Config {
        Config {
            soft_threshold: 7,
            cert_threshold: 5,
            next_threshold: 7,
            max_senders: 100,
            max_tracked_periods: 3,
            max_tracked_steps: 3,
        }
    }

    fn router() -> Router {
        Router::new(config(), &mut Registry::default()).unwrap()
    }

    fn round() -> Round {
        Round::new(1)
    }

    fn value(b: u8) -> ProposalValue {
        ProposalValue::new(
            Period::zero(),
            Address::from([b; 32]),
            Digest::from([b; 32]),
            Digest::from([b; 32]),
        )
    }

    fn step_vote(sender: u8, step: Step, proposal: ProposalValue, weight: u64) -> Vote {
        let raw = UnauthenticatedVote::new(
            Address::from([sender; 32]),
            round(),
            Period::zero(),
            step,
            proposal,
        );
        Vote::new(raw, Credential::new(weight, Digest::from([sender; 32])))
    }

    fn read_lowest(router: &mut Router, round: Round, period: Period) -> LowestVote {
        match router.dispatch(Event::read_lowest_vote(round, period)) {
            Event::ReadLowestVote(lowest) => lowest,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    fn read_staging(router: &mut Router, round: Round, period: Period) -> ProposalValue {
        match router.dispatch(Event::read_staging(round, period)) {
            Event::ReadStaging(Staging { proposal, .. }) => proposal,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    fn filtered(event: Event) -> Filtered {
        match event {
            Event::VoteFiltered(filtered) => filtered,
            other => panic!("expected filtered vote, got {other:?}"),
        }
    }

    #[test_traced]
    fn test_scenario_duplicate_sender() {
        let mut router = router();
        let a = proposal_vote(1, 5);
        assert_eq!(
            router.dispatch(Event::VoteVerified(a)),
            Event::ProposalAccepted(ProposalAccepted {
                round: round(),
                period: Period::zero(),
                proposal: a.proposal(),
            })
        );
        let f = filtered(router.dispatch(Event::VoteVerified(proposal_vote(1, 1))));
        assert!(matches!(f.err, Error::DuplicateSender { .. }));
        let f = filtered(router.dispatch(Event::VoteFilterRequest(proposal_vote(1, 9).raw)));
        assert!(matches!(f.err, Error::DuplicateSender { .. }));
    }

    #[test_traced]
    fn test_scenario_lowest_credential() {
        let mut router = router();
        router.dispatch(Event::VoteVerified(proposal_vote(2, 9)));
        router.dispatch(Event::VoteVerified(proposal_vote(3, 4)));
        let f = filtered(router.dispatch(Event::VoteVerified(proposal_vote(4, 7))));
        assert!(matches!(
            f.err,
            Error::Seeker(SeekerError::NotLess { .. })
        ));
        assert_eq!(
            read_lowest(&mut router, round(), Period::zero()).vote,
            Some(proposal_vote(3, 4))
        );
    }

    #[test_traced]
    fn test_scenario_late_credential() {
        let mut router = router();
        let e = proposal_vote(5, 3);
        router.dispatch(Event::VoteVerified(e));
        assert_eq!(
            router.dispatch(Event::freeze(round(), Period::zero())),
            Event::ProposalFrozen(Frozen {
                round: round(),
                period: Period::zero(),
                proposal: e.proposal(),
            })
        );

        let f_vote = proposal_vote(6, 1);
        let f = filtered(router.dispatch(Event::VoteVerified(f_vote)));
        assert_eq!(f.err, Error::Seeker(SeekerError::Frozen));

        let lowest = read_lowest(&mut router, round(), Period::zero());
        assert_eq!(lowest.vote, Some(e));
        assert!(lowest.filled());
        assert_eq!(lowest.lowest_including_late, Some(f_vote));
        assert!(lowest.has_lowest_including_late());
    }

    #[test_traced]
    fn test_scenario_threshold_before_votes() {
        let mut router = router();
        let p = value(8);
        router.dispatch(Event::cert_threshold(round(), Period::zero(), p));
        assert_eq!(read_staging(&mut router, round(), Period::zero()), p);

        let f = filtered(router.dispatch(Event::VoteVerified(proposal_vote(9, 0))));
        assert_eq!(f.err, Error::AlreadyStaged);
        assert!(!read_lowest(&mut router, round(), Period::zero()).filled());
    }

    #[test]
    fn test_reads_do_not_create_state() {
        let mut router = router();
        let lowest = read_lowest(&mut router, round(), Period::zero());
        assert!(!lowest.filled());
        assert!(!lowest.has_lowest_including_late());
        assert!(read_staging(&mut router, round(), Period::zero()).is_bottom());
        assert_eq!(
            router.dispatch(Event::VoteFilterRequest(proposal_vote(1, 1).raw)),
            Event::Empty
        );
        assert_eq!(
            router.dispatch(Event::VoteFilterRequest(
                step_vote(1, Step::SOFT, value(1), 1).raw
            )),
            Event::Empty
        );
        assert_eq!(router.tracked_periods(), 0);
        assert!(router.vote_tracker(round(), Period::zero(), Step::SOFT).is_none());
    }

    #[test]
    fn test_periods_are_independent() {
        let mut router = router();
        let p0 = vote_at(1, 5, round(), Period::new(0));
        let p1 = vote_at(1, 5, round(), Period::new(1));
        let next_round = vote_at(1, 5, round().next(), Period::new(0));
        for v in [p0, p1, next_round] {
            assert!(matches!(
                router.dispatch(Event::VoteVerified(v)),
                Event::ProposalAccepted(_)
            ));
        }
        assert_eq!(router.tracked_periods(), 3);

        router.dispatch(Event::freeze(round(), Period::new(0)));
        assert!(router
            .proposal_tracker(round(), Period::new(0))
            .unwrap()
            .freezer()
            .frozen());
        assert!(!router
            .proposal_tracker(round(), Period::new(1))
            .unwrap()
            .freezer()
            .frozen());
    }

    #[test_traced]
    fn test_soft_votes_stage_value() {
        let mut router = router();
        let p = value(3);
        router.dispatch(Event::VoteVerified(proposal_vote(1, 5)));
        assert_eq!(
            router.dispatch(Event::VoteVerified(step_vote(1, Step::SOFT, p, 4))),
            Event::Empty
        );
        assert!(read_staging(&mut router, round(), Period::zero()).is_bottom());

        let output = router.dispatch(Event::VoteVerified(step_vote(2, Step::SOFT, p, 3)));
        assert_eq!(
            output,
            Event::Threshold(Threshold {
                kind: ThresholdKind::Soft,
                round: round(),
                period: Period::zero(),
                step: Step::SOFT,
                proposal: p,
            })
        );
        assert_eq!(read_staging(&mut router, round(), Period::zero()), p);

        // Proposal-votes are now filtered
        let f = filtered(router.dispatch(Event::VoteVerified(proposal_vote(9, 0))));
        assert_eq!(f.err, Error::AlreadyStaged);
    }

    #[test]
    fn test_next_threshold_does_not_stage() {
        let mut router = router();
        let output = router.dispatch(Event::VoteVerified(step_vote(
            1,
            Step::NEXT,
            ProposalValue::bottom(),
            7,
        )));
        match output {
            Event::Threshold(t) => assert_eq!(t.kind, ThresholdKind::Next),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(read_staging(&mut router, round(), Period::zero()).is_bottom());
    }

    #[test]
    fn test_latest_threshold_wins() {
        let mut router = router();
        router.dispatch(Event::soft_threshold(round(), Period::zero(), value(1)));
        router.dispatch(Event::cert_threshold(round(), Period::zero(), value(2)));
        assert_eq!(read_staging(&mut router, round(), Period::zero()), value(2));
    }

    #[test_traced]
    fn test_conclude() {
        let mut router = router();
        router.dispatch(Event::VoteVerified(proposal_vote(1, 5)));
        router.dispatch(Event::VoteVerified(step_vote(1, Step::CERT, value(1), 1)));
        router.dispatch(Event::VoteVerified(vote_at(1, 5, Round::new(2), Period::zero())));
        assert_eq!(router.tracked_periods(), 2);

        router.conclude(round());
        assert_eq!(router.concluded(), Some(round()));
        assert_eq!(router.tracked_periods(), 1);
        assert!(router.proposal_tracker(round(), Period::zero()).is_none());
        assert!(router
            .vote_tracker(round(), Period::zero(), Step::CERT)
            .is_none());

        // Events for the concluded round are no-ops
        assert_eq!(
            router.dispatch(Event::VoteVerified(proposal_vote(2, 1))),
            Event::Empty
        );
        assert_eq!(
            router.dispatch(Event::freeze(round(), Period::zero())),
            Event::Empty
        );
        assert_eq!(router.tracked_periods(), 1);

        // Concluding an older round changes nothing
        router.conclude(Round::zero());
        assert_eq!(router.concluded(), Some(round()));
        assert!(router
            .proposal_tracker(Round::new(2), Period::zero())
            .is_some());
    }

    #[test_traced]
    fn test_max_tracked_periods() {
        let mut router = router();
        for period in 0..3 {
            assert!(matches!(
                router.dispatch(Event::VoteVerified(vote_at(1, 5, round(), Period::new(period)))),
                Event::ProposalAccepted(_)
            ));
        }
        assert_eq!(
            router.dispatch(Event::VoteVerified(vote_at(1, 5, round(), Period::new(3)))),
            Event::Empty
        );
        assert_eq!(
            router.dispatch(Event::freeze(round(), Period::new(3))),
            Event::Empty
        );

        // Other rounds have their own limit
        assert!(matches!(
            router.dispatch(Event::VoteVerified(vote_at(1, 5, Round::new(2), Period::new(3)))),
            Event::ProposalAccepted(_)
        ));
    }

    #[test_traced]
    fn test_max_tracked_steps() {
        let mut router = router();
        for step in [Step::SOFT, Step::CERT, Step::NEXT] {
            assert_eq!(
                router.dispatch(Event::VoteVerified(step_vote(1, step, value(1), 1))),
                Event::Empty
            );
            assert!(router.vote_tracker(round(), Period::zero(), step).is_some());
        }

        // A fourth step is refused without creating any state
        let late = step_vote(1, Step::new(9), value(1), 7);
        assert_eq!(router.dispatch(Event::VoteVerified(late)), Event::Empty);
        assert!(router
            .vote_tracker(round(), Period::zero(), Step::new(9))
            .is_none());

        // Steps already tracked keep counting
        router.dispatch(Event::VoteVerified(step_vote(2, Step::SOFT, value(1), 1)));
        let tracker = router
            .vote_tracker(round(), Period::zero(), Step::SOFT)
            .unwrap();
        assert_eq!(tracker.weight(&value(1)), 2);

        // A checkpoint with more steps than allowed is rejected
        let mut cfg = config();
        cfg.max_tracked_steps = 2;
        assert!(matches!(
            Router::restore(cfg, &mut Registry::default(), router.checkpoint()),
            Err(RestoreError::Codec(CodecError::Invalid(_, "too many steps")))
        ));
    }

    #[test]
    #[should_panic(expected = "no state machine handles events of type ProposalAccepted")]
    fn test_dispatch_output_event_panics() {
        let mut router = router();
        router.dispatch(Event::ProposalAccepted(ProposalAccepted {
            round: round(),
            period: Period::zero(),
            proposal: value(1),
        }));
    }

    #[test]
    #[should_panic(expected = "no state machine handles events of type NextThreshold")]
    fn test_dispatch_next_threshold_panics() {
        let mut router = router();
        router.dispatch(Event::Threshold(Threshold {
            kind: ThresholdKind::Next,
            round: round(),
            period: Period::zero(),
            step: Step::NEXT,
            proposal: value(1),
        }));
    }

    #[test]
    #[should_panic(expected = "no state machine handles events of type Empty")]
    fn test_dispatch_empty_panics() {
        router().dispatch(Event::Empty);
    }

    #[test]
    fn test_metrics() {
        let mut registry = Registry::default();
        let mut router = Router::new(config(), &mut registry).unwrap();
        router.dispatch(Event::VoteVerified(proposal_vote(1, 5)));
        router.dispatch(Event::VoteVerified(proposal_vote(1, 4)));
        router.dispatch(Event::freeze(round(), Period::zero()));

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("accepted_proposals_total 1"));
        assert!(buffer.contains("frozen_periods_total 1"));
        assert!(buffer.contains("filtered_votes_total{reason=\"duplicate_sender\"} 1"));
        assert!(buffer.contains("tracked_periods 1"));
    }

    #[test]
    fn test_invalid_config() {
        let mut cfg = config();
        cfg.max_senders = 0;
        assert!(matches!(
            Router::new(cfg, &mut Registry::default()),
            Err(ConfigError::ZeroMaxSenders)
        ));
    }

    /// Generates a random stream of events touching a couple of rounds and periods.
    fn random_events(rng: &mut StdRng, n: usize) -> Vec<Event> {
        let mut events = Vec::with_capacity(n);
        for _ in 0..n {
            let round = Round::new(rng.gen_range(1..3));
            let period = Period::new(rng.gen_range(0..2));
            let sender: u8 = rng.gen_range(0..12);
            let proposal = value(rng.gen_range(0..3));
            let event = match rng.gen_range(0..10) {
                0 => Event::freeze(round, period),
                1 => Event::soft_threshold(round, period, proposal),
                2..=5 => Event::VoteVerified(vote_at(sender, rng.gen(), round, period)),
                _ => {
                    let step = Step::new(rng.gen_range(1..4));
                    let raw = UnauthenticatedVote::new(
                        Address::from([sender; 32]),
                        round,
                        period,
                        step,
                        proposal,
                    );
                    let credential = Credential::new(rng.gen_range(1..4), Digest::from([sender; 32]));
                    Event::VoteVerified(Vote::new(raw, credential))
                }
            };
            events.push(event);
        }
        events
    }

    #[test]
    fn test_checkpoint_replay() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            let events = random_events(&mut rng, 200);
            let (before, after) = events.split_at(120);

            let mut original = router();
            for event in before {
                original.dispatch(event.clone());
            }
            let checkpoint = original.checkpoint();
            let mut restored =
                Router::restore(config(), &mut Registry::default(), checkpoint.clone()).unwrap();
            assert_eq!(restored.checkpoint(), checkpoint);

            for event in after {
                assert_eq!(
                    original.dispatch(event.clone()),
                    restored.dispatch(event.clone())
                );
            }
            assert_eq!(original.checkpoint(), restored.checkpoint());
        }
    }

    #[test]
    fn test_checkpoint_after_conclude() {
        let mut router = router();
        router.dispatch(Event::VoteVerified(proposal_vote(1, 5)));
        router.dispatch(Event::VoteVerified(vote_at(2, 5, Round::new(2), Period::zero())));
        router.conclude(round());

        let checkpoint = router.checkpoint();
        let mut restored =
            Router::restore(config(), &mut Registry::default(), checkpoint).unwrap();
        assert_eq!(restored.concluded(), Some(round()));
        assert_eq!(restored.tracked_periods(), 1);
        assert_eq!(
            restored.dispatch(Event::VoteVerified(proposal_vote(3, 1))),
            Event::Empty
        );
    }

    #[test]
    fn test_restore_rejects_invalid() {
        let mut router = router();
        router.dispatch(Event::VoteVerified(proposal_vote(1, 5)));
        router.dispatch(Event::VoteVerified(proposal_vote(2, 4)));
        let checkpoint = router.checkpoint();

        // Trailing bytes
        let mut extended = checkpoint.to_vec();
        extended.push(0);
        assert!(matches!(
            Router::restore(config(), &mut Registry::default(), extended.as_slice()),
            Err(RestoreError::Codec(CodecError::ExtraData(1)))
        ));

        // Truncated
        let truncated = &checkpoint[..checkpoint.len() - 1];
        assert!(matches!(
            Router::restore(config(), &mut Registry::default(), truncated),
            Err(RestoreError::Codec(_))
        ));

        // More senders than configured
        let mut cfg = config();
        cfg.max_senders = 1;
        assert!(matches!(
            Router::restore(cfg, &mut Registry::default(), checkpoint),
            Err(RestoreError::Codec(_))
        ));
    }
}
