//! Accumulate weighted votes for a step and detect when a quorum is reached.

use crate::{
    error::Error,
    events::{Event, Filtered, Threshold, ThresholdKind, VoteEvent},
    types::{Address, ProposalValue, Vote},
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::collections::{BTreeMap, HashMap};

/// Tracks the votes of a single `(round, period, step)` for any step other than the propose step.
///
/// Each sender contributes its credential weight to the value it voted for. A sender that votes
/// for two different values is an equivocator: its weight is removed from its first value and
/// instead counted toward every value. Once the
/// weight behind a value reaches the step's threshold, a single [Event::Threshold] is emitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteTracker {
    voters: BTreeMap<Address, Vote>,
    equivocators: BTreeMap<Address, (Vote, Vote)>,
    emitted: bool,

    tallies: HashMap<ProposalValue, u64>,
    equivocator_weight: u64,
}

impl VoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the weight counted toward `proposal` (including all equivocators).
    pub fn weight(&self, proposal: &ProposalValue) -> u64 {
        self.tallies
            .get(proposal)
            .copied()
            .unwrap_or_default()
            .saturating_add(self.equivocator_weight)
    }

    /// Returns true once a threshold has been emitted.
    pub const fn emitted(&self) -> bool {
        self.emitted
    }

    /// Returns the conflicting votes of each equivocator.
    pub fn equivocations(&self) -> impl Iterator<Item = &(Vote, Vote)> {
        self.equivocators.values()
    }

    /// Handles a single event, emitting a threshold of kind derived from the vote's step once
    /// `threshold` weight is reached for some value.
    ///
    /// # Panics
    ///
    /// Panics if delivered a proposal-vote.
    pub fn handle(&mut self, event: VoteEvent, threshold: u64) -> Event {
        match event {
            VoteEvent::FilterRequest(raw) => {
                if self.equivocators.contains_key(&raw.sender) {
                    let err = Error::AlreadyEquivocated {
                        sender: raw.sender,
                        round: raw.round,
                        period: raw.period,
                        step: raw.step,
                    };
                    return Event::VoteFiltered(Filtered::new(&raw, err));
                }
                match self.voters.get(&raw.sender) {
                    Some(existing) if existing.proposal() == raw.proposal => {
                        let err = Error::DuplicateVote {
                            sender: raw.sender,
                            round: raw.round,
                            period: raw.period,
                            step: raw.step,
                        };
                        Event::VoteFiltered(Filtered::new(&raw, err))
                    }
                    _ => Event::Empty,
                }
            }
            VoteEvent::Verified(vote) => {
                let Some(kind) = ThresholdKind::from_step(vote.step()) else {
                    panic!("vote tracker: delivered a proposal-vote: {vote:?}");
                };
                let raw = vote.raw;
                if self.equivocators.contains_key(&raw.sender) {
                    let err = Error::AlreadyEquivocated {
                        sender: raw.sender,
                        round: raw.round,
                        period: raw.period,
                        step: raw.step,
                    };
                    return Event::VoteFiltered(Filtered::new(&raw, err));
                }

                let equivocated = match self.voters.remove(&raw.sender) {
                    None => {
                        self.voters.insert(raw.sender, vote);
                        let tally = self.tallies.entry(raw.proposal).or_default();
                        *tally = tally.saturating_add(vote.credential.weight);
                        None
                    }
                    Some(existing) if existing.proposal() == raw.proposal => {
                        self.voters.insert(raw.sender, existing);
                        let err = Error::DuplicateVote {
                            sender: raw.sender,
                            round: raw.round,
                            period: raw.period,
                            step: raw.step,
                        };
                        return Event::VoteFiltered(Filtered::new(&raw, err));
                    }
                    Some(existing) => {
                        self.record_equivocation(existing, vote);
                        Some(existing.proposal())
                    }
                };

                if self.emitted {
                    return Event::Empty;
                }

                // Equivocator weight counts toward every value, so an equivocation can complete
                // any value voted for (checked in voter order)
                let others = equivocated
                    .is_some()
                    .then(|| self.voters.values().map(Vote::proposal))
                    .into_iter()
                    .flatten();
                let reached = std::iter::once(raw.proposal)
                    .chain(equivocated)
                    .chain(others)
                    .find(|proposal| self.weight(proposal) >= threshold);
                if let Some(proposal) = reached {
                    self.emitted = true;
                    return Event::Threshold(Threshold {
                        kind,
                        round: raw.round,
                        period: raw.period,
                        step: raw.step,
                        proposal,
                    });
                }
                Event::Empty
            }
        }
    }

    fn record_equivocation(&mut self, first: Vote, second: Vote) {
        if let Some(tally) = self.tallies.get_mut(&first.proposal()) {
            *tally = tally.saturating_sub(first.credential.weight);
            if *tally == 0 {
                self.tallies.remove(&first.proposal());
            }
        }
        self.equivocator_weight = self
            .equivocator_weight
            .saturating_add(first.credential.weight);
        self.equivocators.insert(first.sender(), (first, second));
    }
}

impl Write for VoteTracker {
    fn write(&self, buf: &mut impl BufMut) {
        let voters = u32::try_from(self.voters.len()).expect("too many voters");
        voters.write(buf);
        for vote in self.voters.values() {
            vote.write(buf);
        }
        let equivocators = u32::try_from(self.equivocators.len()).expect("too many equivocators");
        equivocators.write(buf);
        for (first, second) in self.equivocators.values() {
            first.write(buf);
            second.write(buf);
        }
        self.emitted.write(buf);
    }
}

impl EncodeSize for VoteTracker {
    fn encode_size(&self) -> usize {
        u32::SIZE
            + self.voters.len() * Vote::SIZE
            + u32::SIZE
            + self.equivocators.len() * 2 * Vote::SIZE
            + bool::SIZE
    }
}

impl Read for VoteTracker {
    /// Maximum number of senders a tracker may have seen.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max_senders: &usize) -> Result<Self, CodecError> {
        let mut tracker = Self::new();
        let voters = u32::read(buf)? as usize;
        if voters > *max_senders {
            return Err(CodecError::Invalid("agreement::VoteTracker", "too many voters"));
        }
        for _ in 0..voters {
            let vote = Vote::read(buf)?;
            if tracker.voters.insert(vote.sender(), vote).is_some() {
                return Err(CodecError::Invalid("agreement::VoteTracker", "duplicate voter"));
            }
            let tally = tracker.tallies.entry(vote.proposal()).or_default();
            *tally = tally.saturating_add(vote.credential.weight);
        }

        let equivocators = u32::read(buf)? as usize;
        if voters + equivocators > *max_senders {
            return Err(CodecError::Invalid(
                "agreement::VoteTracker",
                "too many equivocators",
            ));
        }
        for _ in 0..equivocators {
            let first = Vote::read(buf)?;
            let second = Vote::read(buf)?;
            if first.sender() != second.sender() || first.proposal() == second.proposal() {
                return Err(CodecError::Invalid(
                    "agreement::VoteTracker",
                    "invalid equivocation",
                ));
            }
            if tracker.voters.contains_key(&first.sender())
                || tracker.equivocators.contains_key(&first.sender())
            {
                return Err(CodecError::Invalid(
                    "agreement::VoteTracker",
                    "duplicate equivocator",
                ));
            }
            tracker.equivocator_weight = tracker
                .equivocator_weight
                .saturating_add(first.credential.weight);
            tracker.equivocators.insert(first.sender(), (first, second));
        }
        tracker.emitted = bool::read(buf)?;
        Ok(tracker)
    }
}
