//! De-duplicate proposal-votes and track the proposal-value of a period.

use crate::{
    error::Error,
    events::{Event, Filtered, ProposalAccepted, ProposalEvent},
    seeker::ProposalSeeker,
    types::{Address, ProposalValue},
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::collections::BTreeSet;
use tracing::debug;

/// Tracks the proposal-votes of a single `(round, period)`.
///
/// A sender is only ever heard once per period: a duplicate (or equivocating) proposal-vote is
/// dropped. Until a value is staged by a soft or cert threshold, the tracker follows the
/// lowest-credential proposal-vote. Once staged, credential competition no longer matters for
/// the period.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposalTracker {
    duplicate: BTreeSet<Address>,
    freezer: ProposalSeeker,
    staging: ProposalValue,
}

impl ProposalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a proposal-vote from `sender` was already seen this period.
    pub fn seen(&self, sender: &Address) -> bool {
        self.duplicate.contains(sender)
    }

    pub const fn freezer(&self) -> &ProposalSeeker {
        &self.freezer
    }

    /// Returns the staged value ([ProposalValue::bottom] if none).
    pub const fn staging(&self) -> &ProposalValue {
        &self.staging
    }

    /// Handles a single event and returns the event it produces.
    ///
    /// - `VoteFilterRequest`: [Event::VoteFiltered] if the sender was already seen, otherwise
    ///   [Event::Empty].
    /// - `VoteVerified`: [Event::VoteFiltered] if the sender was already seen, if a value is
    ///   staged, or if the seeker rejects the vote. Otherwise [Event::ProposalAccepted].
    /// - `ProposalFrozen`: freezes the seeker and echoes the event carrying the lowest
    ///   proposal seen before freezing (bottom if none).
    /// - `ReadLowestVote`: echoes the event carrying the seeker's votes.
    /// - `Threshold`: stages the threshold's value (a later threshold always wins) and returns
    ///   [Event::ProposalAccepted].
    /// - `ReadStaging`: echoes the event carrying the staged value.
    pub fn handle(&mut self, event: ProposalEvent) -> Event {
        match event {
            ProposalEvent::VoteFilterRequest(raw) => {
                if self.duplicate.contains(&raw.sender) {
                    let err = Error::DuplicateSender {
                        sender: raw.sender,
                        round: raw.round,
                        period: raw.period,
                    };
                    return Event::VoteFiltered(Filtered::new(&raw, err));
                }
                Event::Empty
            }
            ProposalEvent::VoteVerified(vote) => {
                let raw = vote.raw;
                if !self.duplicate.insert(raw.sender) {
                    let err = Error::DuplicateSender {
                        sender: raw.sender,
                        round: raw.round,
                        period: raw.period,
                    };
                    return Event::VoteFiltered(Filtered::new(&raw, err));
                }

                // Late tracking state is kept even if the vote does not change the decision
                let (freezer, effect, result) = self.freezer.accept(vote);
                self.freezer.copy_late_credential_tracking_state(&freezer);
                if !self.staging.is_bottom() {
                    return Event::VoteFiltered(
                        Filtered::new(&raw, Error::AlreadyStaged).with_note(effect),
                    );
                }
                if let Err(err) = result {
                    return Event::VoteFiltered(Filtered::new(&raw, err.into()).with_note(effect));
                }
                self.freezer = freezer;

                Event::ProposalAccepted(ProposalAccepted {
                    round: raw.round,
                    period: raw.period,
                    proposal: raw.proposal,
                })
            }
            ProposalEvent::ProposalFrozen(mut frozen) => {
                frozen.proposal = self
                    .freezer
                    .lowest()
                    .map(|vote| vote.proposal())
                    .unwrap_or_else(ProposalValue::bottom);
                self.freezer = self.freezer.freeze();
                Event::ProposalFrozen(frozen)
            }
            ProposalEvent::ReadLowestVote(mut lowest) => {
                lowest.vote = self.freezer.lowest().copied();
                lowest.lowest_including_late = self.freezer.lowest_including_late().copied();
                Event::ReadLowestVote(lowest)
            }
            ProposalEvent::Threshold(threshold) => {
                if !self.staging.is_bottom() && self.staging != threshold.proposal {
                    debug!(
                        round = %threshold.round,
                        period = %threshold.period,
                        previous = ?self.staging,
                        staged = ?threshold.proposal,
                        "overwriting staged value"
                    );
                }
                self.staging = threshold.proposal;
                Event::ProposalAccepted(ProposalAccepted {
                    round: threshold.round,
                    period: threshold.period,
                    proposal: threshold.proposal,
                })
            }
            ProposalEvent::ReadStaging(mut staging) => {
                staging.proposal = self.staging;
                Event::ReadStaging(staging)
            }
        }
    }
}

impl Write for ProposalTracker {
    fn write(&self, buf: &mut impl BufMut) {
        let len = u32::try_from(self.duplicate.len()).expect("too many senders");
        len.write(buf);
        for sender in &self.duplicate {
            sender.write(buf);
        }
        self.freezer.write(buf);
        self.staging.write(buf);
    }
}

impl EncodeSize for ProposalTracker {
    fn encode_size(&self) -> usize {
        u32::SIZE
            + self.duplicate.len() * Address::SIZE
            + self.freezer.encode_size()
            + ProposalValue::SIZE
    }
}

impl Read for ProposalTracker {
    /// Maximum number of senders a tracker may have seen.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max_senders: &usize) -> Result<Self, CodecError> {
        let len = u32::read(buf)? as usize;
        if len > *max_senders {
            return Err(CodecError::Invalid(
                "agreement::ProposalTracker",
                "too many senders",
            ));
        }
        let mut duplicate = BTreeSet::new();
        for _ in 0..len {
            if !duplicate.insert(Address::read(buf)?) {
                return Err(CodecError::Invalid(
                    "agreement::ProposalTracker",
                    "duplicate sender",
                ));
            }
        }
        let freezer = ProposalSeeker::read(buf)?;
        let staging = ProposalValue::read(buf)?;
        Ok(Self {
            duplicate,
            freezer,
            staging,
        })
    }
}
