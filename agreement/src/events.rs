//! Events exchanged between the [crate::Router] and the state machines it owns.
//!
//! [Event] is the router-level union of everything that can be delivered or emitted. Each state
//! machine only understands a closed subset of it ([ProposalEvent] for the proposal tracker and
//! [VoteEvent] for the vote tracker). Converting an [Event] into the wrong subset is a routing
//! bug, never a network condition.

use crate::{
    error::Error,
    seeker::LateCredentialTrackingEffect,
    types::{Address, Period, ProposalValue, Round, Step, UnauthenticatedVote, Vote},
};

/// Identifies the kind of state machine an event is handled by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// One [crate::tracker::ProposalTracker] per `(round, period)`.
    ProposalPeriod,
    /// One [crate::votes::VoteTracker] per `(round, period, step)`.
    VoteStep,
}

/// Discriminant of an [Event].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Empty,
    VoteFilterRequest,
    VoteVerified,
    VoteFiltered,
    ProposalAccepted,
    ProposalFrozen,
    ReadLowestVote,
    ReadStaging,
    SoftThreshold,
    CertThreshold,
    NextThreshold,
}

/// The step at which a threshold of votes was observed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    Soft,
    Cert,
    Next,
}

impl ThresholdKind {
    /// Returns the kind of threshold votes at `step` produce, if any.
    pub const fn from_step(step: Step) -> Option<Self> {
        match step.get() {
            0 => None,
            1 => Some(Self::Soft),
            2 => Some(Self::Cert),
            _ => Some(Self::Next),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Cert => "cert",
            Self::Next => "next",
        }
    }
}

/// A vote that was dropped, along with why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filtered {
    pub sender: Address,
    pub round: Round,
    pub period: Period,
    pub step: Step,
    pub err: Error,
    /// Set when a verified proposal-vote still improved late credential tracking.
    pub late_credential_tracking_note: LateCredentialTrackingEffect,
}

impl Filtered {
    pub(crate) fn new(vote: &UnauthenticatedVote, err: Error) -> Self {
        Self {
            sender: vote.sender,
            round: vote.round,
            period: vote.period,
            step: vote.step,
            err,
            late_credential_tracking_note: LateCredentialTrackingEffect::default(),
        }
    }

    pub(crate) fn with_note(mut self, note: LateCredentialTrackingEffect) -> Self {
        self.late_credential_tracking_note = note;
        self
    }
}

/// The proposal-value relevant to a period changed (a better proposal-vote or a staged value).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProposalAccepted {
    pub round: Round,
    pub period: Period,
    pub proposal: ProposalValue,
}

/// Stops a period from accepting better proposal-vote credentials.
///
/// Delivered with [ProposalValue::bottom] and echoed with the value the period settled on
/// (still bottom if no proposal-vote was accepted in time).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frozen {
    pub round: Round,
    pub period: Period,
    pub proposal: ProposalValue,
}

/// Request (and response) for the lowest-credential proposal-votes of a period.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LowestVote {
    pub round: Round,
    pub period: Period,
    /// Lowest vote accepted before freezing.
    pub vote: Option<Vote>,
    /// Lowest vote observed, including after freezing.
    pub lowest_including_late: Option<Vote>,
}

impl LowestVote {
    pub const fn filled(&self) -> bool {
        self.vote.is_some()
    }

    pub const fn has_lowest_including_late(&self) -> bool {
        self.lowest_including_late.is_some()
    }
}

/// Request (and response) for the value staged in a period.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Staging {
    pub round: Round,
    pub period: Period,
    pub proposal: ProposalValue,
}

/// Voting weight for `proposal` at `step` crossed the quorum.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Threshold {
    pub kind: ThresholdKind,
    pub round: Round,
    pub period: Period,
    pub step: Step,
    pub proposal: ProposalValue,
}

/// Any event delivered to or emitted by the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Nothing happened.
    Empty,
    /// Asks whether an unverified vote would be dropped, before paying for verification.
    VoteFilterRequest(UnauthenticatedVote),
    /// A vote passed verification.
    VoteVerified(Vote),
    VoteFiltered(Filtered),
    ProposalAccepted(ProposalAccepted),
    ProposalFrozen(Frozen),
    ReadLowestVote(LowestVote),
    ReadStaging(Staging),
    Threshold(Threshold),
}

impl Event {
    /// Freeze the lowest-credential proposal of `(round, period)`.
    pub fn freeze(round: Round, period: Period) -> Self {
        Self::ProposalFrozen(Frozen {
            round,
            period,
            proposal: ProposalValue::bottom(),
        })
    }

    pub const fn read_lowest_vote(round: Round, period: Period) -> Self {
        Self::ReadLowestVote(LowestVote {
            round,
            period,
            vote: None,
            lowest_including_late: None,
        })
    }

    pub fn read_staging(round: Round, period: Period) -> Self {
        Self::ReadStaging(Staging {
            round,
            period,
            proposal: ProposalValue::bottom(),
        })
    }

    pub const fn soft_threshold(round: Round, period: Period, proposal: ProposalValue) -> Self {
        Self::Threshold(Threshold {
            kind: ThresholdKind::Soft,
            round,
            period,
            step: Step::SOFT,
            proposal,
        })
    }

    pub const fn cert_threshold(round: Round, period: Period, proposal: ProposalValue) -> Self {
        Self::Threshold(Threshold {
            kind: ThresholdKind::Cert,
            round,
            period,
            step: Step::CERT,
            proposal,
        })
    }

    pub const fn kind(&self) -> EventType {
        match self {
            Self::Empty => EventType::Empty,
            Self::VoteFilterRequest(_) => EventType::VoteFilterRequest,
            Self::VoteVerified(_) => EventType::VoteVerified,
            Self::VoteFiltered(_) => EventType::VoteFiltered,
            Self::ProposalAccepted(_) => EventType::ProposalAccepted,
            Self::ProposalFrozen(_) => EventType::ProposalFrozen,
            Self::ReadLowestVote(_) => EventType::ReadLowestVote,
            Self::ReadStaging(_) => EventType::ReadStaging,
            Self::Threshold(t) => match t.kind {
                ThresholdKind::Soft => EventType::SoftThreshold,
                ThresholdKind::Cert => EventType::CertThreshold,
                ThresholdKind::Next => EventType::NextThreshold,
            },
        }
    }

    /// Returns the state machine that handles this event when delivered to the router.
    ///
    /// Events that are only ever emitted (and next thresholds, which no state machine here
    /// consumes) return `None`.
    pub const fn tag(&self) -> Option<Tag> {
        match self {
            Self::VoteFilterRequest(raw) => Some(Self::vote_tag(raw.step)),
            Self::VoteVerified(vote) => Some(Self::vote_tag(vote.raw.step)),
            Self::ProposalFrozen(_) | Self::ReadLowestVote(_) | Self::ReadStaging(_) => {
                Some(Tag::ProposalPeriod)
            }
            Self::Threshold(t) => match t.kind {
                ThresholdKind::Soft | ThresholdKind::Cert => Some(Tag::ProposalPeriod),
                ThresholdKind::Next => None,
            },
            Self::Empty | Self::VoteFiltered(_) | Self::ProposalAccepted(_) => None,
        }
    }

    const fn vote_tag(step: Step) -> Tag {
        if step.is_propose() {
            Tag::ProposalPeriod
        } else {
            Tag::VoteStep
        }
    }

    /// Returns the `(round, period, step)` the event concerns, if any.
    pub const fn position(&self) -> Option<(Round, Period, Step)> {
        match self {
            Self::Empty => None,
            Self::VoteFilterRequest(raw) => Some((raw.round, raw.period, raw.step)),
            Self::VoteVerified(vote) => Some((vote.raw.round, vote.raw.period, vote.raw.step)),
            Self::VoteFiltered(f) => Some((f.round, f.period, f.step)),
            Self::ProposalAccepted(e) => Some((e.round, e.period, Step::PROPOSE)),
            Self::ProposalFrozen(e) => Some((e.round, e.period, Step::PROPOSE)),
            Self::ReadLowestVote(e) => Some((e.round, e.period, Step::PROPOSE)),
            Self::ReadStaging(e) => Some((e.round, e.period, Step::PROPOSE)),
            Self::Threshold(t) => Some((t.round, t.period, t.step)),
        }
    }
}

/// Events handled by a [crate::tracker::ProposalTracker].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposalEvent {
    VoteFilterRequest(UnauthenticatedVote),
    VoteVerified(Vote),
    ProposalFrozen(Frozen),
    ReadLowestVote(LowestVote),
    /// A soft or cert threshold.
    Threshold(Threshold),
    ReadStaging(Staging),
}

impl TryFrom<Event> for ProposalEvent {
    type Error = Event;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if event.tag() != Some(Tag::ProposalPeriod) {
            return Err(event);
        }
        match event {
            Event::VoteFilterRequest(raw) => Ok(Self::VoteFilterRequest(raw)),
            Event::VoteVerified(vote) => Ok(Self::VoteVerified(vote)),
            Event::ProposalFrozen(e) => Ok(Self::ProposalFrozen(e)),
            Event::ReadLowestVote(e) => Ok(Self::ReadLowestVote(e)),
            Event::Threshold(t) => Ok(Self::Threshold(t)),
            Event::ReadStaging(e) => Ok(Self::ReadStaging(e)),
            other => Err(other),
        }
    }
}

/// Events handled by a [crate::votes::VoteTracker].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteEvent {
    FilterRequest(UnauthenticatedVote),
    Verified(Vote),
}

impl TryFrom<Event> for VoteEvent {
    type Error = Event;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if event.tag() != Some(Tag::VoteStep) {
            return Err(event);
        }
        match event {
            Event::VoteFilterRequest(raw) => Ok(Self::FilterRequest(raw)),
            Event::VoteVerified(vote) => Ok(Self::Verified(vote)),
            other => Err(other),
        }
    }
}
