//! Reasons a vote is filtered.
//!
//! None of these are failures of the node: they are carried inside
//! [crate::Event::VoteFiltered] so the caller can log, count, or (for equivocation) keep the
//! vote as evidence.

use crate::types::{Address, Period, Round, Step};
use thiserror::Error;

/// Why a [crate::seeker::ProposalSeeker] did not take a vote.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SeekerError {
    #[error("proposal seeker is already frozen")]
    Frozen,
    #[error("credential from {new_sender} is not less than credential from {lowest_sender}")]
    NotLess {
        new_sender: Address,
        lowest_sender: Address,
    },
}

/// Why a state machine filtered a vote.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("sender {sender} already sent a proposal-vote in round {round} period {period}")]
    DuplicateSender {
        sender: Address,
        round: Round,
        period: Period,
    },
    #[error("value already staged")]
    AlreadyStaged,
    #[error("filtered vote: {0}")]
    Seeker(#[from] SeekerError),
    #[error("sender {sender} already voted in round {round} period {period} step {step}")]
    DuplicateVote {
        sender: Address,
        round: Round,
        period: Period,
        step: Step,
    },
    #[error("sender {sender} already equivocated in round {round} period {period} step {step}")]
    AlreadyEquivocated {
        sender: Address,
        round: Round,
        period: Period,
        step: Step,
    },
}

impl Error {
    /// Short label used to group filtered votes in metrics.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::DuplicateSender { .. } => "duplicate_sender",
            Self::AlreadyStaged => "already_staged",
            Self::Seeker(SeekerError::Frozen) => "seeker_frozen",
            Self::Seeker(SeekerError::NotLess { .. }) => "seeker_not_less",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::AlreadyEquivocated { .. } => "already_equivocated",
        }
    }
}
