//! Find the proposal-vote with the lowest credential in a period.

use crate::{error::SeekerError, types::Vote};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};

/// How useful a proposal-vote's credential was for tracking the lowest credential seen,
/// including credentials that arrived after the seeker was frozen.
///
/// The caller uses this to tune how long to wait for the lowest credential in later periods.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LateCredentialTrackingEffect {
    #[default]
    NoLateCredentialTrackingImpact,
    VerifiedBetterLateCredentialForTracking,
}

/// Seeks the vote with the lowest credential until [ProposalSeeker::freeze] is called.
///
/// `lowest` is the value the period soft-votes for and never changes once frozen.
/// `lowest_including_late` keeps following the lowest credential ever observed, even after
/// freezing, and must never feed back into `lowest`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposalSeeker {
    lowest: Option<Vote>,
    frozen: bool,
    lowest_including_late: Option<Vote>,
}

impl ProposalSeeker {
    /// Returns the vote with the lowest credential accepted before freezing.
    pub const fn lowest(&self) -> Option<&Vote> {
        self.lowest.as_ref()
    }

    /// Returns true if any vote was accepted before freezing.
    pub const fn filled(&self) -> bool {
        self.lowest.is_some()
    }

    pub const fn frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the vote with the lowest credential observed, including votes seen after freezing.
    pub const fn lowest_including_late(&self) -> Option<&Vote> {
        self.lowest_including_late.as_ref()
    }

    pub const fn has_lowest_including_late(&self) -> bool {
        self.lowest_including_late.is_some()
    }

    /// Compares `vote` with the current lowest vote and returns the seeker that results.
    ///
    /// The returned error is set if the seeker was already frozen or if the credential was not
    /// strictly less than the current lowest. A frozen seeker still updates its late tracking
    /// state, which the caller must carry over with
    /// [ProposalSeeker::copy_late_credential_tracking_state] even when the vote is rejected.
    pub fn accept(
        &self,
        vote: Vote,
    ) -> (Self, LateCredentialTrackingEffect, Result<(), SeekerError>) {
        let mut next = *self;
        if self.frozen {
            let mut effect = LateCredentialTrackingEffect::NoLateCredentialTrackingImpact;
            let better = match &self.lowest_including_late {
                None => true,
                Some(late) => vote.credential.less(&late.credential),
            };
            if better {
                next.lowest_including_late = Some(vote);
                effect = LateCredentialTrackingEffect::VerifiedBetterLateCredentialForTracking;
            }
            return (next, effect, Err(SeekerError::Frozen));
        }

        if let Some(lowest) = &self.lowest {
            if !vote.credential.less(&lowest.credential) {
                return (
                    next,
                    LateCredentialTrackingEffect::NoLateCredentialTrackingImpact,
                    Err(SeekerError::NotLess {
                        new_sender: vote.sender(),
                        lowest_sender: lowest.sender(),
                    }),
                );
            }
        }

        next.lowest = Some(vote);
        next.lowest_including_late = Some(vote);
        (
            next,
            LateCredentialTrackingEffect::VerifiedBetterLateCredentialForTracking,
            Ok(()),
        )
    }

    /// Overwrites the late tracking state with that of `other`.
    pub fn copy_late_credential_tracking_state(&mut self, other: &Self) {
        self.lowest_including_late = other.lowest_including_late;
    }

    /// Returns a copy of the seeker that no longer changes `lowest`.
    pub fn freeze(&self) -> Self {
        Self {
            frozen: true,
            ..*self
        }
    }
}

impl Write for ProposalSeeker {
    fn write(&self, buf: &mut impl BufMut) {
        self.lowest.write(buf);
        self.frozen.write(buf);
        self.lowest_including_late.write(buf);
    }
}

impl EncodeSize for ProposalSeeker {
    fn encode_size(&self) -> usize {
        self.lowest.encode_size()
            + self.frozen.encode_size()
            + self.lowest_including_late.encode_size()
    }
}

impl Read for ProposalSeeker {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let lowest = Option::<Vote>::read(buf)?;
        let frozen = bool::read(buf)?;
        let lowest_including_late = Option::<Vote>::read(buf)?;
        if lowest.is_some() && lowest_including_late.is_none() {
            return Err(Error::Invalid(
                "agreement::ProposalSeeker",
                "filled seeker without late tracking state",
            ));
        }
        Ok(Self {
            lowest,
            frozen,
            lowest_including_late,
        })
    }
}
