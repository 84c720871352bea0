//! Agreement types shared across the crate.
//!
//! - [`Round`]: the height of the ledger the protocol is trying to extend. Exactly one block is
//!   certified per round.
//! - [`Period`]: an attempt to agree within a round. A period is abandoned (and the next one
//!   entered) when the participants fail to certify a value in time.
//! - [`Step`]: a voting phase within a period (propose, soft, cert, and one or more next steps).
//! - [`Address`], [`Credential`], [`ProposalValue`], [`UnauthenticatedVote`] and [`Vote`]: the
//!   immutable values carried by votes.
//!
//! All types encode to a fixed number of bytes so that persisted agreement state can be
//! restored and replayed without ambiguity.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::sha256::Digest;
use commonware_utils::hex;
use std::fmt::{self, Debug, Display, Formatter};

macro_rules! impl_counter {
    ($name:ident, $label:literal) => {
        impl $name {
            /// Returns the zero value.
            pub const fn zero() -> Self {
                Self(0)
            }

            /// Creates a new value from a u64.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying u64 value.
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns the next value.
            ///
            /// # Panics
            ///
            /// Panics on overflow of u64::MAX.
            pub const fn next(self) -> Self {
                Self(self.0.checked_add(1).expect(concat!($label, " overflow")))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Write for $name {
            fn write(&self, buf: &mut impl BufMut) {
                self.0.write(buf);
            }
        }

        impl Read for $name {
            type Cfg = ();

            fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
                Ok(Self(u64::read(buf)?))
            }
        }

        impl FixedSize for $name {
            const SIZE: usize = u64::SIZE;
        }
    };
}

/// The height of the ledger being agreed upon.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Round(u64);
impl_counter!(Round, "round");

/// An attempt to agree on a value within a [Round].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(u64);
impl_counter!(Period, "period");

/// A voting phase within a [Period].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Step(u64);
impl_counter!(Step, "step");

impl Step {
    /// Proposal-votes (credentials competing to be the period's leader).
    pub const PROPOSE: Self = Self(0);
    /// Soft-votes for the period's lowest-credential proposal.
    pub const SOFT: Self = Self(1);
    /// Cert-votes for a soft-certified proposal.
    pub const CERT: Self = Self(2);
    /// First of the next-vote steps (every later step is also a next step).
    pub const NEXT: Self = Self(3);

    /// Returns true if votes at this step compete on credential rather than on weight.
    pub const fn is_propose(self) -> bool {
        self.0 == Self::PROPOSE.0
    }
}

const ADDRESS_LENGTH: usize = 32;

/// Identity of a participant.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(value: [u8; ADDRESS_LENGTH]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Write for Address {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Address {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        Ok(Self(<[u8; ADDRESS_LENGTH]>::read(buf)?))
    }
}

impl FixedSize for Address {
    const SIZE: usize = ADDRESS_LENGTH;
}

/// Output of sortition attached to a vote.
///
/// Credentials are compared only through [Credential::less]. A lower output is a better
/// ("more winning") credential.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Credential {
    /// Voting power selected by sortition.
    pub weight: u64,
    /// Value credentials are ordered by.
    pub output: Digest,
}

impl Credential {
    pub const fn new(weight: u64, output: Digest) -> Self {
        Self { weight, output }
    }

    /// Returns true if `self` is strictly lower than `other`. Equal credentials are never less.
    pub fn less(&self, other: &Self) -> bool {
        self.output.as_ref() < other.output.as_ref()
    }
}

impl Write for Credential {
    fn write(&self, buf: &mut impl BufMut) {
        self.weight.write(buf);
        self.output.write(buf);
    }
}

impl Read for Credential {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let weight = u64::read(buf)?;
        let output = Digest::read(buf)?;
        Ok(Self { weight, output })
    }
}

impl FixedSize for Credential {
    const SIZE: usize = u64::SIZE + Digest::SIZE;
}

/// Identifies a candidate block for a round.
///
/// The all-zero value is [ProposalValue::bottom], which stands for "no proposal".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProposalValue {
    /// Period in which the block was first proposed.
    pub original_period: Period,
    /// Participant that first proposed the block.
    pub original_proposer: Address,
    /// Digest of the block contents.
    pub block_digest: Digest,
    /// Digest of the proposal encoding (block plus proposer metadata).
    pub encoding_digest: Digest,
}

impl ProposalValue {
    pub const fn new(
        original_period: Period,
        original_proposer: Address,
        block_digest: Digest,
        encoding_digest: Digest,
    ) -> Self {
        Self {
            original_period,
            original_proposer,
            block_digest,
            encoding_digest,
        }
    }

    /// The value representing "no proposal".
    pub fn bottom() -> Self {
        Self {
            original_period: Period::zero(),
            original_proposer: Address::default(),
            block_digest: Digest::from([0u8; 32]),
            encoding_digest: Digest::from([0u8; 32]),
        }
    }

    /// Returns true if this is [ProposalValue::bottom].
    pub fn is_bottom(&self) -> bool {
        *self == Self::bottom()
    }
}

impl Default for ProposalValue {
    fn default() -> Self {
        Self::bottom()
    }
}

impl Write for ProposalValue {
    fn write(&self, buf: &mut impl BufMut) {
        self.original_period.write(buf);
        self.original_proposer.write(buf);
        self.block_digest.write(buf);
        self.encoding_digest.write(buf);
    }
}

impl Read for ProposalValue {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let original_period = Period::read(buf)?;
        let original_proposer = Address::read(buf)?;
        let block_digest = Digest::read(buf)?;
        let encoding_digest = Digest::read(buf)?;
        Ok(Self {
            original_period,
            original_proposer,
            block_digest,
            encoding_digest,
        })
    }
}

impl FixedSize for ProposalValue {
    const SIZE: usize = Period::SIZE + Address::SIZE + Digest::SIZE + Digest::SIZE;
}

/// A vote as received from the network, before its credential has been verified.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnauthenticatedVote {
    pub sender: Address,
    pub round: Round,
    pub period: Period,
    pub step: Step,
    pub proposal: ProposalValue,
}

impl UnauthenticatedVote {
    pub const fn new(
        sender: Address,
        round: Round,
        period: Period,
        step: Step,
        proposal: ProposalValue,
    ) -> Self {
        Self {
            sender,
            round,
            period,
            step,
            proposal,
        }
    }
}

impl Write for UnauthenticatedVote {
    fn write(&self, buf: &mut impl BufMut) {
        self.sender.write(buf);
        self.round.write(buf);
        self.period.write(buf);
        self.step.write(buf);
        self.proposal.write(buf);
    }
}

impl Read for UnauthenticatedVote {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let sender = Address::read(buf)?;
        let round = Round::read(buf)?;
        let period = Period::read(buf)?;
        let step = Step::read(buf)?;
        let proposal = ProposalValue::read(buf)?;
        Ok(Self {
            sender,
            round,
            period,
            step,
            proposal,
        })
    }
}

impl FixedSize for UnauthenticatedVote {
    const SIZE: usize =
        Address::SIZE + Round::SIZE + Period::SIZE + Step::SIZE + ProposalValue::SIZE;
}

/// A vote whose credential has passed verification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Vote {
    pub raw: UnauthenticatedVote,
    pub credential: Credential,
}

impl Vote {
    pub const fn new(raw: UnauthenticatedVote, credential: Credential) -> Self {
        Self { raw, credential }
    }

    pub const fn sender(&self) -> Address {
        self.raw.sender
    }

    pub const fn round(&self) -> Round {
        self.raw.round
    }

    pub const fn period(&self) -> Period {
        self.raw.period
    }

    pub const fn step(&self) -> Step {
        self.raw.step
    }

    pub const fn proposal(&self) -> ProposalValue {
        self.raw.proposal
    }
}

impl Write for Vote {
    fn write(&self, buf: &mut impl BufMut) {
        self.raw.write(buf);
        self.credential.write(buf);
    }
}

impl Read for Vote {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let raw = UnauthenticatedVote::read(buf)?;
        let credential = Credential::read(buf)?;
        Ok(Self { raw, credential })
    }
}

impl FixedSize for Vote {
    const SIZE: usize = UnauthenticatedVote::SIZE + Credential::SIZE;
}
