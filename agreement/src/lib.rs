//! Select the lowest-credential proposal of each period and track weighted votes toward a threshold.
//!
//! Each `(round, period)` of agreement has a [tracker::ProposalTracker] that accepts
//! proposal-votes from distinct senders, keeps the one with the lowest credential, freezes it
//! when asked, and stages the value of any soft or cert threshold. Each later step of a period
//! has a [votes::VoteTracker] that sums credential weight per value and emits a single
//! threshold. The [Router] owns all of these, routes [Event]s to them by [Tag], and discards
//! them once their round concludes.
//!
//! Every state machine is synchronous and deterministic: the same sequence of events always
//! produces the same outputs, and [Router::checkpoint] always produces the same bytes for the
//! same state.
//!
//! # Status
//!
//! `commonware-agreement` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod router;
pub mod seeker;
pub mod tracker;
pub mod types;
pub mod votes;

pub use config::{Config, ConfigError};
pub use error::{Error, SeekerError};
pub use events::{Event, EventType, Tag, ThresholdKind};
pub use router::{RestoreError, Router};
pub use types::{Address, Credential, Period, ProposalValue, Round, Step, UnauthenticatedVote, Vote};
