//! Core domain for the deploy hook.
//!
//! This crate decides *whether* a webhook delivery should deploy and *what* it
//! should deploy. It never touches the network or the filesystem; the
//! `gitsync`, `notify`, and `listener` crates implement the ports defined here.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** Pure functions over decoded JSON and
//! the immutable [`ProviderConfig`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepoName`, `BranchName`, `DeliveryId`, etc.) |
//! | [`types`] | `Provider`, `RemoteRef`, `DeployIntent`, `SyncOutcome`, `Timestamp` |
//! | [`config`] | `ProviderConfig`, `ProviderSettings`, `WatchEntry` |
//! | [`allowlist`] | Peer-address authorisation |
//! | [`classify`] | Payload shape → provider |
//! | [`normalize`] | Provider payload → `DeployIntent` |
//! | [`ports`] | `RepoSynchronizer` and `NotificationSink` traits |
//! | [`errors`] | `DeployError`, `NotifyError` |
//!
//! ## Flow
//!
//! ```text
//! peer address ──► AddressAllowlist ──► classify ──► ProviderNormalizer
//!                                                        │ DeployIntent
//!                                       NotificationSink ◄── RepoSynchronizer
//! ```

pub mod allowlist;
pub mod classify;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod normalize;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use allowlist::AddressAllowlist;
pub use classify::{classify, Classification};
pub use config::{ProviderConfig, ProviderSettings, WatchEntry};
pub use errors::{DeployError, NotifyError};
pub use identifiers::{BranchName, DeliveryId, EmptyIdentifier, RemoteUser, RepoName};
pub use normalize::{
    normalize, normalizer_for, resolve, AzureDevOpsNormalizer, BitbucketNormalizer,
    GitHubNormalizer, ProviderNormalizer,
};
pub use ports::{NotificationSink, RepoSynchronizer};
pub use types::{DeployIntent, Provider, RemoteRef, SyncOutcome, SyncStep, Timestamp};
