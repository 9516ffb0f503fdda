//! `delegated-fs-core` stores per-(user, application) records on behalf of
//! users who delegated write access to an application's key.
//!
//! Every write carries a [`DelegatedProof`]: an authorization service signed
//! `user ‖ delegated ‖ application`, and the delegated key signed
//! `nonce ‖ data`. The [`DelegatedFs`] engine checks the payload size, the
//! nonce and the signature chain, uploads the record to a content-addressed
//! store and then records the returned hash in a local index. The index can
//! be checkpointed as a single root hash and rebuilt from it.
//!
//! Both backends are capabilities ([`LocalIndex`], [`ContentStore`]) with
//! in-memory implementations always available and `SQLite` / pinning-service
//! implementations behind the `sqlite` and `pinning` features.
#![deny(clippy::all, clippy::pedantic, clippy::nursery, missing_docs)]

mod error;
pub use error::*;

pub mod primitives;
pub use primitives::{canonicalize_address, canonicalize_signature, EthAddress, EthSignature};

mod types;
pub use types::*;

pub mod delegation;
pub use delegation::{DelegationMessage, DelegationOutcome, DelegationVerifier, ProofVerifier};

pub mod snapshot;

pub mod index;
pub use index::{LocalIndex, MemoryIndex};
#[cfg(feature = "sqlite")]
pub use index::SqliteIndex;

pub mod store;
pub use store::{ContentStore, MemoryContentStore};
#[cfg(feature = "pinning")]
pub use store::{PinataStore, PinningConfig};

mod config;
pub use config::*;

mod engine;
pub use engine::*;

pub mod logger;
