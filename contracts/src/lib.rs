//! # Offtake Contracts
//!
//! The ledger core of offtake: three components that together tokenize a
//! future delivery and later redeem it.
//!
//! - **Registry**: proposal → approval/denial lifecycle; deploys one token
//!   per approved project and, on demand, one vault.
//! - **Project Token**: transferable forward-claim units with delegated
//!   allowances, administrator mint, burn-on-behalf and a pause switch.
//! - **Redemption Vault**: fixes a pro-rata rate once, then burns tokens
//!   for settlement-asset payouts.
//!
//! Plus **events** (per-component outboxes) and **persistence** (versioned
//! records in an `OfftakeDB`).
//!
//! ## Design Principles
//!
//! 1. Every mutating operation takes the caller's identity explicitly.
//! 2. All monetary arithmetic is checked `u128`.
//! 3. An operation either fully succeeds or leaves no trace.
//! 4. State transitions are explicit enum variants, and terminal states stay
//!    terminal.

pub mod events;
pub mod persistence;
pub mod project_token;
pub mod redemption_vault;
pub mod registry;

pub use events::{ContractEvent, RegistryEvent, TokenEvent, VaultEvent};
pub use persistence::{RegistryStore, StoreError};
pub use project_token::{ProjectToken, TokenError};
pub use redemption_vault::{Redemption, RedemptionVault, VaultError, VaultStatus};
pub use registry::{Project, ProjectId, ProjectProposal, ProjectRegistry, ProjectStatus, RegistryError};
