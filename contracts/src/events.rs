//! # Contract Events
//!
//! Every state change in the registry, a project token or a redemption
//! vault is recorded as a typed event in that component's outbox. Nothing
//! is delivered from inside an operation; whoever drives the contracts
//! (the node, a test) drains the outboxes once the operation has returned
//! and decides what to do with them: log, count, forward to an indexer.
//!
//! Outboxes are transient. They are not persisted and a reloaded registry
//! starts with empty ones.

use chrono::{DateTime, Utc};
use offtake_protocol::identity::Address;
use serde::Serialize;

use crate::registry::ProjectId;

/// Events emitted by a [`ProjectToken`](crate::project_token::ProjectToken).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: u128,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: u128,
    },
    Mint {
        to: Address,
        amount: u128,
    },
    /// `by` is the holder for a self-burn, or the delegate for `burn_from`.
    Burn {
        from: Address,
        by: Address,
        amount: u128,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    AdminTransferred {
        previous: Address,
        new: Address,
    },
}

/// Events emitted by a [`RedemptionVault`](crate::redemption_vault::RedemptionVault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    RedemptionActivated {
        deposited: u128,
        total_supply: u128,
        rate: u128,
        at: DateTime<Utc>,
    },
    Redeemed {
        holder: Address,
        token_amount: u128,
        payout: u128,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    AdminTransferred {
        previous: Address,
        new: Address,
    },
}

/// Events emitted by the [`ProjectRegistry`](crate::registry::ProjectRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    ProjectProposed {
        id: ProjectId,
        developer: Address,
        name: String,
        symbol: String,
        initial_supply: u128,
    },
    ProjectApproved {
        id: ProjectId,
        token: Address,
    },
    ProjectDenied {
        id: ProjectId,
    },
    VaultDeployed {
        id: ProjectId,
        vault: Address,
        settlement_asset: Address,
    },
    AdminTransferred {
        previous: Address,
        new: Address,
    },
}

/// An event tagged with the component that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractEvent {
    Registry(RegistryEvent),
    Token { token: Address, event: TokenEvent },
    Vault { vault: Address, event: VaultEvent },
}

impl ContractEvent {
    /// Short dotted name, e.g. `registry.project_approved` or `vault.redeemed`.
    pub fn name(&self) -> &'static str {
        match self {
            ContractEvent::Registry(e) => match e {
                RegistryEvent::ProjectProposed { .. } => "registry.project_proposed",
                RegistryEvent::ProjectApproved { .. } => "registry.project_approved",
                RegistryEvent::ProjectDenied { .. } => "registry.project_denied",
                RegistryEvent::VaultDeployed { .. } => "registry.vault_deployed",
                RegistryEvent::AdminTransferred { .. } => "registry.admin_transferred",
            },
            ContractEvent::Token { event, .. } => match event {
                TokenEvent::Transfer { .. } => "token.transfer",
                TokenEvent::Approval { .. } => "token.approval",
                TokenEvent::Mint { .. } => "token.mint",
                TokenEvent::Burn { .. } => "token.burn",
                TokenEvent::Paused { .. } => "token.paused",
                TokenEvent::Unpaused { .. } => "token.unpaused",
                TokenEvent::AdminTransferred { .. } => "token.admin_transferred",
            },
            ContractEvent::Vault { event, .. } => match event {
                VaultEvent::RedemptionActivated { .. } => "vault.redemption_activated",
                VaultEvent::Redeemed { .. } => "vault.redeemed",
                VaultEvent::Paused { .. } => "vault.paused",
                VaultEvent::Unpaused { .. } => "vault.unpaused",
                VaultEvent::AdminTransferred { .. } => "vault.admin_transferred",
            },
        }
    }
}
