//! # Project Registry Contract
//!
//! The orchestrator of an offtake deployment. It owns every project record
//! and, in arenas keyed by project id, every project token and redemption
//! vault it has deployed.
//!
//! ## Project lifecycle
//!
//! ```text
//!             ┌── approve_project ──▶ Approved ── deploy_vault (once) ──▶ vault bound
//! Pending ────┤
//!             └── deny_project ─────▶ Denied
//! ```
//!
//! `Approved` and `Denied` are terminal. Approval issues the project's token
//! with the whole proposed supply minted to the administrator's custody.
//!
//! ## Authorization
//!
//! Anyone may propose. A single administrator identity approves, denies,
//! deploys vaults and administers the deployed ledgers. `transfer_admin`
//! hands all of that over in one step: the registry role and the admin role
//! of every token and vault the outgoing administrator still holds.

use chrono::{DateTime, Utc};
use offtake_protocol::config::{MAX_METADATA_LENGTH, MAX_NAME_LENGTH, MAX_SYMBOL_LENGTH};
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::Address;
use offtake_protocol::ledger::SettlementAsset;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{info, warn};

use crate::events::{ContractEvent, RegistryEvent};
use crate::project_token::{ProjectToken, TokenError};
use crate::redemption_vault::{Redemption, RedemptionVault, VaultError};

/// Monotonic project identifier. The first project is 1.
pub type ProjectId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The project name is blank or too long.
    #[error("invalid project name: must be 1..={max} bytes", max = MAX_NAME_LENGTH)]
    InvalidName,

    /// The ticker symbol is blank or too long.
    #[error("invalid project symbol: must be 1..={max} bytes", max = MAX_SYMBOL_LENGTH)]
    InvalidSymbol,

    /// The metadata payload is too long.
    #[error("metadata too long: {0} bytes (max {max})", max = MAX_METADATA_LENGTH)]
    MetadataTooLong(usize),

    /// The initial supply must be positive.
    #[error("initial supply must be greater than zero")]
    ZeroSupply,

    /// The settlement asset reference is unusable for this project.
    #[error("invalid settlement asset {0}: it is the project's own token")]
    InvalidSettlementAsset(Address),

    /// The caller is not the registry administrator.
    #[error("unauthorized: {caller} is not the registry administrator")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// No project has this id.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// No deployed token has this address.
    #[error("no project token at {0}")]
    TokenNotFound(Address),

    /// The project has no token (it is not approved).
    #[error("project {0} has no token")]
    NoToken(ProjectId),

    /// The project has no vault yet.
    #[error("project {0} has no redemption vault")]
    NoVault(ProjectId),

    /// The project was already approved or denied.
    #[error("project {id} was already processed: status is {status}")]
    AlreadyProcessed {
        /// The project.
        id: ProjectId,
        /// Its terminal status.
        status: ProjectStatus,
    },

    /// Vault deployment on a project that is not approved.
    #[error("project {id} is {status}, expected Approved")]
    NotApproved {
        /// The project.
        id: ProjectId,
        /// Its current status.
        status: ProjectStatus,
    },

    /// A vault is already bound to this project.
    #[error("vault already deployed for project {id}: {vault}")]
    VaultAlreadyDeployed {
        /// The project.
        id: ProjectId,
        /// The existing vault.
        vault: Address,
    },

    /// Project ids are exhausted.
    #[error("project id space exhausted")]
    IdOverflow,

    /// A token operation failed.
    #[error("token: {0}")]
    Token(#[from] TokenError),

    /// A vault operation failed.
    #[error("vault: {0}")]
    Vault(#[from] VaultError),
}

impl RegistryError {
    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidName
            | RegistryError::InvalidSymbol
            | RegistryError::MetadataTooLong(_)
            | RegistryError::ZeroSupply
            | RegistryError::InvalidSettlementAsset(_) => ErrorKind::Validation,
            RegistryError::Unauthorized { .. } => ErrorKind::Authorization,
            RegistryError::ProjectNotFound(_)
            | RegistryError::TokenNotFound(_)
            | RegistryError::NoToken(_)
            | RegistryError::NoVault(_) => ErrorKind::NotFound,
            RegistryError::AlreadyProcessed { .. }
            | RegistryError::NotApproved { .. }
            | RegistryError::VaultAlreadyDeployed { .. } => ErrorKind::Lifecycle,
            RegistryError::IdOverflow => ErrorKind::Arithmetic,
            RegistryError::Token(e) => e.kind(),
            RegistryError::Vault(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Review status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    /// Awaiting an administrator decision.
    Pending,
    /// Approved; the project token exists.
    Approved,
    /// Denied; terminal, no token.
    Denied,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Pending => write!(f, "Pending"),
            ProjectStatus::Approved => write!(f, "Approved"),
            ProjectStatus::Denied => write!(f, "Denied"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ProjectStatus::Pending),
            "approved" => Ok(ProjectStatus::Approved),
            "denied" => Ok(ProjectStatus::Denied),
            other => Err(format!("unknown project status: {other}")),
        }
    }
}

/// What a developer submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProposal {
    pub name: String,
    pub symbol: String,
    /// Token units (18 decimals) to mint on approval.
    pub initial_supply: u128,
    /// Free-form description of the underlying delivery, usually a URI.
    pub metadata: String,
}

impl ProjectProposal {
    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(RegistryError::InvalidName);
        }
        if self.symbol.trim().is_empty() || self.symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(RegistryError::InvalidSymbol);
        }
        if self.initial_supply == 0 {
            return Err(RegistryError::ZeroSupply);
        }
        if self.metadata.len() > MAX_METADATA_LENGTH {
            return Err(RegistryError::MetadataTooLong(self.metadata.len()));
        }
        Ok(())
    }
}

/// A project record. Only the registry mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub symbol: String,
    pub initial_supply: u128,
    pub metadata: String,
    pub developer: Address,
    /// Set exactly when `status == Approved`.
    pub token: Option<Address>,
    /// Set at most once, after approval.
    pub vault: Option<Address>,
    pub status: ProjectStatus,
    pub proposed_at: DateTime<Utc>,
    /// Set on the transition out of `Pending`.
    pub processed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ProjectRegistry
// ---------------------------------------------------------------------------

/// Project registry and ledger factory.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    pub(crate) admin: Address,
    pub(crate) next_project_id: ProjectId,
    pub(crate) projects: BTreeMap<ProjectId, Project>,
    pub(crate) tokens: BTreeMap<ProjectId, ProjectToken>,
    pub(crate) vaults: BTreeMap<ProjectId, RedemptionVault>,
    token_index: HashMap<Address, ProjectId>,
    pub(crate) events: Vec<RegistryEvent>,
}

impl ProjectRegistry {
    /// Creates an empty registry administered by `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            next_project_id: 1,
            projects: BTreeMap::new(),
            tokens: BTreeMap::new(),
            vaults: BTreeMap::new(),
            token_index: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Reassembles a registry from persisted parts.
    pub(crate) fn from_parts(
        admin: Address,
        next_project_id: ProjectId,
        projects: BTreeMap<ProjectId, Project>,
        tokens: BTreeMap<ProjectId, ProjectToken>,
        vaults: BTreeMap<ProjectId, RedemptionVault>,
    ) -> Self {
        let token_index = tokens
            .iter()
            .map(|(id, token)| (token.address().clone(), *id))
            .collect();
        Self {
            admin,
            next_project_id,
            projects,
            tokens,
            vaults,
            token_index,
            events: Vec::new(),
        }
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Number of projects ever proposed.
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// The id the next proposal will receive.
    pub fn next_project_id(&self) -> ProjectId {
        self.next_project_id
    }

    // -- Proposal lifecycle -------------------------------------------------

    /// Records a new proposal from `caller`. Open to anyone.
    pub fn propose_project(
        &mut self,
        caller: &Address,
        proposal: ProjectProposal,
    ) -> Result<ProjectId, RegistryError> {
        proposal.validate()?;
        let id = self.next_project_id;
        let next = id.checked_add(1).ok_or(RegistryError::IdOverflow)?;

        let project = Project {
            id,
            name: proposal.name,
            symbol: proposal.symbol,
            initial_supply: proposal.initial_supply,
            metadata: proposal.metadata,
            developer: caller.clone(),
            token: None,
            vault: None,
            status: ProjectStatus::Pending,
            proposed_at: Utc::now(),
            processed_at: None,
        };

        info!(id, developer = %caller, name = %project.name, symbol = %project.symbol, "project proposed");
        self.events.push(RegistryEvent::ProjectProposed {
            id,
            developer: caller.clone(),
            name: project.name.clone(),
            symbol: project.symbol.clone(),
            initial_supply: project.initial_supply,
        });
        self.projects.insert(id, project);
        self.next_project_id = next;
        Ok(id)
    }

    /// Approves a pending project and issues its token. Administrator only.
    ///
    /// Returns the new token's address.
    pub fn approve_project(&mut self, caller: &Address, id: ProjectId) -> Result<Address, RegistryError> {
        self.ensure_admin(caller)?;
        let project = self.pending_project(id)?;

        let token = ProjectToken::issue(
            project.name.clone(),
            project.symbol.clone(),
            self.admin.clone(),
            &self.admin,
            project.initial_supply,
        )?;
        let token_address = token.address().clone();

        let project = self
            .projects
            .get_mut(&id)
            .ok_or(RegistryError::ProjectNotFound(id))?;
        project.token = Some(token_address.clone());
        project.status = ProjectStatus::Approved;
        project.processed_at = Some(Utc::now());

        self.token_index.insert(token_address.clone(), id);
        self.tokens.insert(id, token);

        info!(id, token = %token_address, "project approved");
        self.events.push(RegistryEvent::ProjectApproved {
            id,
            token: token_address.clone(),
        });
        Ok(token_address)
    }

    /// Denies a pending project. Terminal. Administrator only.
    pub fn deny_project(&mut self, caller: &Address, id: ProjectId) -> Result<(), RegistryError> {
        self.ensure_admin(caller)?;
        self.pending_project(id)?;

        let project = self
            .projects
            .get_mut(&id)
            .ok_or(RegistryError::ProjectNotFound(id))?;
        project.status = ProjectStatus::Denied;
        project.processed_at = Some(Utc::now());

        info!(id, "project denied");
        self.events.push(RegistryEvent::ProjectDenied { id });
        Ok(())
    }

    fn pending_project(&self, id: ProjectId) -> Result<&Project, RegistryError> {
        let project = self.project(id)?;
        if project.status != ProjectStatus::Pending {
            return Err(RegistryError::AlreadyProcessed {
                id,
                status: project.status,
            });
        }
        Ok(project)
    }

    /// Deploys the redemption vault of an approved project, bound to its
    /// token and to `settlement_asset`. Once per project. Administrator only.
    pub fn deploy_vault(
        &mut self,
        caller: &Address,
        id: ProjectId,
        settlement_asset: Address,
    ) -> Result<Address, RegistryError> {
        self.ensure_admin(caller)?;
        let project = self.project(id)?;
        if project.status != ProjectStatus::Approved {
            return Err(RegistryError::NotApproved {
                id,
                status: project.status,
            });
        }
        if let Some(vault) = &project.vault {
            return Err(RegistryError::VaultAlreadyDeployed {
                id,
                vault: vault.clone(),
            });
        }
        let token = project.token.clone().ok_or(RegistryError::NoToken(id))?;
        if settlement_asset == token {
            return Err(RegistryError::InvalidSettlementAsset(settlement_asset));
        }

        let vault = RedemptionVault::new(token, settlement_asset.clone(), self.admin.clone());
        let vault_address = vault.address().clone();

        let project = self
            .projects
            .get_mut(&id)
            .ok_or(RegistryError::ProjectNotFound(id))?;
        project.vault = Some(vault_address.clone());
        self.vaults.insert(id, vault);

        info!(id, vault = %vault_address, settlement_asset = %settlement_asset, "vault deployed");
        self.events.push(RegistryEvent::VaultDeployed {
            id,
            vault: vault_address.clone(),
            settlement_asset,
        });
        Ok(vault_address)
    }

    /// Hands the administrator role to `new_admin`, together with the admin
    /// role of every token and vault the caller administers.
    pub fn transfer_admin(&mut self, caller: &Address, new_admin: Address) -> Result<(), RegistryError> {
        self.ensure_admin(caller)?;
        for token in self.tokens.values_mut().filter(|t| t.admin() == caller) {
            token.reassign_admin(new_admin.clone());
        }
        for vault in self.vaults.values_mut().filter(|v| v.admin() == caller) {
            vault.reassign_admin(new_admin.clone());
        }
        let previous = std::mem::replace(&mut self.admin, new_admin);

        info!(%previous, new = %self.admin, "registry admin transferred");
        self.events.push(RegistryEvent::AdminTransferred {
            previous,
            new: self.admin.clone(),
        });
        Ok(())
    }

    // -- Vault routing ------------------------------------------------------

    /// Activates the vault of project `id` against its token's current
    /// supply. Returns the fixed rate.
    pub fn activate_redemption<A: SettlementAsset + ?Sized>(
        &mut self,
        caller: &Address,
        id: ProjectId,
        asset: &A,
    ) -> Result<u128, RegistryError> {
        let token = self.tokens.get(&id).ok_or_else(|| self.missing_token(id))?;
        let vault = self.vaults.get_mut(&id).ok_or(RegistryError::NoVault(id))?;
        Ok(vault.activate_redemption(caller, token, asset)?)
    }

    /// Redeems `amount` of the caller's tokens through project `id`'s vault.
    pub fn swap<A: SettlementAsset + ?Sized>(
        &mut self,
        caller: &Address,
        id: ProjectId,
        amount: u128,
        asset: &mut A,
    ) -> Result<Redemption, RegistryError> {
        let missing = self.missing_token(id);
        let token = self.tokens.get_mut(&id).ok_or(missing)?;
        let vault = self.vaults.get_mut(&id).ok_or(RegistryError::NoVault(id))?;
        Ok(vault.swap(caller, amount, token, asset)?)
    }

    // -- Discovery ----------------------------------------------------------

    /// Fetches a project by id.
    pub fn project(&self, id: ProjectId) -> Result<&Project, RegistryError> {
        self.projects.get(&id).ok_or(RegistryError::ProjectNotFound(id))
    }

    /// Every project, oldest first.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Every project with the given status, oldest first.
    pub fn projects_by_status(&self, status: ProjectStatus) -> impl Iterator<Item = &Project> {
        self.projects.values().filter(move |p| p.status == status)
    }

    /// Resolves a token address to its project.
    pub fn project_by_token(&self, token: &Address) -> Result<&Project, RegistryError> {
        let id = self
            .token_index
            .get(token)
            .ok_or_else(|| RegistryError::TokenNotFound(token.clone()))?;
        self.project(*id)
    }

    /// The token address of project `id`.
    pub fn token_address(&self, id: ProjectId) -> Result<&Address, RegistryError> {
        self.project(id)?
            .token
            .as_ref()
            .ok_or(RegistryError::NoToken(id))
    }

    /// The vault address of project `id`.
    pub fn vault_address(&self, id: ProjectId) -> Result<&Address, RegistryError> {
        self.project(id)?
            .vault
            .as_ref()
            .ok_or(RegistryError::NoVault(id))
    }

    /// Resolves a token address to the vault that redeems it.
    pub fn vault_address_by_token(&self, token: &Address) -> Result<&Address, RegistryError> {
        let id = self.project_by_token(token)?.id;
        self.vault_address(id)
    }

    pub fn token(&self, id: ProjectId) -> Result<&ProjectToken, RegistryError> {
        self.tokens.get(&id).ok_or_else(|| self.missing_token(id))
    }

    pub fn token_mut(&mut self, id: ProjectId) -> Result<&mut ProjectToken, RegistryError> {
        let missing = self.missing_token(id);
        self.tokens.get_mut(&id).ok_or(missing)
    }

    pub fn token_by_address(&self, token: &Address) -> Result<&ProjectToken, RegistryError> {
        let id = self.project_by_token(token)?.id;
        self.token(id)
    }

    pub fn vault(&self, id: ProjectId) -> Result<&RedemptionVault, RegistryError> {
        self.project(id)?;
        self.vaults.get(&id).ok_or(RegistryError::NoVault(id))
    }

    pub fn vault_mut(&mut self, id: ProjectId) -> Result<&mut RedemptionVault, RegistryError> {
        self.project(id)?;
        self.vaults.get_mut(&id).ok_or(RegistryError::NoVault(id))
    }

    pub fn vault_by_token(&self, token: &Address) -> Result<&RedemptionVault, RegistryError> {
        let id = self.project_by_token(token)?.id;
        self.vault(id)
    }

    /// Every deployed token, by project id.
    pub fn tokens(&self) -> impl Iterator<Item = (ProjectId, &ProjectToken)> {
        self.tokens.iter().map(|(id, t)| (*id, t))
    }

    /// Every deployed vault, by project id.
    pub fn vaults(&self) -> impl Iterator<Item = (ProjectId, &RedemptionVault)> {
        self.vaults.iter().map(|(id, v)| (*id, v))
    }

    // -- Events -------------------------------------------------------------

    /// Takes every event recorded by the registry and its ledgers since the
    /// last drain: registry events first, then per-token, then per-vault.
    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        let mut out: Vec<ContractEvent> = self
            .events
            .drain(..)
            .map(ContractEvent::Registry)
            .collect();
        for token in self.tokens.values_mut() {
            let address = token.address().clone();
            out.extend(token.drain_events().into_iter().map(|event| ContractEvent::Token {
                token: address.clone(),
                event,
            }));
        }
        for vault in self.vaults.values_mut() {
            let address = vault.address().clone();
            out.extend(vault.drain_events().into_iter().map(|event| ContractEvent::Vault {
                vault: address.clone(),
                event,
            }));
        }
        out
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), RegistryError> {
        if caller != &self.admin {
            warn!(%caller, "rejected privileged registry call");
            return Err(RegistryError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    fn missing_token(&self, id: ProjectId) -> RegistryError {
        if self.projects.contains_key(&id) {
            RegistryError::NoToken(id)
        } else {
            RegistryError::ProjectNotFound(id)
        }
    }
}
