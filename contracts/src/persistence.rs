//! # Registry Persistence
//!
//! Saves and restores a [`ProjectRegistry`] (and any settlement ledgers the
//! node hosts) through an [`OfftakeDB`].
//!
//! ## Schema evolution
//!
//! Every stored value is a versioned envelope: an enum whose variants are
//! frozen snapshots of the record at one schema version.
//!
//! ```text
//! ProjectRecord::V1(ProjectV1)
//! TokenRecord::V1(TokenV1)
//! VaultRecord::V1(VaultV1)
//! RegistryHeader::V1 { admin, next_project_id }
//! SettlementRecord::V1(SettlementV1)
//! ```
//!
//! Snapshots hold only plain data. Balance and allowance tables are stored
//! as [`BalancesV1`] and [`AllowancesV1`] maps, not as the live ledger
//! types, so changing those types never changes what a stored `V1` means.
//!
//! To add a field, add a `V2` variant with a new snapshot struct, write
//! `V2` from `save`, and teach the `into_*` conversion to migrate `V1`. The
//! existing variants are never reordered or retyped, so a database written
//! by any earlier release still decodes.

use chrono::{DateTime, Utc};
use offtake_protocol::identity::Address;
use offtake_protocol::ledger::{AllowanceTable, BalanceSheet, SettlementAsset, SettlementLedger};
use offtake_protocol::storage::{id_key, parse_id_key, Bucket, DbError, OfftakeDB, RecordBatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::project_token::ProjectToken;
use crate::redemption_vault::{RedemptionVault, VaultStatus};
use crate::registry::{Project, ProjectId, ProjectRegistry, ProjectStatus};

const HEADER_KEY: &[u8] = b"registry_header";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while saving or loading a registry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] DbError),

    /// The stored records contradict each other.
    #[error("inconsistent registry state: {0}")]
    Inconsistent(String),
}

// ---------------------------------------------------------------------------
// Versioned records
// ---------------------------------------------------------------------------

/// Holder → balance.
pub type BalancesV1 = BTreeMap<Address, u128>;

/// Owner → spender → remaining allowance.
pub type AllowancesV1 = BTreeMap<Address, BTreeMap<Address, u128>>;

fn balances_v1(sheet: &BalanceSheet) -> BalancesV1 {
    sheet.iter().map(|(holder, amount)| (holder.clone(), amount)).collect()
}

fn allowances_v1(table: &AllowanceTable) -> AllowancesV1 {
    let mut out = AllowancesV1::new();
    for (owner, spender, amount) in table.iter() {
        out.entry(owner.clone()).or_default().insert(spender.clone(), amount);
    }
    out
}

fn balance_sheet(balances: BalancesV1) -> BalanceSheet {
    balances.into_iter().collect()
}

fn allowance_table(allowances: AllowancesV1) -> AllowanceTable {
    allowances
        .into_iter()
        .flat_map(|(owner, spenders)| {
            spenders
                .into_iter()
                .map(move |(spender, amount)| (owner.clone(), spender, amount))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryHeader {
    V1 {
        admin: Address,
        next_project_id: ProjectId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProjectRecord {
    V1(ProjectV1),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectV1 {
    pub id: ProjectId,
    pub name: String,
    pub symbol: String,
    pub initial_supply: u128,
    pub metadata: String,
    pub developer: Address,
    pub token: Option<Address>,
    pub vault: Option<Address>,
    pub status: ProjectStatus,
    pub proposed_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TokenRecord {
    V1(TokenV1),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenV1 {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub admin: Address,
    pub balances: BalancesV1,
    pub allowances: AllowancesV1,
    pub total_supply: u128,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VaultRecord {
    V1(VaultV1),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultV1 {
    pub address: Address,
    pub token: Address,
    pub settlement_asset: Address,
    pub admin: Address,
    pub status: VaultStatus,
    pub rate: u128,
    pub paused: bool,
    pub deposited_at_activation: u128,
    pub total_redeemed: u128,
    pub tokens_redeemed: u128,
    pub swap_count: u64,
    pub deployed_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementRecord {
    V1(SettlementV1),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementV1 {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub issuer: Address,
    pub balances: BalancesV1,
    pub allowances: AllowancesV1,
    pub total_supply: u128,
    pub frozen: bool,
}

impl From<&Project> for ProjectRecord {
    fn from(p: &Project) -> Self {
        ProjectRecord::V1(ProjectV1 {
            id: p.id,
            name: p.name.clone(),
            symbol: p.symbol.clone(),
            initial_supply: p.initial_supply,
            metadata: p.metadata.clone(),
            developer: p.developer.clone(),
            token: p.token.clone(),
            vault: p.vault.clone(),
            status: p.status,
            proposed_at: p.proposed_at,
            processed_at: p.processed_at,
        })
    }
}

impl ProjectRecord {
    pub fn into_project(self) -> Project {
        match self {
            ProjectRecord::V1(v) => Project {
                id: v.id,
                name: v.name,
                symbol: v.symbol,
                initial_supply: v.initial_supply,
                metadata: v.metadata,
                developer: v.developer,
                token: v.token,
                vault: v.vault,
                status: v.status,
                proposed_at: v.proposed_at,
                processed_at: v.processed_at,
            },
        }
    }
}

impl From<&ProjectToken> for TokenRecord {
    fn from(t: &ProjectToken) -> Self {
        TokenRecord::V1(TokenV1 {
            address: t.address.clone(),
            name: t.name.clone(),
            symbol: t.symbol.clone(),
            decimals: t.decimals,
            admin: t.admin.clone(),
            balances: balances_v1(&t.balances),
            allowances: allowances_v1(&t.allowances),
            total_supply: t.total_supply,
            paused: t.paused,
            created_at: t.created_at,
        })
    }
}

impl TokenRecord {
    pub fn into_token(self) -> ProjectToken {
        match self {
            TokenRecord::V1(v) => ProjectToken {
                address: v.address,
                name: v.name,
                symbol: v.symbol,
                decimals: v.decimals,
                admin: v.admin,
                balances: balance_sheet(v.balances),
                allowances: allowance_table(v.allowances),
                total_supply: v.total_supply,
                paused: v.paused,
                created_at: v.created_at,
                events: Vec::new(),
            },
        }
    }
}

impl From<&RedemptionVault> for VaultRecord {
    fn from(v: &RedemptionVault) -> Self {
        VaultRecord::V1(VaultV1 {
            address: v.address.clone(),
            token: v.token.clone(),
            settlement_asset: v.settlement_asset.clone(),
            admin: v.admin.clone(),
            status: v.status,
            rate: v.rate,
            paused: v.paused,
            deposited_at_activation: v.deposited_at_activation,
            total_redeemed: v.total_redeemed,
            tokens_redeemed: v.tokens_redeemed,
            swap_count: v.swap_count,
            deployed_at: v.deployed_at,
            activated_at: v.activated_at,
        })
    }
}

impl VaultRecord {
    pub fn into_vault(self) -> RedemptionVault {
        match self {
            VaultRecord::V1(v) => RedemptionVault {
                address: v.address,
                token: v.token,
                settlement_asset: v.settlement_asset,
                admin: v.admin,
                status: v.status,
                rate: v.rate,
                paused: v.paused,
                deposited_at_activation: v.deposited_at_activation,
                total_redeemed: v.total_redeemed,
                tokens_redeemed: v.tokens_redeemed,
                swap_count: v.swap_count,
                deployed_at: v.deployed_at,
                activated_at: v.activated_at,
                events: Vec::new(),
            },
        }
    }
}

impl From<&SettlementLedger> for SettlementRecord {
    fn from(l: &SettlementLedger) -> Self {
        SettlementRecord::V1(SettlementV1 {
            address: l.address().clone(),
            symbol: l.symbol().to_string(),
            decimals: l.decimals(),
            issuer: l.issuer().clone(),
            balances: balances_v1(l.balances()),
            allowances: allowances_v1(l.allowances()),
            total_supply: l.total_supply(),
            frozen: l.is_frozen(),
        })
    }
}

impl SettlementRecord {
    /// Rebuilds the ledger, checking the stored supply against the balances.
    pub fn into_ledger(self) -> Result<SettlementLedger, StoreError> {
        match self {
            SettlementRecord::V1(v) => {
                let address = v.address.clone();
                let ledger = SettlementLedger::restore(
                    v.address,
                    v.symbol,
                    v.decimals,
                    v.issuer,
                    balance_sheet(v.balances),
                    allowance_table(v.allowances),
                    v.frozen,
                )
                .map_err(|e| StoreError::Inconsistent(format!("settlement asset {address}: {e}")))?;
                if ledger.total_supply() != v.total_supply {
                    return Err(StoreError::Inconsistent(format!(
                        "settlement asset {address} supply {} does not match its balances",
                        v.total_supply
                    )));
                }
                Ok(ledger)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryStore
// ---------------------------------------------------------------------------

/// Reads and writes registry snapshots.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    db: OfftakeDB,
}

impl RegistryStore {
    pub fn new(db: OfftakeDB) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &OfftakeDB {
        &self.db
    }

    /// Returns `true` if a registry has been saved.
    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        Ok(self.db.get::<RegistryHeader>(Bucket::Metadata, HEADER_KEY)?.is_some())
    }

    /// Writes the whole registry in one atomic commit.
    pub fn save(&self, registry: &ProjectRegistry) -> Result<usize, StoreError> {
        self.save_changes(registry, registry.projects.keys().copied(), None)
    }

    /// Writes the header, the records of the given projects and the given
    /// settlement ledgers in one atomic commit, so a swap's burn and its
    /// payout land together. Returns the number of records written.
    pub fn save_changes<'a>(
        &self,
        registry: &ProjectRegistry,
        projects: impl IntoIterator<Item = ProjectId>,
        settlements: impl IntoIterator<Item = &'a SettlementLedger>,
    ) -> Result<usize, StoreError> {
        let mut batch = RecordBatch::new();
        Self::put_header(&mut batch, registry)?;
        for id in projects {
            Self::put_project(&mut batch, registry, id)?;
        }
        for ledger in settlements {
            Self::put_settlement(&mut batch, ledger)?;
        }
        let records = batch.len();
        self.db.commit(batch)?;
        debug!(records, "registry changes saved");
        Ok(records)
    }

    fn put_header(batch: &mut RecordBatch, registry: &ProjectRegistry) -> Result<(), StoreError> {
        let header = RegistryHeader::V1 {
            admin: registry.admin.clone(),
            next_project_id: registry.next_project_id,
        };
        batch.put(Bucket::Metadata, HEADER_KEY, &header)?;
        Ok(())
    }

    fn put_project(batch: &mut RecordBatch, registry: &ProjectRegistry, id: ProjectId) -> Result<(), StoreError> {
        let project = registry
            .projects
            .get(&id)
            .ok_or_else(|| StoreError::Inconsistent(format!("project {id} does not exist")))?;
        let key = id_key(id);
        batch.put(Bucket::Projects, key, &ProjectRecord::from(project))?;
        if let Some(token) = registry.tokens.get(&id) {
            batch.put(Bucket::Tokens, key, &TokenRecord::from(token))?;
        }
        if let Some(vault) = registry.vaults.get(&id) {
            batch.put(Bucket::Vaults, key, &VaultRecord::from(vault))?;
        }
        Ok(())
    }

    /// Rebuilds the registry. Returns `None` if nothing was ever saved.
    pub fn load(&self) -> Result<Option<ProjectRegistry>, StoreError> {
        let Some(header) = self.db.get::<RegistryHeader>(Bucket::Metadata, HEADER_KEY)? else {
            return Ok(None);
        };
        let RegistryHeader::V1 {
            admin,
            next_project_id,
        } = header;

        let mut projects = BTreeMap::new();
        for (key, record) in self.db.scan::<ProjectRecord>(Bucket::Projects)? {
            let id = parse_id_key("projects", &key)?;
            projects.insert(id, record.into_project());
        }
        let mut tokens = BTreeMap::new();
        for (key, record) in self.db.scan::<TokenRecord>(Bucket::Tokens)? {
            tokens.insert(parse_id_key("tokens", &key)?, record.into_token());
        }
        let mut vaults = BTreeMap::new();
        for (key, record) in self.db.scan::<VaultRecord>(Bucket::Vaults)? {
            vaults.insert(parse_id_key("vaults", &key)?, record.into_vault());
        }

        check_consistency(next_project_id, &projects, &tokens, &vaults)?;
        info!(
            projects = projects.len(),
            tokens = tokens.len(),
            vaults = vaults.len(),
            "registry loaded"
        );
        Ok(Some(ProjectRegistry::from_parts(
            admin,
            next_project_id,
            projects,
            tokens,
            vaults,
        )))
    }

    fn put_settlement(batch: &mut RecordBatch, ledger: &SettlementLedger) -> Result<(), StoreError> {
        batch.put(
            Bucket::Settlement,
            ledger.address().as_str(),
            &SettlementRecord::from(ledger),
        )?;
        Ok(())
    }

    /// Reads every settlement ledger, keyed by address.
    pub fn load_settlements(&self) -> Result<BTreeMap<Address, SettlementLedger>, StoreError> {
        let mut out = BTreeMap::new();
        for (_, record) in self.db.scan::<SettlementRecord>(Bucket::Settlement)? {
            let ledger = record.into_ledger()?;
            out.insert(ledger.address().clone(), ledger);
        }
        Ok(out)
    }
}

fn check_consistency(
    next_project_id: ProjectId,
    projects: &BTreeMap<ProjectId, Project>,
    tokens: &BTreeMap<ProjectId, ProjectToken>,
    vaults: &BTreeMap<ProjectId, RedemptionVault>,
) -> Result<(), StoreError> {
    let inconsistent = |msg: String| Err(StoreError::Inconsistent(msg));

    if let Some(max) = projects.keys().next_back() {
        if *max >= next_project_id {
            return inconsistent(format!("project {max} is not below next id {next_project_id}"));
        }
    }
    for (id, project) in projects {
        let approved = project.status == ProjectStatus::Approved;
        match (&project.token, tokens.get(id)) {
            (Some(addr), Some(token)) if approved && token.address() == addr => {}
            (None, None) if !approved => {}
            _ => return inconsistent(format!("project {id} token reference does not match")),
        }
        match (&project.vault, vaults.get(id)) {
            (Some(addr), Some(vault)) if approved && vault.address() == addr => {}
            (None, None) => {}
            _ => return inconsistent(format!("project {id} vault reference does not match")),
        }
    }
    if let Some(id) = tokens.keys().chain(vaults.keys()).find(|id| !projects.contains_key(*id)) {
        return inconsistent(format!("ledger stored for unknown project {id}"));
    }
    Ok(())
}
