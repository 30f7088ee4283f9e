//! # Hosted Deployment
//!
//! The node's live ledger state: one [`ProjectRegistry`] (with every token
//! and vault it deployed) plus the settlement assets this node hosts, bound
//! to the [`RegistryStore`] they persist to.
//!
//! Every mutating operation goes through [`Deployment::apply`], which runs
//! the ledger call, drains the emitted events and writes the records the
//! call may have changed (named by its [`Scope`]) in a single database
//! commit. If the commit fails the in-memory state is rolled back to what
//! is on disk, so memory never runs ahead of storage.

use std::collections::BTreeMap;

use offtake_contracts::{
    ContractEvent, ProjectId, ProjectProposal, ProjectRegistry, ProjectToken, Redemption,
    RedemptionVault, RegistryError, RegistryStore, StoreError, TokenError, VaultError,
};
use offtake_protocol::config::DEFAULT_SETTLEMENT_DECIMALS;
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::{Address, AddressKind};
use offtake_protocol::ledger::{SettlementAsset, SettlementError, SettlementLedger};
use thiserror::Error;
use tracing::{error, info};

/// Failure of a hosted operation.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("settlement: {0}")]
    Settlement(#[from] SettlementError),

    /// The settlement asset is not hosted by this node.
    #[error("unknown settlement asset: {0}")]
    UnknownAsset(Address),

    /// The operation succeeded in memory but could not be persisted; it
    /// has been rolled back.
    #[error("storage: {0}")]
    Store(#[from] StoreError),
}

impl DeploymentError {
    /// The ledger error kind, or `None` for storage failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DeploymentError::Registry(e) => Some(e.kind()),
            DeploymentError::Token(e) => Some(e.kind()),
            DeploymentError::Vault(e) => Some(e.kind()),
            DeploymentError::Settlement(SettlementError::ZeroAmount)
            | DeploymentError::Settlement(SettlementError::UnsupportedDecimals(_)) => {
                Some(ErrorKind::Validation)
            }
            DeploymentError::Settlement(SettlementError::NotIssuer { .. }) => {
                Some(ErrorKind::Authorization)
            }
            DeploymentError::Settlement(SettlementError::Frozen(_)) => Some(ErrorKind::Lifecycle),
            DeploymentError::Settlement(_) => Some(ErrorKind::Arithmetic),
            DeploymentError::UnknownAsset(_) => Some(ErrorKind::NotFound),
            DeploymentError::Store(_) => None,
        }
    }
}

/// The records an operation may change. The registry header is always
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One project with its token and vault.
    Project(ProjectId),
    /// One hosted settlement asset.
    Settlement(Address),
    /// A project together with the asset its vault pays out in.
    Redemption { project: ProjectId, asset: Address },
    /// Every project.
    Registry,
}

impl Scope {
    fn asset(&self) -> Option<&Address> {
        match self {
            Scope::Settlement(asset) | Scope::Redemption { asset, .. } => Some(asset),
            Scope::Project(_) | Scope::Registry => None,
        }
    }
}

/// Registry, hosted settlement assets and their store.
#[derive(Debug)]
pub struct Deployment {
    registry: ProjectRegistry,
    settlement: BTreeMap<Address, SettlementLedger>,
    store: RegistryStore,
}

impl Deployment {
    /// Loads the deployment saved in `store`, or `None` if the store was
    /// never initialized.
    pub fn load(store: RegistryStore) -> Result<Option<Self>, StoreError> {
        let Some(registry) = store.load()? else {
            return Ok(None);
        };
        let settlement = store.load_settlements()?;
        Ok(Some(Self {
            registry,
            settlement,
            store,
        }))
    }

    /// Creates an empty registry administered by `admin` and saves it.
    pub fn initialize(store: RegistryStore, admin: Address) -> Result<Self, StoreError> {
        let registry = ProjectRegistry::new(admin);
        store.save(&registry)?;
        info!(admin = %registry.admin(), "registry initialized");
        Ok(Self {
            registry,
            settlement: BTreeMap::new(),
            store,
        })
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// A hosted settlement asset.
    pub fn settlement(&self, asset: &Address) -> Result<&SettlementLedger, DeploymentError> {
        self.settlement
            .get(asset)
            .ok_or_else(|| DeploymentError::UnknownAsset(asset.clone()))
    }

    /// Every hosted settlement asset, ordered by address.
    pub fn settlements(&self) -> impl Iterator<Item = &SettlementLedger> {
        self.settlement.values()
    }

    /// Runs `op` against the live state, persists the records named by
    /// `scope` and returns the result together with the events it emitted.
    ///
    /// A failed `op` leaves no trace (every ledger call is all-or-nothing). A
    /// failed commit reloads the last persisted state before returning.
    pub fn apply<T>(
        &mut self,
        scope: Scope,
        op: impl FnOnce(
            &mut ProjectRegistry,
            &mut BTreeMap<Address, SettlementLedger>,
        ) -> Result<T, DeploymentError>,
    ) -> Result<(T, Vec<ContractEvent>), DeploymentError> {
        let value = match op(&mut self.registry, &mut self.settlement) {
            Ok(value) => value,
            Err(e) => {
                // Discard anything a rejected call queued.
                self.registry.drain_events();
                return Err(e);
            }
        };
        let events = self.registry.drain_events();

        let projects: Vec<ProjectId> = match &scope {
            Scope::Project(id) | Scope::Redemption { project: id, .. } => vec![*id],
            Scope::Registry => self.registry.projects().map(|p| p.id).collect(),
            Scope::Settlement(_) => Vec::new(),
        };
        let ledger = scope.asset().and_then(|asset| self.settlement.get(asset));
        if let Err(e) = self.store.save_changes(&self.registry, projects, ledger) {
            error!(error = %e, "commit failed, restoring persisted state");
            self.restore()?;
            return Err(e.into());
        }
        Ok((value, events))
    }

    fn restore(&mut self) -> Result<(), StoreError> {
        let registry = self
            .store
            .load()?
            .ok_or_else(|| StoreError::Inconsistent("registry vanished from the store".into()))?;
        self.registry = registry;
        self.settlement = self.store.load_settlements()?;
        Ok(())
    }

    // -- Registry -----------------------------------------------------------

    pub fn propose_project(
        &mut self,
        caller: &Address,
        proposal: ProjectProposal,
    ) -> Result<(ProjectId, Vec<ContractEvent>), DeploymentError> {
        let id = self.registry.next_project_id();
        self.apply(Scope::Project(id), |registry, _| {
            Ok(registry.propose_project(caller, proposal)?)
        })
    }

    pub fn approve_project(
        &mut self,
        caller: &Address,
        id: ProjectId,
    ) -> Result<(Address, Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Project(id), |registry, _| Ok(registry.approve_project(caller, id)?))
    }

    pub fn deny_project(
        &mut self,
        caller: &Address,
        id: ProjectId,
    ) -> Result<((), Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Project(id), |registry, _| Ok(registry.deny_project(caller, id)?))
    }

    /// Deploys a vault settling in `asset`, which must be hosted here.
    pub fn deploy_vault(
        &mut self,
        caller: &Address,
        id: ProjectId,
        asset: &Address,
    ) -> Result<(Address, Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Project(id), |registry, settlement| {
            if !settlement.contains_key(asset) {
                return Err(DeploymentError::UnknownAsset(asset.clone()));
            }
            Ok(registry.deploy_vault(caller, id, asset.clone())?)
        })
    }

    pub fn transfer_admin(
        &mut self,
        caller: &Address,
        new_admin: Address,
    ) -> Result<((), Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Registry, |registry, _| {
            Ok(registry.transfer_admin(caller, new_admin)?)
        })
    }

    // -- Tokens -------------------------------------------------------------

    /// Runs `op` on the token deployed at `token`.
    pub fn token_op<T>(
        &mut self,
        token: &Address,
        op: impl FnOnce(&mut ProjectToken) -> Result<T, TokenError>,
    ) -> Result<(T, Vec<ContractEvent>), DeploymentError> {
        let id = self.registry.project_by_token(token)?.id;
        self.apply(Scope::Project(id), |registry, _| {
            let token = registry.token_mut(id)?;
            Ok(op(token)?)
        })
    }

    // -- Vaults -------------------------------------------------------------

    /// Runs `op` on project `id`'s vault. For operations that do not touch
    /// the token or the settlement asset.
    pub fn vault_op<T>(
        &mut self,
        id: ProjectId,
        op: impl FnOnce(&mut RedemptionVault) -> Result<T, VaultError>,
    ) -> Result<(T, Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Project(id), |registry, _| {
            let vault = registry.vault_mut(id)?;
            Ok(op(vault)?)
        })
    }

    pub fn activate_redemption(
        &mut self,
        caller: &Address,
        id: ProjectId,
    ) -> Result<(u128, Vec<ContractEvent>), DeploymentError> {
        let scope = self.redemption_scope(id)?;
        self.apply(scope, |registry, settlement| {
            let asset = hosted_asset(registry, settlement, id)?;
            Ok(registry.activate_redemption(caller, id, &*asset)?)
        })
    }

    pub fn swap(
        &mut self,
        caller: &Address,
        id: ProjectId,
        amount: u128,
    ) -> Result<(Redemption, Vec<ContractEvent>), DeploymentError> {
        let scope = self.redemption_scope(id)?;
        self.apply(scope, |registry, settlement| {
            let asset = hosted_asset(registry, settlement, id)?;
            Ok(registry.swap(caller, id, amount, asset)?)
        })
    }

    fn redemption_scope(&self, id: ProjectId) -> Result<Scope, DeploymentError> {
        let asset = self.registry.vault(id)?.settlement_asset().clone();
        Ok(Scope::Redemption { project: id, asset })
    }

    /// Payout preview for `amount` tokens through project `id`'s vault.
    pub fn quote(&self, id: ProjectId, amount: u128) -> Result<u128, DeploymentError> {
        let vault = self.registry.vault(id)?;
        let asset = self.settlement(vault.settlement_asset())?;
        Ok(vault.quote(amount, asset)?)
    }

    /// Settlement units the vault of project `id` currently holds.
    pub fn vault_liquidity(&self, id: ProjectId) -> Result<u128, DeploymentError> {
        let vault = self.registry.vault(id)?;
        let asset = self.settlement(vault.settlement_asset())?;
        Ok(vault.available_settlement(asset)?)
    }

    // -- Settlement assets --------------------------------------------------

    /// Creates a hosted settlement asset issued by `caller`.
    pub fn create_settlement(
        &mut self,
        caller: &Address,
        symbol: &str,
        decimals: Option<u8>,
    ) -> Result<(Address, Vec<ContractEvent>), DeploymentError> {
        let address = Address::generate(AddressKind::Asset);
        self.apply(Scope::Settlement(address.clone()), |_, settlement| {
            let ledger = SettlementLedger::with_address(
                address.clone(),
                symbol,
                decimals.unwrap_or(DEFAULT_SETTLEMENT_DECIMALS),
                caller.clone(),
            )?;
            info!(asset = %address, symbol, issuer = %caller, "settlement asset created");
            settlement.insert(address.clone(), ledger);
            Ok(address)
        })
    }

    pub fn mint_settlement(
        &mut self,
        caller: &Address,
        asset: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<((), Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Settlement(asset.clone()), |_, settlement| {
            let ledger = settlement
                .get_mut(asset)
                .ok_or_else(|| DeploymentError::UnknownAsset(asset.clone()))?;
            Ok(ledger.mint(caller, to, amount)?)
        })
    }

    pub fn transfer_settlement(
        &mut self,
        caller: &Address,
        asset: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<((), Vec<ContractEvent>), DeploymentError> {
        self.apply(Scope::Settlement(asset.clone()), |_, settlement| {
            let ledger = settlement
                .get_mut(asset)
                .ok_or_else(|| DeploymentError::UnknownAsset(asset.clone()))?;
            Ok(ledger.transfer(caller, to, amount)?)
        })
    }
}

/// The settlement ledger project `id`'s vault pays out in.
fn hosted_asset<'a>(
    registry: &ProjectRegistry,
    settlement: &'a mut BTreeMap<Address, SettlementLedger>,
    id: ProjectId,
) -> Result<&'a mut SettlementLedger, DeploymentError> {
    let asset = registry.vault(id)?.settlement_asset();
    settlement
        .get_mut(asset)
        .ok_or_else(|| DeploymentError::UnknownAsset(asset.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use offtake_protocol::storage::OfftakeDB;

    const TOKEN: u128 = 1_000_000_000_000_000_000;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn fresh() -> Deployment {
        let store = RegistryStore::new(OfftakeDB::open_temporary().unwrap());
        Deployment::initialize(store, addr("admin")).unwrap()
    }

    fn proposal(supply: u128) -> ProjectProposal {
        ProjectProposal {
            name: "Solar Farm".into(),
            symbol: "SOL".into(),
            initial_supply: supply,
            metadata: String::new(),
        }
    }

    #[test]
    fn full_redemption_round_through_the_store() {
        let mut d = fresh();
        let admin = addr("admin");
        let dev = addr("dev");

        let (id, events) = d.propose_project(&dev, proposal(1_000 * TOKEN)).unwrap();
        assert_eq!(events.len(), 1);
        let (token, _) = d.approve_project(&admin, id).unwrap();
        let (usdc, _) = d.create_settlement(&admin, "USDC", None).unwrap();
        let (vault, _) = d.deploy_vault(&admin, id, &usdc).unwrap();
        d.mint_settlement(&admin, &usdc, &vault, 500_000_000).unwrap();

        let (rate, _) = d.activate_redemption(&admin, id).unwrap();
        assert_eq!(rate, 500_000);
        assert_eq!(d.quote(id, 100 * TOKEN).unwrap(), 50_000_000);

        d.token_op(&token, |t| t.transfer(&admin, &dev, 100 * TOKEN)).unwrap();
        d.token_op(&token, |t| t.approve(&dev, &vault, 100 * TOKEN)).unwrap();
        let (redemption, events) = d.swap(&dev, id, 100 * TOKEN).unwrap();
        assert_eq!(redemption.payout, 50_000_000);
        assert!(events.iter().any(|e| e.name() == "vault.redeemed"));
        assert_eq!(d.settlement(&usdc).unwrap().balance_of(&dev), 50_000_000);
        assert_eq!(d.vault_liquidity(id).unwrap(), 450_000_000);

        let reloaded = Deployment::load(d.store.clone()).unwrap().unwrap();
        assert_eq!(reloaded.registry().token(id).unwrap().address(), &token);
        let reloaded_token = reloaded.registry().token(id).unwrap();
        assert_eq!(reloaded_token.balance_of(&dev), 0);
        assert_eq!(reloaded_token.total_supply(), 900 * TOKEN);
        assert_eq!(reloaded.settlement(&usdc).unwrap().balance_of(&dev), 50_000_000);
    }

    #[test]
    fn operations_rewrite_only_their_own_records() {
        use offtake_contracts::persistence::{ProjectRecord, SettlementRecord};
        use offtake_protocol::storage::{id_key, Bucket};

        let mut d = fresh();
        let admin = addr("admin");
        let (first, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
        let (second, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
        let (token, _) = d.approve_project(&admin, first).unwrap();
        let (usdc, _) = d.create_settlement(&admin, "USDC", None).unwrap();
        let (eurc, _) = d.create_settlement(&admin, "EURC", None).unwrap();

        // Mark the stored copies of the second project and EURC. A write that
        // covered them would overwrite the marks with the live state.
        let db = d.store.db().clone();
        let mut project = d.registry().project(second).unwrap().clone();
        project.name = "marked".into();
        db.put(Bucket::Projects, id_key(second), &ProjectRecord::from(&project)).unwrap();
        let SettlementRecord::V1(mut stored_eurc) = db
            .get::<SettlementRecord>(Bucket::Settlement, eurc.as_str())
            .unwrap()
            .unwrap();
        stored_eurc.symbol = "MARK".into();
        db.put(Bucket::Settlement, eurc.as_str(), &SettlementRecord::V1(stored_eurc)).unwrap();

        d.token_op(&token, |t| t.approve(&admin, &addr("bob"), 5)).unwrap();
        d.mint_settlement(&admin, &usdc, &addr("bob"), 7).unwrap();

        let reloaded = Deployment::load(d.store.clone()).unwrap().unwrap();
        assert_eq!(reloaded.registry().project(second).unwrap().name, "marked");
        assert_eq!(reloaded.settlement(&eurc).unwrap().symbol(), "MARK");
        assert_eq!(
            reloaded.registry().token(first).unwrap().allowance(&admin, &addr("bob")),
            5
        );
        assert_eq!(reloaded.settlement(&usdc).unwrap().balance_of(&addr("bob")), 7);
    }

    #[test]
    fn admin_transfer_rewrites_every_project() {
        let mut d = fresh();
        let (admin, council) = (addr("admin"), addr("council"));
        let (first, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
        let (second, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
        d.approve_project(&admin, first).unwrap();
        d.approve_project(&admin, second).unwrap();

        d.transfer_admin(&admin, council.clone()).unwrap();

        let reloaded = Deployment::load(d.store.clone()).unwrap().unwrap();
        assert_eq!(reloaded.registry().admin(), &council);
        for id in [first, second] {
            assert_eq!(reloaded.registry().token(id).unwrap().admin(), &council);
        }
    }

    #[test]
    fn reopens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let usdc = {
            let store = RegistryStore::new(OfftakeDB::open(dir.path()).unwrap());
            let mut d = Deployment::initialize(store, addr("admin")).unwrap();
            d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
            let (usdc, _) = d.create_settlement(&addr("admin"), "USDC", None).unwrap();
            usdc
        };

        let store = RegistryStore::new(OfftakeDB::open(dir.path()).unwrap());
        let d = Deployment::load(store).unwrap().expect("saved registry");
        assert_eq!(d.registry().project_count(), 1);
        assert_eq!(d.registry().next_project_id(), 2);
        assert_eq!(d.settlement(&usdc).unwrap().symbol(), "USDC");
    }

    #[test]
    fn vault_requires_a_hosted_asset() {
        let mut d = fresh();
        let admin = addr("admin");
        let (id, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
        d.approve_project(&admin, id).unwrap();

        let err = d.deploy_vault(&admin, id, &addr("ast_elsewhere")).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert!(d.registry().vault(id).is_err());
    }

    #[test]
    fn failed_operation_emits_nothing() {
        let mut d = fresh();
        let (id, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();

        let err = d.approve_project(&addr("mallory"), id).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Authorization));

        let (_, events) = d.deny_project(&addr("admin"), id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "registry.project_denied");
    }

    #[test]
    fn vault_pause_persists() {
        let mut d = fresh();
        let admin = addr("admin");
        let (id, _) = d.propose_project(&addr("dev"), proposal(TOKEN)).unwrap();
        d.approve_project(&admin, id).unwrap();
        let (usdc, _) = d.create_settlement(&admin, "USDC", None).unwrap();
        d.deploy_vault(&admin, id, &usdc).unwrap();

        let (_, events) = d.vault_op(id, |v| v.pause(&admin)).unwrap();
        assert_eq!(events[0].name(), "vault.paused");

        let reloaded = Deployment::load(d.store.clone()).unwrap().unwrap();
        assert!(reloaded.registry().vault(id).unwrap().is_paused());
    }

    #[test]
    fn settlement_errors_are_classified() {
        let mut d = fresh();
        let admin = addr("admin");
        let (usdc, _) = d.create_settlement(&admin, "USDC", Some(6)).unwrap();

        let err = d.mint_settlement(&addr("mallory"), &usdc, &admin, 1).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Authorization));

        let err = d.transfer_settlement(&admin, &usdc, &addr("bob"), 1).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Arithmetic));

        let err = d.create_settlement(&admin, "WIDE", Some(40)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
    }
}
