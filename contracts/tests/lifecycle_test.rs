//! Integration tests for the offtake ledger core.
//!
//! These drive the registry, a project token and its redemption vault
//! together through the full lifecycle: proposal, approval, vault
//! deployment, funding, activation and redemption by several holders.

use offtake_contracts::registry::{ProjectId, ProjectProposal, ProjectRegistry, ProjectStatus};
use offtake_contracts::{ContractEvent, RegistryError, VaultError, VaultEvent};
use offtake_protocol::config::RATE_SCALE;
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::Address;
use offtake_protocol::ledger::{SettlementAsset, SettlementLedger};

const TOKEN: u128 = RATE_SCALE;
const USDC: u128 = 1_000_000;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn proposal(supply: u128) -> ProjectProposal {
    ProjectProposal {
        name: "Amazonia Carbon Vintage 2028".into(),
        symbol: "ACV28".into(),
        initial_supply: supply,
        metadata: "ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi".into(),
    }
}

struct Deployment {
    admin: Address,
    issuer: Address,
    registry: ProjectRegistry,
    usdc: SettlementLedger,
    id: ProjectId,
}

impl Deployment {
    /// Approved project, vault deployed and funded with `deposit`, not active.
    fn funded(supply: u128, deposit: u128) -> Self {
        Self::funded_in(6, supply, deposit)
    }

    /// Same as [`Deployment::funded`] with a settlement asset of `decimals`.
    fn funded_in(decimals: u8, supply: u128, deposit: u128) -> Self {
        let admin = addr("admin");
        let issuer = addr("circle");
        let mut registry = ProjectRegistry::new(admin.clone());
        let id = registry.propose_project(&addr("dev"), proposal(supply)).unwrap();
        registry.approve_project(&admin, id).unwrap();

        let mut usdc = SettlementLedger::new("USDC", decimals, issuer.clone()).unwrap();
        let vault = registry
            .deploy_vault(&admin, id, usdc.address().clone())
            .unwrap();
        // Administrator funds the vault from its own settlement balance.
        usdc.mint(&issuer, &admin, deposit).unwrap();
        usdc.transfer(&admin, &vault, deposit).unwrap();

        Self {
            admin,
            issuer,
            registry,
            usdc,
            id,
        }
    }

    fn vault_address(&self) -> Address {
        self.registry.vault_address(self.id).unwrap().clone()
    }

    /// Sends `amount` tokens from custody to `holder` and approves the vault.
    fn fund_holder(&mut self, holder: &Address, amount: u128) {
        let vault = self.vault_address();
        let admin = self.admin.clone();
        let token = self.registry.token_mut(self.id).unwrap();
        token.transfer(&admin, holder, amount).unwrap();
        token.approve(holder, &vault, amount).unwrap();
    }

    fn activate(&mut self) -> u128 {
        let admin = self.admin.clone();
        self.registry
            .activate_redemption(&admin, self.id, &self.usdc)
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_approval_mints_supply_to_admin() {
    let admin = addr("admin");
    let mut registry = ProjectRegistry::new(admin.clone());
    let id = registry.propose_project(&addr("dev"), proposal(1_000_000)).unwrap();
    registry.approve_project(&admin, id).unwrap();

    let token = registry.token(id).unwrap();
    assert_eq!(token.total_supply(), 1_000_000);
    assert_eq!(token.balance_of(&admin), 1_000_000);
    assert_eq!(token.name(), "Amazonia Carbon Vintage 2028");
}

#[test]
fn scenario_b_activation_rate() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let rate = d.activate();
    assert_eq!(rate, 100_000);

    let vault = d.registry.vault(d.id).unwrap();
    assert!(vault.is_active());
    assert_eq!(vault.rate(), 100_000);
    assert_eq!(vault.available_settlement(&d.usdc).unwrap(), 1_000_000 * USDC);
}

#[test]
fn scenario_c_swap_pays_out() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let holder = addr("holder");
    d.fund_holder(&holder, 5_000 * TOKEN);
    d.activate();

    let receipt = d
        .registry
        .swap(&holder, d.id, 5_000 * TOKEN, &mut d.usdc)
        .unwrap();

    assert_eq!(receipt.payout, 500 * USDC);
    assert_eq!(d.usdc.balance_of(&holder), 500 * USDC);
    assert_eq!(d.registry.token(d.id).unwrap().balance_of(&holder), 0);
    assert_eq!(d.registry.vault(d.id).unwrap().total_redeemed(), 500 * USDC);
}

#[test]
fn scenario_d_activation_once_and_swap_requires_it() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let holder = addr("holder");
    d.fund_holder(&holder, TOKEN);

    let err = d
        .registry
        .swap(&holder, d.id, TOKEN, &mut d.usdc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);

    d.activate();
    let admin = d.admin.clone();
    let err = d
        .registry
        .activate_redemption(&admin, d.id, &d.usdc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);
    assert!(matches!(
        err,
        RegistryError::Vault(VaultError::AlreadyActive(_))
    ));
}

#[test]
fn scenario_e_vault_deployment_gates() {
    let admin = addr("admin");
    let usdc = addr("ast_usdc");
    let mut registry = ProjectRegistry::new(admin.clone());
    let id = registry.propose_project(&addr("dev"), proposal(1)).unwrap();

    let err = registry.deploy_vault(&admin, id, usdc.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);

    registry.approve_project(&admin, id).unwrap();
    let first = registry.deploy_vault(&admin, id, usdc.clone()).unwrap();
    let err = registry.deploy_vault(&admin, id, usdc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);
    assert_eq!(registry.project(id).unwrap().vault.as_ref(), Some(&first));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn token_reference_tracks_approval() {
    let admin = addr("admin");
    let mut registry = ProjectRegistry::new(admin.clone());
    for _ in 0..4 {
        registry.propose_project(&addr("dev"), proposal(10)).unwrap();
    }
    registry.approve_project(&admin, 1).unwrap();
    registry.deny_project(&admin, 2).unwrap();
    registry.approve_project(&admin, 4).unwrap();

    for project in registry.projects() {
        assert_eq!(
            project.token.is_some(),
            project.status == ProjectStatus::Approved,
            "project {}",
            project.id
        );
        assert!(project.vault.is_none() || project.token.is_some());
    }
}

#[test]
fn rate_is_immutable_across_swaps_and_deposits() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let holders: Vec<Address> = (0..5).map(|i| addr(&format!("h{i}"))).collect();
    for h in &holders {
        d.fund_holder(h, 1_000 * TOKEN);
    }
    let rate = d.activate();

    for (i, h) in holders.iter().enumerate() {
        d.registry.swap(h, d.id, 1_000 * TOKEN, &mut d.usdc).unwrap();
        if i == 2 {
            // A top-up between swaps adds capacity only.
            let (issuer, vault) = (d.issuer.clone(), d.vault_address());
            d.usdc.mint(&issuer, &vault, 50_000 * USDC).unwrap();
        }
        assert_eq!(d.registry.vault(d.id).unwrap().rate(), rate);
    }
}

#[test]
fn eighteen_decimal_settlement_redeems_end_to_end() {
    const DAI: u128 = RATE_SCALE;
    let mut d = Deployment::funded_in(18, 10_000_000 * TOKEN, 1_000 * DAI);
    let holder = addr("holder");
    d.fund_holder(&holder, 5_000 * TOKEN);

    // 1,000 DAI over 10M tokens: 1e-4 DAI per token.
    assert_eq!(d.activate(), 100_000_000_000_000);
    let receipt = d
        .registry
        .swap(&holder, d.id, 5_000 * TOKEN, &mut d.usdc)
        .unwrap();
    assert_eq!(receipt.payout, DAI / 2);
    assert_eq!(d.usdc.balance_of(&holder), DAI / 2);
    assert_eq!(
        d.registry.vault(d.id).unwrap().available_settlement(&d.usdc).unwrap(),
        1_000 * DAI - DAI / 2
    );
}

#[test]
fn one_to_one_rate_with_eighteen_decimals() {
    let mut d = Deployment::funded_in(18, 1_000 * TOKEN, 1_000 * TOKEN);
    let holder = addr("holder");
    d.fund_holder(&holder, 1_000 * TOKEN);

    assert_eq!(d.activate(), RATE_SCALE);
    let receipt = d
        .registry
        .swap(&holder, d.id, 1_000 * TOKEN, &mut d.usdc)
        .unwrap();
    assert_eq!(receipt.payout, 1_000 * TOKEN);
    assert_eq!(d.registry.token(d.id).unwrap().total_supply(), 0);
}

#[test]
fn payouts_never_exceed_deposits() {
    // An awkward deposit that does not divide evenly.
    let deposit = 333_333_333;
    let mut d = Deployment::funded(7 * TOKEN, deposit);
    let holders: Vec<Address> = (0..7).map(|i| addr(&format!("h{i}"))).collect();
    for h in &holders {
        d.fund_holder(h, TOKEN);
    }
    d.activate();

    let mut paid = 0u128;
    for h in &holders {
        paid += d.registry.swap(h, d.id, TOKEN, &mut d.usdc).unwrap().payout;
    }
    let vault = d.registry.vault(d.id).unwrap();
    assert_eq!(vault.total_redeemed(), paid);
    assert!(paid <= deposit);
    // Truncation leaves dust behind, never a deficit.
    assert_eq!(vault.available_settlement(&d.usdc).unwrap(), deposit - paid);
    assert_eq!(d.registry.token(d.id).unwrap().total_supply(), 0);
}

#[test]
fn burned_units_cannot_be_redeemed_twice() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let holder = addr("holder");
    d.fund_holder(&holder, 100 * TOKEN);
    // A generous allowance: only the burn can stop a second redemption.
    let vault = d.vault_address();
    d.registry
        .token_mut(d.id)
        .unwrap()
        .approve(&holder, &vault, 1_000 * TOKEN)
        .unwrap();
    d.activate();

    d.registry.swap(&holder, d.id, 100 * TOKEN, &mut d.usdc).unwrap();
    let err = d
        .registry
        .swap(&holder, d.id, 100 * TOKEN, &mut d.usdc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Arithmetic);
    assert_eq!(d.usdc.balance_of(&holder), 10 * USDC);
}

#[test]
fn frozen_settlement_asset_rolls_back_swap() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let holder = addr("holder");
    d.fund_holder(&holder, 100 * TOKEN);
    d.activate();
    d.registry.drain_events();

    let issuer = d.issuer.clone();
    d.usdc.set_frozen(&issuer, true).unwrap();
    let supply = d.registry.token(d.id).unwrap().total_supply();

    let err = d
        .registry
        .swap(&holder, d.id, 100 * TOKEN, &mut d.usdc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let token = d.registry.token(d.id).unwrap();
    assert_eq!(token.total_supply(), supply);
    assert_eq!(token.balance_of(&holder), 100 * TOKEN);
    assert_eq!(d.registry.vault(d.id).unwrap().total_redeemed(), 0);
    assert!(d.registry.drain_events().is_empty());

    // Once the issuer unfreezes, the same call goes through.
    d.usdc.set_frozen(&issuer, false).unwrap();
    d.registry
        .swap(&holder, d.id, 100 * TOKEN, &mut d.usdc)
        .unwrap();
}

#[test]
fn swap_emits_redeemed_and_burn() {
    let mut d = Deployment::funded(10_000_000 * TOKEN, 1_000_000 * USDC);
    let holder = addr("holder");
    d.fund_holder(&holder, 10 * TOKEN);
    d.activate();
    d.registry.drain_events();

    d.registry.swap(&holder, d.id, 10 * TOKEN, &mut d.usdc).unwrap();
    let events = d.registry.drain_events();
    let names: Vec<_> = events.iter().map(ContractEvent::name).collect();
    assert_eq!(names, vec!["token.burn", "vault.redeemed"]);
    assert!(events.iter().any(|e| matches!(
        e,
        ContractEvent::Vault {
            event: VaultEvent::Redeemed { payout, .. },
            ..
        } if *payout == USDC
    )));
}
