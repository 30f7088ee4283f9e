//! # Redemption Vault Contract
//!
//! Converts burned project tokens into settlement-asset payouts at a rate
//! fixed once, at activation. One vault per approved project.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──activate_redemption──▶ Active
//! ```
//!
//! `Active` is terminal. The administrator funds the vault by transferring
//! settlement units to the vault's address, then activates it. Activation
//! reads the vault's settlement balance and the token's total supply and
//! fixes `rate = deposited * RATE_SCALE / total_supply`. Later deposits add
//! payout capacity at the same rate; nothing recomputes it.
//!
//! ## Swap ordering
//!
//! `swap` is structured checks → effects → interactions:
//!
//! 1. **Checks**: lifecycle, amount, payout, capacity, and the token-side
//!    burn precheck. Nothing has changed yet.
//! 2. **Effects**: the vault's own totals are advanced.
//! 3. **Interactions**: the token burns the holder's units through the
//!    vault's allowance, then the settlement asset pays the holder.
//!
//! If an interaction fails, every earlier step of the same call is rolled
//! back before the error is returned. A failed swap leaves no trace.

use chrono::{DateTime, Utc};
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::{Address, AddressKind};
use offtake_protocol::ledger::{SettlementAsset, SettlementError};
use offtake_protocol::math;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::events::VaultEvent;
use crate::project_token::{ProjectToken, TokenError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during redemption vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The amount must be greater than zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The caller is not the vault administrator.
    #[error("unauthorized: {caller} is not the administrator of this vault")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// The token passed in is not the one this vault is bound to.
    #[error("token mismatch: vault redeems {expected}, got {found}")]
    TokenMismatch {
        /// The bound token.
        expected: Address,
        /// The token that was supplied.
        found: Address,
    },

    /// The settlement asset passed in is not the one this vault pays in.
    #[error("settlement asset mismatch: vault pays in {expected}, got {found}")]
    AssetMismatch {
        /// The bound settlement asset.
        expected: Address,
        /// The asset that was supplied.
        found: Address,
    },

    /// `activate_redemption` was already called.
    #[error("redemption already active since {0}")]
    AlreadyActive(DateTime<Utc>),

    /// `swap` before activation.
    #[error("redemption is not active")]
    NotActive,

    /// Swaps are suspended.
    #[error("vault {0} is paused")]
    Paused(Address),

    /// `pause` on a paused vault, or `unpause` on a live one.
    #[error("vault is already {0}")]
    PauseUnchanged(&'static str),

    /// Activation with an unfunded vault.
    #[error("nothing deposited: the vault holds no settlement asset")]
    NothingDeposited,

    /// Activation against a token with no supply.
    #[error("token has no supply to redeem")]
    NoSupply,

    /// The deposit is too small relative to supply; every payout would be 0.
    #[error("redemption rate rounds to zero: {deposited} deposited over {total_supply} units")]
    RateRoundsToZero {
        /// Settlement units held by the vault.
        deposited: u128,
        /// Token total supply.
        total_supply: u128,
    },

    /// The redeemed amount is too small to pay anything.
    #[error("payout rounds to zero for {token_amount} token units")]
    PayoutRoundsToZero {
        /// The amount offered for redemption.
        token_amount: u128,
    },

    /// The vault cannot cover the payout.
    #[error("insufficient settlement: payout {requested}, vault holds {available}")]
    InsufficientSettlement {
        /// The computed payout.
        requested: u128,
        /// The vault's settlement balance.
        available: u128,
    },

    /// A fixed-point computation overflowed.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    /// The token refused the burn.
    #[error("token: {0}")]
    Token(#[from] TokenError),

    /// The settlement asset refused the transfer.
    #[error("settlement asset: {0}")]
    Settlement(#[from] SettlementError),
}

impl VaultError {
    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::ZeroAmount
            | VaultError::TokenMismatch { .. }
            | VaultError::AssetMismatch { .. } => ErrorKind::Validation,
            VaultError::Unauthorized { .. } => ErrorKind::Authorization,
            VaultError::AlreadyActive(_)
            | VaultError::NotActive
            | VaultError::Paused(_)
            | VaultError::PauseUnchanged(_) => ErrorKind::Lifecycle,
            VaultError::NothingDeposited
            | VaultError::NoSupply
            | VaultError::RateRoundsToZero { .. }
            | VaultError::PayoutRoundsToZero { .. }
            | VaultError::InsufficientSettlement { .. }
            | VaultError::Overflow(_) => ErrorKind::Arithmetic,
            VaultError::Token(e) => e.kind(),
            VaultError::Settlement(_) => ErrorKind::External,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a vault is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Deployed, possibly funded, rate not yet fixed.
    Uninitialized,
    /// Rate fixed; swaps allowed while not paused.
    Active,
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultStatus::Uninitialized => write!(f, "Uninitialized"),
            VaultStatus::Active => write!(f, "Active"),
        }
    }
}

/// The outcome of a successful swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub holder: Address,
    pub token_amount: u128,
    pub payout: u128,
}

/// Running totals a swap advances, snapshotted so a failed interaction can
/// restore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tally {
    total_redeemed: u128,
    tokens_redeemed: u128,
    swap_count: u64,
}

// ---------------------------------------------------------------------------
// RedemptionVault
// ---------------------------------------------------------------------------

/// Pro-rata redemption escrow for one project token.
#[derive(Debug, Clone)]
pub struct RedemptionVault {
    pub(crate) address: Address,
    pub(crate) token: Address,
    pub(crate) settlement_asset: Address,
    pub(crate) admin: Address,
    pub(crate) status: VaultStatus,
    pub(crate) rate: u128,
    pub(crate) paused: bool,
    pub(crate) deposited_at_activation: u128,
    pub(crate) total_redeemed: u128,
    pub(crate) tokens_redeemed: u128,
    pub(crate) swap_count: u64,
    pub(crate) deployed_at: DateTime<Utc>,
    pub(crate) activated_at: Option<DateTime<Utc>>,
    pub(crate) events: Vec<VaultEvent>,
}

impl RedemptionVault {
    /// Deploys an uninitialized vault at a fresh `vlt_` address.
    pub fn new(token: Address, settlement_asset: Address, admin: Address) -> Self {
        Self {
            address: Address::generate(AddressKind::Vault),
            token,
            settlement_asset,
            admin,
            status: VaultStatus::Uninitialized,
            rate: 0,
            paused: false,
            deposited_at_activation: 0,
            total_redeemed: 0,
            tokens_redeemed: 0,
            swap_count: 0,
            deployed_at: Utc::now(),
            activated_at: None,
            events: Vec::new(),
        }
    }

    // -- Queries ------------------------------------------------------------

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn token(&self) -> &Address {
        &self.token
    }

    pub fn settlement_asset(&self) -> &Address {
        &self.settlement_asset
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    pub fn status(&self) -> VaultStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == VaultStatus::Active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Settlement units per whole token, scaled by `RATE_SCALE`. Zero until
    /// activation.
    pub fn rate(&self) -> u128 {
        self.rate
    }

    /// Settlement units the vault held when the rate was fixed.
    pub fn deposited_at_activation(&self) -> u128 {
        self.deposited_at_activation
    }

    /// Settlement units paid out so far.
    pub fn total_redeemed(&self) -> u128 {
        self.total_redeemed
    }

    /// Token units burned through this vault so far.
    pub fn tokens_redeemed(&self) -> u128 {
        self.tokens_redeemed
    }

    pub fn swap_count(&self) -> u64 {
        self.swap_count
    }

    pub fn deployed_at(&self) -> DateTime<Utc> {
        self.deployed_at
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at
    }

    /// Settlement units currently available for payouts.
    pub fn available_settlement<A: SettlementAsset + ?Sized>(&self, asset: &A) -> Result<u128, VaultError> {
        self.ensure_asset(asset)?;
        Ok(asset.balance_of(&self.address))
    }

    /// Takes every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Activation ---------------------------------------------------------

    /// Fixes the redemption rate from the current deposit and token supply.
    /// Administrator only, once.
    ///
    /// Allowed while paused: pausing gates swaps, not activation.
    pub fn activate_redemption<A: SettlementAsset + ?Sized>(
        &mut self,
        caller: &Address,
        token: &ProjectToken,
        asset: &A,
    ) -> Result<u128, VaultError> {
        self.ensure_admin(caller)?;
        if let Some(at) = self.activated_at {
            return Err(VaultError::AlreadyActive(at));
        }
        self.ensure_token(token)?;
        self.ensure_asset(asset)?;

        let deposited = asset.balance_of(&self.address);
        if deposited == 0 {
            return Err(VaultError::NothingDeposited);
        }
        let total_supply = token.total_supply();
        if total_supply == 0 {
            return Err(VaultError::NoSupply);
        }
        let rate = math::redemption_rate(deposited, total_supply)
            .ok_or(VaultError::Overflow("redemption rate"))?;
        if rate == 0 {
            return Err(VaultError::RateRoundsToZero {
                deposited,
                total_supply,
            });
        }

        let now = Utc::now();
        self.rate = rate;
        self.deposited_at_activation = deposited;
        self.status = VaultStatus::Active;
        self.activated_at = Some(now);

        info!(vault = %self.address, deposited, total_supply, rate, "redemption activated");
        self.events.push(VaultEvent::RedemptionActivated {
            deposited,
            total_supply,
            rate,
            at: now,
        });
        Ok(rate)
    }

    // -- Redemption ---------------------------------------------------------

    /// Previews the payout for `token_amount` without changing anything.
    ///
    /// Applies the same lifecycle, rounding and capacity checks as `swap`,
    /// except the pause gate.
    pub fn quote<A: SettlementAsset + ?Sized>(&self, token_amount: u128, asset: &A) -> Result<u128, VaultError> {
        if !self.is_active() {
            return Err(VaultError::NotActive);
        }
        self.ensure_asset(asset)?;
        self.payout_for(token_amount, asset.balance_of(&self.address))
    }

    fn payout_for(&self, token_amount: u128, available: u128) -> Result<u128, VaultError> {
        if token_amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let payout = math::redemption_payout(token_amount, self.rate)
            .ok_or(VaultError::Overflow("payout"))?;
        if payout == 0 {
            return Err(VaultError::PayoutRoundsToZero { token_amount });
        }
        if payout > available {
            return Err(VaultError::InsufficientSettlement {
                requested: payout,
                available,
            });
        }
        Ok(payout)
    }

    /// Burns `token_amount` of the caller's tokens and pays the caller
    /// `token_amount * rate / RATE_SCALE` settlement units.
    ///
    /// The caller must have approved this vault on the token for at least
    /// `token_amount` beforehand.
    pub fn swap<A: SettlementAsset + ?Sized>(
        &mut self,
        caller: &Address,
        token_amount: u128,
        token: &mut ProjectToken,
        asset: &mut A,
    ) -> Result<Redemption, VaultError> {
        // Checks.
        if !self.is_active() {
            return Err(VaultError::NotActive);
        }
        if self.paused {
            return Err(VaultError::Paused(self.address.clone()));
        }
        self.ensure_token(token)?;
        self.ensure_asset(asset)?;
        let payout = self.payout_for(token_amount, asset.balance_of(&self.address))?;
        token.check_burn_from(&self.address, caller, token_amount)?;

        // Effects.
        let before = self.tally();
        let after = Tally {
            total_redeemed: before
                .total_redeemed
                .checked_add(payout)
                .ok_or(VaultError::Overflow("total redeemed"))?,
            tokens_redeemed: before
                .tokens_redeemed
                .checked_add(token_amount)
                .ok_or(VaultError::Overflow("tokens redeemed"))?,
            swap_count: before
                .swap_count
                .checked_add(1)
                .ok_or(VaultError::Overflow("swap count"))?,
        };
        self.restore(after);

        // Interactions.
        if let Err(e) = token.burn_from(&self.address, caller, token_amount) {
            self.restore(before);
            return Err(e.into());
        }
        if let Err(e) = asset.transfer(&self.address, caller, payout) {
            self.restore(before);
            if let Err(undo) = token.undo_burn_from(&self.address, caller, token_amount) {
                error!(vault = %self.address, holder = %caller, error = %undo, "failed to restore burned units");
            }
            warn!(vault = %self.address, holder = %caller, error = %e, "payout refused; swap rolled back");
            return Err(e.into());
        }

        info!(vault = %self.address, holder = %caller, token_amount, payout, "redeemed");
        self.events.push(VaultEvent::Redeemed {
            holder: caller.clone(),
            token_amount,
            payout,
        });
        Ok(Redemption {
            holder: caller.clone(),
            token_amount,
            payout,
        })
    }

    fn tally(&self) -> Tally {
        Tally {
            total_redeemed: self.total_redeemed,
            tokens_redeemed: self.tokens_redeemed,
            swap_count: self.swap_count,
        }
    }

    fn restore(&mut self, tally: Tally) {
        self.total_redeemed = tally.total_redeemed;
        self.tokens_redeemed = tally.tokens_redeemed;
        self.swap_count = tally.swap_count;
    }

    // -- Administration -----------------------------------------------------

    /// Suspends swaps. Administrator only.
    pub fn pause(&mut self, caller: &Address) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        if self.paused {
            return Err(VaultError::PauseUnchanged("paused"));
        }
        self.paused = true;
        info!(vault = %self.address, by = %caller, "vault paused");
        self.events.push(VaultEvent::Paused { by: caller.clone() });
        Ok(())
    }

    /// Resumes swaps. Administrator only.
    pub fn unpause(&mut self, caller: &Address) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        if !self.paused {
            return Err(VaultError::PauseUnchanged("unpaused"));
        }
        self.paused = false;
        info!(vault = %self.address, by = %caller, "vault unpaused");
        self.events.push(VaultEvent::Unpaused { by: caller.clone() });
        Ok(())
    }

    /// Hands the administrator role to `new_admin`.
    pub fn transfer_admin(&mut self, caller: &Address, new_admin: Address) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        self.reassign_admin(new_admin);
        Ok(())
    }

    pub(crate) fn reassign_admin(&mut self, new_admin: Address) {
        let previous = std::mem::replace(&mut self.admin, new_admin);
        info!(vault = %self.address, %previous, new = %self.admin, "vault admin transferred");
        self.events.push(VaultEvent::AdminTransferred {
            previous,
            new: self.admin.clone(),
        });
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), VaultError> {
        if caller != &self.admin {
            warn!(vault = %self.address, %caller, "rejected privileged vault call");
            return Err(VaultError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    fn ensure_token(&self, token: &ProjectToken) -> Result<(), VaultError> {
        if token.address() != &self.token {
            return Err(VaultError::TokenMismatch {
                expected: self.token.clone(),
                found: token.address().clone(),
            });
        }
        Ok(())
    }

    fn ensure_asset<A: SettlementAsset + ?Sized>(&self, asset: &A) -> Result<(), VaultError> {
        if asset.address() != &self.settlement_asset {
            return Err(VaultError::AssetMismatch {
                expected: self.settlement_asset.clone(),
                found: asset.address().clone(),
            });
        }
        Ok(())
    }
}
