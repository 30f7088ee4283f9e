//! # Project Token Contract
//!
//! A fungible ledger of forward-claim units for one approved project. The
//! registry issues one at approval time with the full proposed supply
//! minted to the administrator's custody; from then on it behaves like any
//! delegated-allowance token:
//!
//! - `transfer` / `transfer_from` move units, the latter against an allowance.
//! - `approve` / `increase_allowance` / `decrease_allowance` manage allowances.
//! - `mint` (administrator only) and `burn` / `burn_from` change supply.
//! - `pause` / `unpause` (administrator only) gate every balance-affecting
//!   operation. Allowance management stays open while paused.
//!
//! `burn_from` is how a redemption vault destroys a holder's units: the
//! holder approves the vault first, and the vault can never burn more than
//! that allowance.
//!
//! ## Invariant
//!
//! The sum of all balances equals `total_supply` after every operation,
//! successful or not. Every operation validates fully before it mutates.

use chrono::{DateTime, Utc};
use offtake_protocol::config::{MAX_NAME_LENGTH, MAX_SYMBOL_LENGTH, PROJECT_TOKEN_DECIMALS};
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::{Address, AddressKind};
use offtake_protocol::ledger::{AllowanceTable, BalanceSheet, LedgerError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::TokenEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during project token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// A balance or allowance check failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The amount must be greater than zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The token name is empty or exceeds the length limit.
    #[error("invalid token name: {0}")]
    InvalidName(String),

    /// The ticker symbol is empty or exceeds the length limit.
    #[error("invalid token symbol: {0}")]
    InvalidSymbol(String),

    /// The caller is not the token administrator.
    #[error("unauthorized: {caller} is not the administrator of this token")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// Balance-affecting operations are suspended.
    #[error("token {0} is paused")]
    Paused(Address),

    /// `pause` on a paused token, or `unpause` on a live one.
    #[error("token is already {0}")]
    PauseUnchanged(&'static str),

    /// Minting would overflow the total supply.
    #[error("supply overflow: minting {amount} would exceed u128::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: u128,
    },

    /// Raising an allowance would overflow.
    #[error("allowance overflow")]
    AllowanceOverflow,
}

impl TokenError {
    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Ledger(_) => ErrorKind::Arithmetic,
            TokenError::ZeroAmount | TokenError::InvalidName(_) | TokenError::InvalidSymbol(_) => {
                ErrorKind::Validation
            }
            TokenError::Unauthorized { .. } => ErrorKind::Authorization,
            TokenError::Paused(_) | TokenError::PauseUnchanged(_) => ErrorKind::Lifecycle,
            TokenError::SupplyOverflow { .. } | TokenError::AllowanceOverflow => {
                ErrorKind::Arithmetic
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectToken
// ---------------------------------------------------------------------------

/// The forward-claim ledger of one project.
#[derive(Debug, Clone)]
pub struct ProjectToken {
    pub(crate) address: Address,
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) decimals: u8,
    pub(crate) admin: Address,
    pub(crate) balances: BalanceSheet,
    pub(crate) allowances: AllowanceTable,
    pub(crate) total_supply: u128,
    pub(crate) paused: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) events: Vec<TokenEvent>,
}

impl ProjectToken {
    /// Creates an empty token at a freshly generated `tok_` address.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidName`] or [`TokenError::InvalidSymbol`] if
    /// either is blank or too long.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        admin: Address,
    ) -> Result<Self, TokenError> {
        let name = name.into();
        let symbol = symbol.into();
        if name.trim().is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(TokenError::InvalidName(name));
        }
        if symbol.trim().is_empty() || symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(TokenError::InvalidSymbol(symbol));
        }
        Ok(Self {
            address: Address::generate(AddressKind::Token),
            name,
            symbol,
            decimals: PROJECT_TOKEN_DECIMALS,
            admin,
            balances: BalanceSheet::new(),
            allowances: AllowanceTable::new(),
            total_supply: 0,
            paused: false,
            created_at: Utc::now(),
            events: Vec::new(),
        })
    }

    /// Creates a token and mints `initial_supply` to `custody`.
    pub fn issue(
        name: impl Into<String>,
        symbol: impl Into<String>,
        admin: Address,
        custody: &Address,
        initial_supply: u128,
    ) -> Result<Self, TokenError> {
        let mut token = Self::new(name, symbol, admin)?;
        let admin = token.admin.clone();
        token.mint(&admin, custody, initial_supply)?;
        Ok(token)
    }

    // -- Queries ------------------------------------------------------------

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.balance_of(holder)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.allowance(owner, spender)
    }

    /// Number of addresses holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.holder_count()
    }

    /// Takes every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<TokenEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Transfers ----------------------------------------------------------

    /// Moves `amount` from the caller to `to`.
    pub fn transfer(&mut self, caller: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        self.ensure_live(amount)?;
        self.balances.transfer(caller, to, amount)?;
        debug!(token = %self.address, from = %caller, %to, amount, "transfer");
        self.events.push(TokenEvent::Transfer {
            from: caller.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    /// Moves `amount` from `from` to `to`, spending the allowance `from`
    /// granted the caller.
    pub fn transfer_from(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.ensure_live(amount)?;
        self.allowances.ensure_allowed(from, caller, amount)?;
        self.balances.transfer(from, to, amount)?;
        self.allowances.spend(from, caller, amount)?;
        debug!(token = %self.address, spender = %caller, %from, %to, amount, "transfer_from");
        self.events.push(TokenEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    // -- Allowances ---------------------------------------------------------

    /// Sets the allowance the caller grants `spender`. Zero revokes.
    pub fn approve(&mut self, caller: &Address, spender: &Address, amount: u128) -> Result<(), TokenError> {
        self.allowances.set(caller, spender, amount);
        debug!(token = %self.address, owner = %caller, %spender, amount, "approve");
        self.events.push(TokenEvent::Approval {
            owner: caller.clone(),
            spender: spender.clone(),
            amount,
        });
        Ok(())
    }

    /// Raises the caller's allowance for `spender` by `added`.
    pub fn increase_allowance(
        &mut self,
        caller: &Address,
        spender: &Address,
        added: u128,
    ) -> Result<u128, TokenError> {
        let updated = self
            .allowance(caller, spender)
            .checked_add(added)
            .ok_or(TokenError::AllowanceOverflow)?;
        self.approve(caller, spender, updated)?;
        Ok(updated)
    }

    /// Lowers the caller's allowance for `spender` by `subtracted`.
    pub fn decrease_allowance(
        &mut self,
        caller: &Address,
        spender: &Address,
        subtracted: u128,
    ) -> Result<u128, TokenError> {
        self.allowances.ensure_allowed(caller, spender, subtracted)?;
        let updated = self.allowance(caller, spender) - subtracted;
        self.approve(caller, spender, updated)?;
        Ok(updated)
    }

    // -- Supply -------------------------------------------------------------

    /// Creates `amount` new units for `to`. Administrator only.
    pub fn mint(&mut self, caller: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        self.ensure_admin(caller)?;
        self.ensure_live(amount)?;
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        self.balances.credit(to, amount)?;
        self.total_supply = supply;
        info!(token = %self.address, %to, amount, total_supply = supply, "minted");
        self.events.push(TokenEvent::Mint {
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    /// Destroys `amount` of the caller's own units.
    pub fn burn(&mut self, caller: &Address, amount: u128) -> Result<(), TokenError> {
        self.ensure_live(amount)?;
        self.balances.debit(caller, amount)?;
        self.total_supply -= amount;
        debug!(token = %self.address, holder = %caller, amount, "burn");
        self.events.push(TokenEvent::Burn {
            from: caller.clone(),
            by: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Validates a `burn_from` without performing it.
    pub fn check_burn_from(&self, caller: &Address, holder: &Address, amount: u128) -> Result<(), TokenError> {
        self.ensure_live(amount)?;
        self.allowances.ensure_allowed(holder, caller, amount)?;
        self.balances.ensure_available(holder, amount)?;
        Ok(())
    }

    /// Destroys `amount` of `holder`'s units, spending the allowance
    /// `holder` granted the caller.
    pub fn burn_from(&mut self, caller: &Address, holder: &Address, amount: u128) -> Result<(), TokenError> {
        self.check_burn_from(caller, holder, amount)?;
        self.balances.debit(holder, amount)?;
        self.allowances.spend(holder, caller, amount)?;
        self.total_supply -= amount;
        debug!(token = %self.address, %holder, spender = %caller, amount, "burn_from");
        self.events.push(TokenEvent::Burn {
            from: holder.clone(),
            by: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Reverses the most recent successful `burn_from(caller, holder, amount)`.
    ///
    /// Only the redemption vault calls this, when the payout leg of a swap
    /// fails after the burn leg already went through.
    pub(crate) fn undo_burn_from(
        &mut self,
        caller: &Address,
        holder: &Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        let allowance = self
            .allowance(holder, caller)
            .checked_add(amount)
            .ok_or(TokenError::AllowanceOverflow)?;
        self.balances.credit(holder, amount)?;
        self.allowances.set(holder, caller, allowance);
        self.total_supply = supply;

        let burned = TokenEvent::Burn {
            from: holder.clone(),
            by: caller.clone(),
            amount,
        };
        if let Some(pos) = self.events.iter().rposition(|e| *e == burned) {
            self.events.remove(pos);
        }
        Ok(())
    }

    // -- Administration -----------------------------------------------------

    /// Suspends transfers, mints and burns. Administrator only.
    pub fn pause(&mut self, caller: &Address) -> Result<(), TokenError> {
        self.ensure_admin(caller)?;
        if self.paused {
            return Err(TokenError::PauseUnchanged("paused"));
        }
        self.paused = true;
        info!(token = %self.address, by = %caller, "token paused");
        self.events.push(TokenEvent::Paused { by: caller.clone() });
        Ok(())
    }

    /// Resumes balance-affecting operations. Administrator only.
    pub fn unpause(&mut self, caller: &Address) -> Result<(), TokenError> {
        self.ensure_admin(caller)?;
        if !self.paused {
            return Err(TokenError::PauseUnchanged("unpaused"));
        }
        self.paused = false;
        info!(token = %self.address, by = %caller, "token unpaused");
        self.events.push(TokenEvent::Unpaused { by: caller.clone() });
        Ok(())
    }

    /// Hands the administrator role to `new_admin`. The caller loses it
    /// immediately.
    pub fn transfer_admin(&mut self, caller: &Address, new_admin: Address) -> Result<(), TokenError> {
        self.ensure_admin(caller)?;
        self.reassign_admin(new_admin);
        Ok(())
    }

    pub(crate) fn reassign_admin(&mut self, new_admin: Address) {
        let previous = std::mem::replace(&mut self.admin, new_admin);
        info!(token = %self.address, %previous, new = %self.admin, "token admin transferred");
        self.events.push(TokenEvent::AdminTransferred {
            previous,
            new: self.admin.clone(),
        });
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), TokenError> {
        if caller != &self.admin {
            warn!(token = %self.address, %caller, "rejected privileged token call");
            return Err(TokenError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    fn ensure_live(&self, amount: u128) -> Result<(), TokenError> {
        if self.paused {
            return Err(TokenError::Paused(self.address.clone()));
        }
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn token_with(supply: u128) -> ProjectToken {
        ProjectToken::issue("Cerrado Reforestation 2027", "CRF27", addr("admin"), &addr("admin"), supply)
            .unwrap()
    }

    fn supply_matches_balances(token: &ProjectToken) -> bool {
        token.balances.total() == Some(token.total_supply())
    }

    #[test]
    fn issue_mints_to_custody() {
        let token = token_with(1_000_000);
        assert_eq!(token.total_supply(), 1_000_000);
        assert_eq!(token.balance_of(&addr("admin")), 1_000_000);
        assert_eq!(token.decimals(), PROJECT_TOKEN_DECIMALS);
        assert!(token.address().is_kind(AddressKind::Token));
    }

    #[test]
    fn rejects_blank_metadata() {
        assert!(matches!(
            ProjectToken::new(" ", "X", addr("admin")),
            Err(TokenError::InvalidName(_))
        ));
        assert!(matches!(
            ProjectToken::new("Name", "", addr("admin")),
            Err(TokenError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn transfer_moves_units() {
        let mut token = token_with(100);
        token.transfer(&addr("admin"), &addr("alice"), 40).unwrap();
        assert_eq!(token.balance_of(&addr("alice")), 40);
        assert_eq!(token.balance_of(&addr("admin")), 60);
        assert!(supply_matches_balances(&token));
    }

    #[test]
    fn zero_and_oversized_transfers_fail() {
        let mut token = token_with(100);
        let err = token.transfer(&addr("admin"), &addr("alice"), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = token.transfer(&addr("admin"), &addr("alice"), 101).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        assert_eq!(token.balance_of(&addr("admin")), 100);
    }

    #[test]
    fn only_admin_mints() {
        let mut token = token_with(100);
        let err = token.mint(&addr("alice"), &addr("alice"), 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn mint_then_burn_restores_supply() {
        let mut token = token_with(100);
        token.mint(&addr("admin"), &addr("bob"), 25).unwrap();
        assert_eq!(token.total_supply(), 125);
        token.burn(&addr("bob"), 25).unwrap();
        assert_eq!(token.total_supply(), 100);
        assert!(supply_matches_balances(&token));
    }

    #[test]
    fn burn_from_requires_allowance() {
        let mut token = token_with(100);
        let (admin, vault) = (addr("admin"), addr("vault"));
        assert!(token.burn_from(&vault, &admin, 10).is_err());

        token.approve(&admin, &vault, 10).unwrap();
        token.burn_from(&vault, &admin, 10).unwrap();
        assert_eq!(token.total_supply(), 90);
        assert_eq!(token.allowance(&admin, &vault), 0);
        assert!(token.burn_from(&vault, &admin, 1).is_err());
    }

    #[test]
    fn burn_from_checks_balance_even_with_allowance() {
        let mut token = token_with(100);
        let (alice, vault) = (addr("alice"), addr("vault"));
        token.transfer(&addr("admin"), &alice, 5).unwrap();
        token.approve(&alice, &vault, 50).unwrap();
        let err = token.burn_from(&vault, &alice, 6).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Ledger(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(token.allowance(&alice, &vault), 50);
    }

    #[test]
    fn undo_burn_from_restores_everything() {
        let mut token = token_with(100);
        let (admin, vault) = (addr("admin"), addr("vault"));
        token.approve(&admin, &vault, 30).unwrap();
        token.drain_events();

        token.burn_from(&vault, &admin, 30).unwrap();
        token.undo_burn_from(&vault, &admin, 30).unwrap();

        assert_eq!(token.total_supply(), 100);
        assert_eq!(token.balance_of(&admin), 100);
        assert_eq!(token.allowance(&admin, &vault), 30);
        assert!(token.drain_events().is_empty());
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let mut token = token_with(100);
        let (admin, broker, bob) = (addr("admin"), addr("broker"), addr("bob"));
        token.approve(&admin, &broker, 30).unwrap();
        token.transfer_from(&broker, &admin, &bob, 20).unwrap();
        assert_eq!(token.allowance(&admin, &broker), 10);
        assert_eq!(token.balance_of(&bob), 20);
        assert!(token.transfer_from(&broker, &admin, &bob, 11).is_err());
    }

    #[test]
    fn allowance_adjustments() {
        let mut token = token_with(100);
        let (admin, vault) = (addr("admin"), addr("vault"));
        assert_eq!(token.increase_allowance(&admin, &vault, 10).unwrap(), 10);
        assert_eq!(token.increase_allowance(&admin, &vault, 5).unwrap(), 15);
        assert_eq!(token.decrease_allowance(&admin, &vault, 15).unwrap(), 0);
        assert!(token.decrease_allowance(&admin, &vault, 1).is_err());
    }

    #[test]
    fn pause_blocks_balance_changes_uniformly() {
        let mut token = token_with(100);
        let (admin, alice) = (addr("admin"), addr("alice"));
        token.approve(&admin, &alice, 10).unwrap();
        token.pause(&admin).unwrap();

        for err in [
            token.transfer(&admin, &alice, 1).unwrap_err(),
            token.mint(&admin, &alice, 1).unwrap_err(),
            token.burn(&admin, 1).unwrap_err(),
            token.burn_from(&alice, &admin, 1).unwrap_err(),
            token.transfer_from(&alice, &admin, &alice, 1).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Lifecycle);
        }

        // Allowance management stays available.
        token.approve(&admin, &alice, 20).unwrap();

        assert!(token.pause(&admin).is_err());
        token.unpause(&admin).unwrap();
        token.transfer(&admin, &alice, 1).unwrap();
    }

    #[test]
    fn admin_transfer_revokes_old_admin() {
        let mut token = token_with(100);
        let (admin, treasury) = (addr("admin"), addr("treasury"));
        token.transfer_admin(&admin, treasury.clone()).unwrap();
        assert_eq!(token.admin(), &treasury);
        assert!(token.pause(&admin).is_err());
        token.pause(&treasury).unwrap();
    }

    #[test]
    fn events_are_recorded_in_order() {
        let mut token = token_with(10);
        token.transfer(&addr("admin"), &addr("alice"), 3).unwrap();
        let events = token.drain_events();
        assert!(matches!(events[0], TokenEvent::Mint { amount: 10, .. }));
        assert!(matches!(events[1], TokenEvent::Transfer { amount: 3, .. }));
        assert!(token.drain_events().is_empty());
    }
}
