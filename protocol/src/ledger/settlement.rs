//! # Settlement Assets
//!
//! Redemption vaults pay out in an external fungible asset (a USD-pegged
//! stablecoin, typically). The vault only ever needs four things from that
//! asset: its precision, a balance lookup, a plain transfer out of the
//! vault's own balance, and a delegated transfer. Those are the
//! [`SettlementAsset`] trait.
//!
//! Every trait method fails loudly. A transfer that cannot be made returns
//! `Err`, never a `false` that a caller could forget to check.
//!
//! [`SettlementLedger`] is the in-memory implementation used by tests and by
//! the node's devnet. Its issuer can mint (that is how vaults get funded in
//! a devnet) and can freeze the whole ledger, which makes every transfer
//! fail. Freezing is the lever tests use to exercise vault rollback.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::allowance::AllowanceTable;
use super::balance::{BalanceSheet, LedgerError};
use crate::config::MAX_SETTLEMENT_DECIMALS;
use crate::identity::{Address, AddressKind};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a settlement asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// A balance or allowance check failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The amount must be greater than zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The caller is not the asset's issuer.
    #[error("{caller} is not the issuer of {asset}")]
    NotIssuer {
        /// The rejected caller.
        caller: Address,
        /// The asset address.
        asset: Address,
    },

    /// The issuer froze the ledger; no units can move.
    #[error("settlement asset {0} is frozen")]
    Frozen(Address),

    /// Decimal precision outside the supported range.
    #[error("unsupported precision: {0} decimals (max {max})", max = MAX_SETTLEMENT_DECIMALS)]
    UnsupportedDecimals(u8),

    /// Total supply would overflow.
    #[error("total supply overflow")]
    SupplyOverflow,
}

// ---------------------------------------------------------------------------
// SettlementAsset
// ---------------------------------------------------------------------------

/// The external fungible ledger a redemption vault pays out in.
pub trait SettlementAsset {
    /// The ledger's own address.
    fn address(&self) -> &Address;

    /// Decimal places of one whole unit.
    fn decimals(&self) -> u8;

    /// Balance held by `holder`.
    fn balance_of(&self, holder: &Address) -> u128;

    /// Moves `amount` out of `from`'s balance. The caller acts as `from`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128)
        -> Result<(), SettlementError>;

    /// Moves `amount` from `from` to `to` on the strength of an allowance
    /// `from` granted to `spender`.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), SettlementError>;
}

// ---------------------------------------------------------------------------
// SettlementLedger
// ---------------------------------------------------------------------------

/// An in-memory settlement asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementLedger {
    address: Address,
    symbol: String,
    decimals: u8,
    issuer: Address,
    balances: BalanceSheet,
    allowances: AllowanceTable,
    total_supply: u128,
    frozen: bool,
}

impl SettlementLedger {
    /// Creates an empty ledger at a freshly generated `ast_` address.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::UnsupportedDecimals`] if `decimals` exceeds
    /// [`MAX_SETTLEMENT_DECIMALS`].
    pub fn new(
        symbol: impl Into<String>,
        decimals: u8,
        issuer: Address,
    ) -> Result<Self, SettlementError> {
        Self::with_address(Address::generate(AddressKind::Asset), symbol, decimals, issuer)
    }

    /// Creates an empty ledger at a caller-chosen address.
    pub fn with_address(
        address: Address,
        symbol: impl Into<String>,
        decimals: u8,
        issuer: Address,
    ) -> Result<Self, SettlementError> {
        if decimals > MAX_SETTLEMENT_DECIMALS {
            return Err(SettlementError::UnsupportedDecimals(decimals));
        }
        Ok(Self {
            address,
            symbol: symbol.into(),
            decimals,
            issuer,
            balances: BalanceSheet::new(),
            allowances: AllowanceTable::new(),
            total_supply: 0,
            frozen: false,
        })
    }

    /// Rebuilds a ledger from previously saved state. The total supply is
    /// recomputed from the balances.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::UnsupportedDecimals`] or
    /// [`SettlementError::SupplyOverflow`].
    pub fn restore(
        address: Address,
        symbol: impl Into<String>,
        decimals: u8,
        issuer: Address,
        balances: BalanceSheet,
        allowances: AllowanceTable,
        frozen: bool,
    ) -> Result<Self, SettlementError> {
        let mut ledger = Self::with_address(address, symbol, decimals, issuer)?;
        ledger.total_supply = balances.total().ok_or(SettlementError::SupplyOverflow)?;
        ledger.balances = balances;
        ledger.allowances = allowances;
        ledger.frozen = frozen;
        Ok(ledger)
    }

    /// Ticker symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The identity allowed to mint and freeze.
    pub fn issuer(&self) -> &Address {
        &self.issuer
    }

    /// Units in circulation.
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Whether transfers are currently refused.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Every holder's balance.
    pub fn balances(&self) -> &BalanceSheet {
        &self.balances
    }

    /// Every live allowance.
    pub fn allowances(&self) -> &AllowanceTable {
        &self.allowances
    }

    /// Remaining allowance `owner` granted to `spender`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.allowance(owner, spender)
    }

    /// Issues `amount` new units to `to`. Issuer only.
    pub fn mint(&mut self, caller: &Address, to: &Address, amount: u128) -> Result<(), SettlementError> {
        self.ensure_issuer(caller)?;
        if amount == 0 {
            return Err(SettlementError::ZeroAmount);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(SettlementError::SupplyOverflow)?;
        self.balances.credit(to, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Sets the allowance `owner` grants `spender`.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) {
        self.allowances.set(owner, spender, amount);
    }

    /// Freezes or unfreezes every transfer. Issuer only.
    pub fn set_frozen(&mut self, caller: &Address, frozen: bool) -> Result<(), SettlementError> {
        self.ensure_issuer(caller)?;
        self.frozen = frozen;
        Ok(())
    }

    fn ensure_issuer(&self, caller: &Address) -> Result<(), SettlementError> {
        if caller != &self.issuer {
            return Err(SettlementError::NotIssuer {
                caller: caller.clone(),
                asset: self.address.clone(),
            });
        }
        Ok(())
    }

    fn ensure_movable(&self, amount: u128) -> Result<(), SettlementError> {
        if self.frozen {
            return Err(SettlementError::Frozen(self.address.clone()));
        }
        if amount == 0 {
            return Err(SettlementError::ZeroAmount);
        }
        Ok(())
    }
}

impl SettlementAsset for SettlementLedger {
    fn address(&self) -> &Address {
        &self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.balance_of(holder)
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), SettlementError> {
        self.ensure_movable(amount)?;
        self.balances.transfer(from, to, amount)?;
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), SettlementError> {
        self.ensure_movable(amount)?;
        self.allowances.ensure_allowed(from, spender, amount)?;
        self.balances.transfer(from, to, amount)?;
        self.allowances.spend(from, spender, amount)?;
        Ok(())
    }
}
