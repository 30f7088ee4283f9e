//! # Balance Tables
//!
//! A [`BalanceSheet`] maps holder addresses to unit counts for one fungible
//! ledger. It enforces the two invariants every ledger in offtake relies on:
//! a balance can never go negative, and a credit can never wrap.
//!
//! The sheet does not track total supply. Owning ledgers keep their own
//! `total_supply` and must move it in lockstep with credits and debits;
//! [`BalanceSheet::total`] is there so tests can check that they did.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by balance and allowance tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Attempted to debit more than the holder's balance.
    #[error("insufficient balance: {holder} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The holder being debited.
        holder: Address,
        /// The holder's current balance.
        available: u128,
        /// The amount that was requested.
        requested: u128,
    },

    /// Attempted to spend more than the delegate's allowance.
    #[error(
        "insufficient allowance: {spender} may move {allowance} of {owner}'s units, requested {requested}"
    )]
    InsufficientAllowance {
        /// The holder who granted the allowance.
        owner: Address,
        /// The delegate spending it.
        spender: Address,
        /// The remaining allowance.
        allowance: u128,
        /// The amount that was requested.
        requested: u128,
    },

    /// A credit would overflow `u128`.
    #[error("balance overflow: {holder} has {current}, credit {credit}")]
    Overflow {
        /// The holder being credited.
        holder: Address,
        /// The holder's balance before the failed credit.
        current: u128,
        /// The amount that caused the overflow.
        credit: u128,
    },
}

// ---------------------------------------------------------------------------
// BalanceSheet
// ---------------------------------------------------------------------------

/// Per-holder balances of a single fungible ledger.
///
/// Backed by a `BTreeMap` so iteration and serialization order are
/// deterministic. Zero balances are not stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    balances: BTreeMap<Address, u128>,
}

impl BalanceSheet {
    /// Creates an empty balance sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance of `holder`, or 0 if it holds nothing.
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Checks that `holder` can be debited `amount` without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] if the debit would fail.
    pub fn ensure_available(&self, holder: &Address, amount: u128) -> Result<(), LedgerError> {
        let available = self.balance_of(holder);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                holder: holder.clone(),
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Adds `amount` to `holder`'s balance and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the credit would exceed `u128::MAX`.
    pub fn credit(&mut self, holder: &Address, amount: u128) -> Result<u128, LedgerError> {
        let current = self.balance_of(holder);
        let updated = current.checked_add(amount).ok_or(LedgerError::Overflow {
            holder: holder.clone(),
            current,
            credit: amount,
        })?;
        if updated > 0 {
            self.balances.insert(holder.clone(), updated);
        }
        Ok(updated)
    }

    /// Subtracts `amount` from `holder`'s balance and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] if the holder has less
    /// than `amount`.
    pub fn debit(&mut self, holder: &Address, amount: u128) -> Result<u128, LedgerError> {
        self.ensure_available(holder, amount)?;
        let updated = self.balance_of(holder) - amount;
        if updated == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(holder.clone(), updated);
        }
        Ok(updated)
    }

    /// Moves `amount` from `from` to `to`. Either both sides change or neither.
    ///
    /// # Errors
    ///
    /// Returns the debit or credit error; on error no balance has changed.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        self.ensure_available(from, amount)?;
        if from == to {
            return Ok(());
        }
        let to_balance = self.balance_of(to);
        if to_balance.checked_add(amount).is_none() {
            return Err(LedgerError::Overflow {
                holder: to.clone(),
                current: to_balance,
                credit: amount,
            });
        }
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }

    /// Sum of all balances, or `None` if it overflows.
    pub fn total(&self) -> Option<u128> {
        self.balances
            .values()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
    }

    /// Iterates over `(holder, balance)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, u128)> {
        self.balances.iter().map(|(a, b)| (a, *b))
    }

    /// Number of holders with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Returns `true` if nobody holds anything.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl FromIterator<(Address, u128)> for BalanceSheet {
    /// Builds a sheet from `(holder, balance)` pairs. Zero balances are
    /// dropped; a repeated holder keeps its last balance.
    fn from_iter<I: IntoIterator<Item = (Address, u128)>>(iter: I) -> Self {
        Self {
            balances: iter.into_iter().filter(|(_, b)| *b > 0).collect(),
        }
    }
}
