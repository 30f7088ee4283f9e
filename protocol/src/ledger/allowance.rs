//! # Delegated Allowances
//!
//! An [`AllowanceTable`] records how much of an owner's balance each
//! delegate may move or burn on the owner's behalf. It is the capability
//! table a redemption vault consults before burning a holder's tokens: the
//! vault never gets unconditional debit rights.
//!
//! Stored as a nested map (`owner -> spender -> amount`) so it serializes
//! cleanly to both bincode and JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::balance::LedgerError;
use crate::identity::Address;

/// Owner → spender → remaining allowance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceTable {
    allowances: BTreeMap<Address, BTreeMap<Address, u128>>,
}

impl AllowanceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining allowance `owner` has granted to `spender`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Sets the allowance, replacing any previous value. Zero revokes.
    pub fn set(&mut self, owner: &Address, spender: &Address, amount: u128) {
        if amount == 0 {
            if let Some(spenders) = self.allowances.get_mut(owner) {
                spenders.remove(spender);
                if spenders.is_empty() {
                    self.allowances.remove(owner);
                }
            }
            return;
        }
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
    }

    /// Checks that `spender` may move `amount` of `owner`'s units.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientAllowance`] if it may not.
    pub fn ensure_allowed(
        &self,
        owner: &Address,
        spender: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                allowance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Consumes `amount` of the allowance and returns what remains.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientAllowance`]; the table is unchanged.
    pub fn spend(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: u128,
    ) -> Result<u128, LedgerError> {
        self.ensure_allowed(owner, spender, amount)?;
        let remaining = self.allowance(owner, spender) - amount;
        self.set(owner, spender, remaining);
        Ok(remaining)
    }

    /// Iterates over `(owner, spender, allowance)` in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Address, u128)> {
        self.allowances.iter().flat_map(|(owner, spenders)| {
            spenders
                .iter()
                .map(move |(spender, amount)| (owner, spender, *amount))
        })
    }

    /// Number of owners with at least one live allowance.
    pub fn owner_count(&self) -> usize {
        self.allowances.len()
    }
}

impl FromIterator<(Address, Address, u128)> for AllowanceTable {
    fn from_iter<I: IntoIterator<Item = (Address, Address, u128)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (owner, spender, amount) in iter {
            table.set(&owner, &spender, amount);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn set_and_spend() {
        let mut table = AllowanceTable::new();
        let (alice, vault) = (addr("alice"), addr("vault"));
        table.set(&alice, &vault, 500);
        assert_eq!(table.spend(&alice, &vault, 200).unwrap(), 300);
        assert_eq!(table.allowance(&alice, &vault), 300);
    }

    #[test]
    fn overspend_is_rejected() {
        let mut table = AllowanceTable::new();
        let (alice, vault) = (addr("alice"), addr("vault"));
        table.set(&alice, &vault, 10);
        assert!(matches!(
            table.spend(&alice, &vault, 11),
            Err(LedgerError::InsufficientAllowance { allowance: 10, .. })
        ));
        assert_eq!(table.allowance(&alice, &vault), 10);
    }

    #[test]
    fn allowances_are_per_spender() {
        let mut table = AllowanceTable::new();
        let (alice, vault, bob) = (addr("alice"), addr("vault"), addr("bob"));
        table.set(&alice, &vault, 10);
        assert_eq!(table.allowance(&alice, &bob), 0);
        assert_eq!(table.allowance(&bob, &vault), 0);
    }

    #[test]
    fn zero_revokes_and_prunes() {
        let mut table = AllowanceTable::new();
        let (alice, vault) = (addr("alice"), addr("vault"));
        table.set(&alice, &vault, 10);
        table.set(&alice, &vault, 0);
        assert_eq!(table.owner_count(), 0);
    }

    #[test]
    fn json_round_trip_keeps_nested_shape() {
        let mut table = AllowanceTable::new();
        table.set(&addr("alice"), &addr("vault"), 7);
        let json = serde_json::to_string(&table).unwrap();
        let restored: AllowanceTable = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn iterates_and_rebuilds() {
        let mut table = AllowanceTable::new();
        let (alice, bob, vault) = (addr("alice"), addr("bob"), addr("vault"));
        table.set(&alice, &vault, 7);
        table.set(&bob, &vault, 3);

        let entries: Vec<_> = table.iter().map(|(o, s, a)| (o.clone(), s.clone(), a)).collect();
        assert_eq!(entries.len(), 2);
        let rebuilt: AllowanceTable = entries.into_iter().collect();
        assert_eq!(rebuilt, table);
    }
}
