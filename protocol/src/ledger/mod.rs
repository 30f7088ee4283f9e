//! # Ledger Tables
//!
//! The building blocks every fungible ledger in offtake is made of:
//!
//! - [`balance`]: per-holder balances that never go negative or wrap.
//! - [`allowance`]: delegated spend/burn limits.
//! - [`settlement`]: the settlement-asset interface redemption vaults pay
//!   out through, and an in-memory implementation.

pub mod allowance;
pub mod balance;
pub mod settlement;

pub use allowance::AllowanceTable;
pub use balance::{BalanceSheet, LedgerError};
pub use settlement::{SettlementAsset, SettlementError, SettlementLedger};
