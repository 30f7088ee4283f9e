// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Offtake Protocol: Shared Primitives
//!
//! Offtake tokenizes forward claims on a future delivery (a carbon credit
//! vintage, a harvest, a batch of energy certificates) and later redeems
//! those claims pro-rata against deposited settlement value. This crate
//! holds what every other offtake crate builds on. The registry, token and
//! vault that make up the ledger core live in `offtake-contracts`.
//!
//! ## Modules
//!
//! - **config**: Protocol constants: fixed-point scale, proposal limits,
//!   schema versions, node defaults.
//! - **error**: The [`ErrorKind`](error::ErrorKind) taxonomy every
//!   component error maps onto.
//! - **identity**: The validated [`Address`](identity::Address) newtype.
//! - **math**: Checked fixed-point helpers for rates and payouts.
//! - **ledger**: Balance and allowance tables, and the settlement-asset
//!   interface vaults pay out through.
//! - **storage**: The sled-backed record store.
//!
//! ## Ground Rules
//!
//! 1. Amounts are `u128` in the smallest unit. No floats, anywhere.
//! 2. Arithmetic is checked. Overflow is an error, not a wrap.
//! 3. Every failure is a typed `Err`, and it leaves state untouched.

pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod math;
pub mod storage;
