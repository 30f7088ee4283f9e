//! # Identity Module
//!
//! Every participant and every ledger in offtake is named by an
//! [`Address`]. Authorization is identity comparison: each mutating
//! operation takes the caller's address explicitly and checks it against the
//! identity stored on the ledger (administrator, holder, delegate). How the
//! caller proved that identity is a transport concern and is not modelled
//! here.

pub mod address;

pub use address::{Address, AddressError, AddressKind};
