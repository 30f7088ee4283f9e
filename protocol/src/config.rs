//! # Protocol Configuration & Constants
//!
//! Every fixed parameter of the offtake ledgers lives here. The redemption
//! math, the proposal validation limits, the persisted schema versions and
//! the node defaults all read from this one place.
//!
//! Changing [`RATE_SCALE`] or the schema versions after records have been
//! persisted is a migration, not a tweak. Treat them accordingly.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Fixed-Point Arithmetic
// ---------------------------------------------------------------------------

/// Decimal places of every project token. Matches the granularity of the
/// forward-claim units so a redemption rate expressed in [`RATE_SCALE`]
/// converts one whole token into settlement units without extra rescaling.
pub const PROJECT_TOKEN_DECIMALS: u8 = 18;

/// Fixed-point scale of the redemption rate: `10^PROJECT_TOKEN_DECIMALS`.
///
/// `rate = deposited * RATE_SCALE / total_supply` and
/// `payout = token_amount * rate / RATE_SCALE`.
pub const RATE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Decimal places assumed for a settlement asset when none is specified
/// (USD-pegged stablecoins use 6).
pub const DEFAULT_SETTLEMENT_DECIMALS: u8 = 6;

/// Largest decimal precision accepted for a settlement asset. `10^38` is the
/// largest power of ten representable in a `u128`.
pub const MAX_SETTLEMENT_DECIMALS: u8 = 38;

// ---------------------------------------------------------------------------
// Proposal Limits
// ---------------------------------------------------------------------------

/// Maximum project name length in bytes.
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum ticker symbol length in bytes.
pub const MAX_SYMBOL_LENGTH: usize = 12;

/// Maximum metadata payload length in bytes (typically a content URI or a
/// short JSON document describing the underlying delivery).
pub const MAX_METADATA_LENGTH: usize = 2048;

/// Maximum length of an [`Address`](crate::identity::Address) string.
pub const MAX_ADDRESS_LENGTH: usize = 128;

// ---------------------------------------------------------------------------
// Persisted Schema Versions
// ---------------------------------------------------------------------------

/// Current version of the persisted project record envelope.
pub const PROJECT_SCHEMA_VERSION: u16 = 1;

/// Current version of the persisted token ledger envelope.
pub const TOKEN_SCHEMA_VERSION: u16 = 1;

/// Current version of the persisted vault envelope.
pub const VAULT_SCHEMA_VERSION: u16 = 1;

/// Current version of the persisted registry header.
pub const REGISTRY_SCHEMA_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API (REST + JSON-RPC) port.
pub const DEFAULT_API_PORT: u16 = 9851;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9852;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".offtake";

/// Returns `10^decimals`, or `None` when it does not fit in a `u128`.
pub fn unit_scale(decimals: u8) -> Option<u128> {
    10u128.checked_pow(u32::from(decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_scale_matches_token_decimals() {
        assert_eq!(unit_scale(PROJECT_TOKEN_DECIMALS), Some(RATE_SCALE));
    }

    #[test]
    fn unit_scale_rejects_oversized_precision() {
        assert!(unit_scale(MAX_SETTLEMENT_DECIMALS).is_some());
        assert!(unit_scale(MAX_SETTLEMENT_DECIMALS + 1).is_none());
    }

    #[test]
    fn proposal_limits_sanity() {
        assert!(MAX_SYMBOL_LENGTH < MAX_NAME_LENGTH);
        assert!(MAX_NAME_LENGTH < MAX_METADATA_LENGTH);
        assert!(DEFAULT_API_PORT != DEFAULT_METRICS_PORT);
    }
}
