use crate::crypto::{PublicKeyHash, PUBLIC_KEY_HASH_SIZE};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Smallest unit scaling, 8 decimal places
pub const COIN_VALUE: u64 = 100_000_000;

// Decimal places of the native token
pub const COIN_DECIMAL_SEPARATOR: u8 = 8;

/// Well known key of the native token. The empty key aliases it
/// throughout the token API.
pub const NATIVE_TOKEN: PublicKeyHash = PublicKeyHash::new([0u8; PUBLIC_KEY_HASH_SIZE]);

pub const NATIVE_TOKEN_NAME: &str = "VEIL";
pub const NATIVE_TOKEN_TICKER: &str = "VEIL";

// Hard cap of the native supply
pub const MAX_SUPPLY: u64 = 42_000_000 * COIN_VALUE;

/// A complete block must deserialize from a buffer of at most this
/// many bytes. Checked before any parsing cost is spent.
pub const BLOCK_MAX_SIZE: usize = 1024 * 1024;

/// Blocks an unstake stays pending before it can be withdrawn
pub const UNSTAKE_DELAY: u64 = 128;

// Upper bound of vin/vout entries per simple transaction
pub const MAX_VIN_COUNT: usize = 255;
pub const MAX_VOUT_COUNT: usize = 255;

// Upper bound of zether payloads per transaction
pub const MAX_PAYLOAD_COUNT: usize = 16;

// Upper bound of the optional data payload of a transaction
pub const MAX_DATA_SIZE: usize = 512;

/// A zether transaction binds to a recent tip; it stops applying once
/// the chain moves this many blocks past its bound height.
pub const TX_HEIGHT_VALIDITY: u64 = 64;

// Upper bound of the per-payload extra data
pub const PAYLOAD_EXTRA_DATA_LIMIT: usize = 144;

// Token metadata bounds
pub const MAX_TOKEN_NAME_LENGTH: usize = 64;
pub const MAX_TOKEN_TICKER_LENGTH: usize = 8;
pub const MAX_TOKEN_DESCRIPTION_LENGTH: usize = 512;
pub const MAX_TOKEN_DECIMAL_SEPARATOR: u8 = 10;
