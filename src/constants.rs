//! Consensus constants that do not vary between networks
//!
//! Anything a network may tune (genesis, retarget schedule, maturity, subsidy
//! interval, checkpoints) lives in [`crate::chain_params::ChainParams`] instead.

/// Satoshis per coin
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Maximum money supply: 21,000,000 coins in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * SATOSHIS_PER_BTC;

/// Initial block subsidy: 50 coins
pub const INITIAL_SUBSIDY: i64 = 50 * SATOSHIS_PER_BTC;

/// Maximum serialized block size in bytes
pub const MAX_BLOCK_SERIALIZED_SIZE: usize = 1_000_000;

/// Number of ancestors whose timestamps form the median-time-past window
pub const MEDIAN_TIME_BLOCKS: usize = 11;

/// Default allowed drift of a block timestamp ahead of the validation clock (2 hours)
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Coinbase unlocking script length bounds (inclusive)
pub const MIN_COINBASE_SCRIPT_LEN: usize = 2;
pub const MAX_COINBASE_SCRIPT_LEN: usize = 100;

/// Lock times below this value are block heights, at or above it unix timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number that opts an input out of lock-time enforcement
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Header wire size
pub const BLOCK_HEADER_SIZE: usize = 80;
