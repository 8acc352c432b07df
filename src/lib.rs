//! # blvm-chainstate
//!
//! Consensus validation and chain selection for a Bitcoin-style full node.
//!
//! The crate decides which blocks and transactions are valid, which chain of
//! blocks is best, and what the set of spendable outputs is at the tip of that
//! chain.
//!
//! ## Architecture
//!
//! - [`chain_params`]: per-network constants, selected once at startup
//! - [`block_index`]: tree of every accepted header with cumulative work
//! - [`utxo`]: the authoritative UTXO set and copy-on-write viewpoints
//! - [`block`] and [`transaction`]: structural and contextual rule checks
//! - [`chain`]: fork choice, reorganization, orphan handling, queries
//! - [`storage`]: the key/value contract the engine persists through
//!
//! Script evaluation is not part of the crate; callers supply a
//! [`script::ScriptVerifier`].
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use blvm_chainstate::chain::ChainSelector;
//! use blvm_chainstate::chain_params::ChainParams;
//! use blvm_chainstate::config::ChainConfig;
//! use blvm_chainstate::script::AcceptAllScripts;
//! use blvm_chainstate::storage::MemoryStore;
//! use blvm_chainstate::time::SystemClock;
//!
//! let chain = ChainSelector::open(
//!     Arc::new(ChainParams::regtest()),
//!     ChainConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(AcceptAllScripts),
//!     Arc::new(SystemClock),
//! )
//! .unwrap();
//! assert_eq!(chain.snapshot().height, 0);
//! ```

pub mod block;
pub mod block_index;
pub mod chain;
pub mod chain_params;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod economic;
pub mod error;
pub mod merkle;
pub mod notify;
pub mod orphan;
pub mod pow;
pub mod script;
pub mod serialization;
pub mod storage;
pub mod time;
pub mod transaction;
pub mod types;
pub mod utxo;

pub use block_index::{BlockIndex, BlockNode, BlockStatus};
pub use chain::{ChainSelector, ChainSnapshot, SubmitOutcome, TxAcceptance};
pub use chain_params::{ChainParams, Network};
pub use config::ChainConfig;
pub use error::{ChainError, Result, RuleKind, RuleViolation};
pub use notify::ChainEvent;
pub use types::*;
pub use utxo::{UtxoEntry, UtxoSet, UtxoViewpoint};
