//! Error types for block and transaction validation and chain management

use crate::storage::StorageError;
use crate::types::BlockHash;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Which consensus rule a rejected block or transaction broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    // Structural
    NoTransactions,
    BlockTooLarge,
    BadMerkleRoot,
    MutatedMerkleTree,
    DuplicateTransaction,
    FirstTxNotCoinbase,
    MultipleCoinbases,
    NoInputs,
    NoOutputs,
    DuplicateInput,
    BadOutputValue,
    OutputSumTooLarge,
    BadCoinbaseScriptLength,
    NullPrevout,
    HighHash,
    BadTargetRange,

    // Contextual (header)
    UnexpectedDifficulty,
    TimeTooOld,
    TimeTooNew,
    CheckpointMismatch,
    ForkTooOld,
    InvalidAncestor,
    PreviouslyRejected,

    // Contextual (inputs)
    InputNotFound,
    PrematureSpend,
    InsufficientInputValue,
    InputValueOutOfRange,
    ScriptFailure,
    BadCoinbaseValue,
    NonFinalTransaction,
    OverwriteUnspent,
    CoinbaseNotAllowed,
}

impl RuleKind {
    /// Whether a block failing this rule fails it forever
    ///
    /// `TimeTooNew` is judged against the local clock and may pass once the
    /// clock catches up, so it is not remembered as a rejection.
    pub fn is_permanent(self) -> bool {
        !matches!(self, RuleKind::TimeTooNew)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Permanent rejection: the same bytes must never be accepted later
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct RuleViolation {
    pub kind: RuleKind,
    pub detail: Cow<'static, str>,
}

impl RuleViolation {
    pub fn new(kind: RuleKind, detail: impl Into<Cow<'static, str>>) -> Self {
        RuleViolation {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Rule violation: {0}")]
    Rule(#[from] RuleViolation),

    #[error("Block already known: {0}")]
    AlreadyKnown(BlockHash),

    #[error("Header already in block index: {0}")]
    DuplicateHeader(BlockHash),

    #[error("Parent not in block index: {0}")]
    UnknownParent(BlockHash),

    #[error("Block not found: {0}")]
    UnknownBlock(BlockHash),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Block {hash} failed validation during reorganization after being accepted once: {violation}")]
    ReorgInvariantBroken {
        hash: BlockHash,
        violation: RuleViolation,
    },

    #[error("Persisted chain state is corrupt: {0}")]
    Corrupt(Cow<'static, str>),

    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),
}

impl ChainError {
    /// The rule kind behind a rejection, if this is one
    pub fn rule_kind(&self) -> Option<RuleKind> {
        match self {
            ChainError::Rule(v) => Some(v.kind),
            ChainError::ReorgInvariantBroken { violation, .. } => Some(violation.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Shorthand for returning a rule violation
#[inline]
pub fn reject<T>(kind: RuleKind, detail: impl Into<Cow<'static, str>>) -> Result<T> {
    Err(ChainError::Rule(RuleViolation::new(kind, detail)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_relative_rules_are_not_permanent() {
        assert!(!RuleKind::TimeTooNew.is_permanent());
        assert!(RuleKind::TimeTooOld.is_permanent());
        assert!(RuleKind::BadCoinbaseValue.is_permanent());
    }

    #[test]
    fn test_rule_kind_extraction() {
        let err: Result<()> = reject(RuleKind::BadMerkleRoot, "root mismatch");
        let err = err.unwrap_err();
        assert_eq!(err.rule_kind(), Some(RuleKind::BadMerkleRoot));
        assert_eq!(err.to_string(), "Rule violation: BadMerkleRoot: root mismatch");
        assert_eq!(ChainError::AlreadyKnown(BlockHash::ZERO).rule_kind(), None);
    }
}
