//! Script verification collaborator
//!
//! The engine never interprets scripts. It hands each (unlocking, locking)
//! pair to a [`ScriptVerifier`] and treats the answer as a pure function of
//! its inputs, which is what makes the per-input checks safe to run in
//! parallel.

use crate::error::{reject, Result, RuleKind};
use crate::types::{Natural, Transaction};

/// Context for one input's verification
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    /// Amount of the output being spent
    pub amount: i64,
    /// Height of the block (or prospective block) the spend is validated for
    pub height: Natural,
}

pub trait ScriptVerifier: Send + Sync {
    /// Whether `unlocking` authorizes spending an output locked by `locking`
    fn verify(&self, unlocking: &[u8], locking: &[u8], ctx: &ScriptContext<'_>) -> bool;
}

impl<F> ScriptVerifier for F
where
    F: Fn(&[u8], &[u8], &ScriptContext<'_>) -> bool + Send + Sync,
{
    fn verify(&self, unlocking: &[u8], locking: &[u8], ctx: &ScriptContext<'_>) -> bool {
        self(unlocking, locking, ctx)
    }
}

/// Verifier that authorizes every spend
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify(&self, _: &[u8], _: &[u8], _: &ScriptContext<'_>) -> bool {
        true
    }
}

/// One deferred input check. The locking script is captured when the input
/// is resolved, so same-block chained spends see the output they reference.
#[derive(Debug, Clone)]
pub struct ScriptCheck<'a> {
    pub tx_index: usize,
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub locking_script: Vec<u8>,
    pub amount: i64,
}

impl ScriptCheck<'_> {
    fn run(&self, verifier: &dyn ScriptVerifier, height: Natural) -> bool {
        let ctx = ScriptContext {
            tx: self.tx,
            input_index: self.input_index,
            amount: self.amount,
            height,
        };
        verifier.verify(
            &self.tx.inputs[self.input_index].script_sig,
            &self.locking_script,
            &ctx,
        )
    }
}

/// Run every check, stopping at the first failure in list order
///
/// With `parallel` the checks are spread over the rayon pool; the reported
/// failure is still the earliest one, and remaining work is abandoned once
/// one is found.
pub fn verify_scripts(
    checks: &[ScriptCheck<'_>],
    verifier: &dyn ScriptVerifier,
    height: Natural,
    parallel: bool,
) -> Result<()> {
    let failed = if parallel {
        first_failure_parallel(checks, verifier, height)
    } else {
        checks.iter().find(|c| !c.run(verifier, height))
    };
    match failed {
        Some(check) => reject(
            RuleKind::ScriptFailure,
            format!(
                "transaction {} input {} failed script verification",
                check.tx_index, check.input_index
            ),
        ),
        None => Ok(()),
    }
}

#[cfg(feature = "rayon")]
fn first_failure_parallel<'c, 'a>(
    checks: &'c [ScriptCheck<'a>],
    verifier: &dyn ScriptVerifier,
    height: Natural,
) -> Option<&'c ScriptCheck<'a>> {
    use rayon::prelude::*;
    checks.par_iter().find_first(|c| !c.run(verifier, height))
}

#[cfg(not(feature = "rayon"))]
fn first_failure_parallel<'c, 'a>(
    checks: &'c [ScriptCheck<'a>],
    verifier: &dyn ScriptVerifier,
    height: Natural,
) -> Option<&'c ScriptCheck<'a>> {
    checks.iter().find(|c| !c.run(verifier, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutPoint, TransactionInput, TransactionOutput};

    fn tx_with_sigs(sigs: &[&[u8]]) -> Transaction {
        Transaction {
            version: 1,
            inputs: sigs
                .iter()
                .enumerate()
                .map(|(i, s)| TransactionInput {
                    prevout: OutPoint::new([1; 32], i as u32),
                    script_sig: s.to_vec(),
                    sequence: u32::MAX,
                })
                .collect(),
            outputs: vec![TransactionOutput {
                value: 1,
                script_pubkey: vec![],
            }],
            lock_time: 0,
        }
    }

    fn checks(tx: &Transaction) -> Vec<ScriptCheck<'_>> {
        (0..tx.inputs.len())
            .map(|i| ScriptCheck {
                tx_index: 1,
                tx,
                input_index: i,
                locking_script: vec![0xaa],
                amount: 5,
            })
            .collect()
    }

    // Unlocks iff the unlocking script equals the locking script
    fn equality(unlocking: &[u8], locking: &[u8], _: &ScriptContext<'_>) -> bool {
        unlocking == locking
    }

    #[test]
    fn test_all_pass() {
        let tx = tx_with_sigs(&[&[0xaa], &[0xaa]]);
        for parallel in [false, true] {
            assert!(verify_scripts(&checks(&tx), &equality, 1, parallel).is_ok());
        }
    }

    #[test]
    fn test_reports_first_failure() {
        let tx = tx_with_sigs(&[&[0xaa], &[0xbb], &[0xcc]]);
        for parallel in [false, true] {
            let err = verify_scripts(&checks(&tx), &equality, 1, parallel).unwrap_err();
            assert_eq!(err.rule_kind(), Some(RuleKind::ScriptFailure));
            assert!(err.to_string().contains("input 1"));
        }
    }

    #[test]
    fn test_context_is_passed_through() {
        fn at_height_nine(_: &[u8], _: &[u8], ctx: &ScriptContext<'_>) -> bool {
            ctx.amount == 5 && ctx.height == 9
        }
        let tx = tx_with_sigs(&[&[0xaa]]);
        assert!(verify_scripts(&checks(&tx), &at_height_nine, 9, false).is_ok());
        assert!(verify_scripts(&checks(&tx), &at_height_nine, 8, false).is_err());
        assert!(verify_scripts(&checks(&tx), &AcceptAllScripts, 8, true).is_ok());
    }
}
