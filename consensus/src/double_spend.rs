//! Double-spend resolution.
//!
//! When several transactions spend the same output, the oldest one that
//! validates wins, ties broken by transaction id. Transactions already known
//! to be invalid do not take part.

use crate::error::{ConsensusError, FailureCause};
use crate::validator::{AncestorValidator, ValidationContext};
use tangle_transactions::{Transaction, TransactionStatus};
use tangle_types::TransactionId;

impl AncestorValidator {
    /// Settle the conflict between `current` and `competitors` for the
    /// validation of `current`. `Ok` when `current` wins.
    pub(crate) async fn resolve_double_spend(
        &self,
        current: &Transaction,
        competitors: Vec<Transaction>,
        ctx: &mut ValidationContext,
    ) -> Result<(), ConsensusError> {
        let winner = self.find_double_spend_winner(current, competitors, ctx).await?;
        if winner == current.id {
            return Ok(());
        }
        tracing::debug!(tx = %current.id, winner = %winner, "lost double spend");
        ctx.double_spend_set.insert(current.id);
        Err(ConsensusError::rejected(FailureCause::DoubleSpend, current.id))
    }

    /// Validate candidates oldest first and return the first that passes.
    pub async fn find_double_spend_winner(
        &self,
        current: &Transaction,
        competitors: Vec<Transaction>,
        ctx: &mut ValidationContext,
    ) -> Result<TransactionId, ConsensusError> {
        let mut candidates: Vec<Transaction> = competitors
            .into_iter()
            .filter(|t| t.id != current.id && t.status != TransactionStatus::Invalid)
            .collect();
        candidates.push(current.clone());
        candidates.sort_by_key(|t| (t.normalized_date(), t.id));

        for candidate in candidates {
            if ctx.double_spend_set.contains(&candidate.id) {
                continue;
            }

            let mut branch = ctx.branch(current.id);
            let result = self.validate(candidate.id, &mut branch).await;
            ctx.double_spend_set.extend(branch.double_spend_set);

            let Err(err) = result else {
                return Ok(candidate.id);
            };
            match err.cause() {
                Some(FailureCause::DoubleSpend) => {
                    ctx.double_spend_set.insert(candidate.id);
                }
                Some(FailureCause::Invalid | FailureCause::InvalidAmount | FailureCause::MaxDepth) => {}
                Some(FailureCause::NotFound | FailureCause::DoubleSpendUnresolved) => {
                    return Err(ConsensusError::rejected(
                        FailureCause::DoubleSpendUnresolved,
                        current.id,
                    ));
                }
                _ => return Err(err),
            }
        }

        Err(ConsensusError::rejected(FailureCause::DoubleSpend, current.id))
    }
}
