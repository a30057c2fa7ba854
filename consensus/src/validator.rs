//! Ancestor validation.
//!
//! A transaction is valid when every transaction it spends from, back to
//! stable ground, is valid: outputs exist, are owned by the claimed address,
//! are not spent twice inside one transaction, amounts are conserved, and
//! every double-spend conflict is won. The graph is walked with an explicit
//! worklist so depth is bounded by [`ConsensusParams::max_validation_depth`]
//! and never by the call stack.

use crate::error::{ConsensusError, FailureCause};
use crate::lease::LeaseTicket;
use crate::wallet::WalletHooks;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tangle_store::TransactionRepository;
use tangle_transactions::{find_reused_output, verify_integrity, Transaction, TransactionStatus};
use tangle_types::{Amount, ConsensusParams, NodeId, TransactionId};
use tokio::time::Instant;

/// Transactions kept per traversal so diamonds in the graph are fetched once.
const TRAVERSAL_CACHE_MAX: usize = 1024;

/// Per-traversal state.
#[derive(Clone, Debug, Default)]
pub struct ValidationContext {
    /// Peer we validate for, if any; missing data is requested from it first.
    pub requesting_peer: Option<NodeId>,
    /// Wall-clock budget when validating for a peer.
    pub deadline: Option<Instant>,
    /// The requesting peer's lease; validation stops once it lapses.
    pub lease: Option<LeaseTicket>,
    pub visited: HashSet<TransactionId>,
    /// Transactions known to have lost a double-spend conflict.
    pub double_spend_set: HashSet<TransactionId>,
    cache: HashMap<TransactionId, Transaction>,
}

impl ValidationContext {
    /// Validation of our own pending transaction: no budget, no lease.
    pub fn local() -> Self {
        Self::default()
    }

    /// Validation on behalf of `peer`, bounded by `time_limit` and `lease`.
    pub fn for_peer(peer: NodeId, time_limit: Duration, lease: LeaseTicket) -> Self {
        Self {
            requesting_peer: Some(peer),
            deadline: Some(Instant::now() + time_limit),
            lease: Some(lease),
            ..Self::default()
        }
    }

    /// Context for validating a double-spend candidate: same budget, a copy
    /// of the visited set including `current`, and a fresh cache.
    pub(crate) fn branch(&self, current: TransactionId) -> Self {
        let mut visited = self.visited.clone();
        visited.insert(current);
        Self {
            requesting_peer: self.requesting_peer.clone(),
            deadline: self.deadline,
            lease: self.lease.clone(),
            visited,
            double_spend_set: self.double_spend_set.clone(),
            cache: HashMap::new(),
        }
    }

    fn check_budget(&self, at: TransactionId) -> Result<(), ConsensusError> {
        let now = Instant::now();
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            return Err(ConsensusError::rejected(FailureCause::ProxyTimeLimitExceed, at));
        }
        if self.lease.as_ref().is_some_and(|lease| !lease.is_live(now)) {
            return Err(ConsensusError::rejected(FailureCause::ConsensusTimeout, at));
        }
        Ok(())
    }
}

pub struct AncestorValidator {
    pub(crate) repository: Arc<dyn TransactionRepository>,
    wallet: Arc<dyn WalletHooks>,
    genesis: TransactionId,
    max_depth: u32,
}

impl AncestorValidator {
    pub fn new(
        params: &ConsensusParams,
        repository: Arc<dyn TransactionRepository>,
        wallet: Arc<dyn WalletHooks>,
    ) -> Self {
        Self {
            repository,
            wallet,
            genesis: params.genesis_transaction_id,
            max_depth: params.max_validation_depth,
        }
    }

    /// Validate `id` and all of its unsettled ancestors.
    pub fn validate<'a>(
        &'a self,
        id: TransactionId,
        ctx: &'a mut ValidationContext,
    ) -> BoxFuture<'a, Result<(), ConsensusError>> {
        Box::pin(async move {
            let mut worklist = vec![(id, 0u32)];
            while let Some((current, depth)) = worklist.pop() {
                ctx.check_budget(current)?;
                if let Some(sources) = self.validate_one(current, depth, ctx).await? {
                    worklist.extend(sources.into_iter().rev().map(|s| (s, depth + 1)));
                }
            }
            Ok(())
        })
    }

    /// Check a single transaction. Returns the source transactions still to
    /// visit, or `None` when this branch needs no further work.
    async fn validate_one(
        &self,
        id: TransactionId,
        depth: u32,
        ctx: &mut ValidationContext,
    ) -> Result<Option<Vec<TransactionId>>, ConsensusError> {
        if id == self.genesis {
            return Ok(None);
        }
        let Some(tx) = self.fetch(id, ctx).await? else {
            self.request_missing(id, ctx).await;
            return Err(ConsensusError::rejected(FailureCause::NotFound, id));
        };

        if tx.is_settled() {
            return Ok(None);
        }
        if tx.is_double_spend || tx.has_double_spent_output() || ctx.double_spend_set.contains(&id) {
            return Err(ConsensusError::rejected(FailureCause::DoubleSpend, id));
        }
        if tx.status == TransactionStatus::Invalid {
            return Err(ConsensusError::rejected(FailureCause::Invalid, id));
        }
        if !ctx.visited.insert(id) {
            return Ok(None);
        }
        if depth >= self.max_depth {
            return Err(ConsensusError::rejected(FailureCause::MaxDepth, id));
        }

        if let Err(e) = verify_integrity(&tx) {
            tracing::warn!(tx = %id, error = %e, "stored transaction failed integrity check, deleting");
            self.repository.delete_transaction(&id).await?;
            self.request_missing(id, ctx).await;
            return Err(ConsensusError::rejected(FailureCause::NotFound, id));
        }
        if let Some(output) = find_reused_output(&tx) {
            tracing::debug!(tx = %id, output = %output, "output spent twice in one transaction");
            return Err(ConsensusError::rejected(FailureCause::Invalid, id));
        }

        let mut input_total = Amount::ZERO;
        for input in &tx.inputs {
            let competitors = self.repository.get_input_double_spend(input, &id).await?;
            if !competitors.is_empty() {
                self.resolve_double_spend(&tx, competitors, ctx).await?;
            }

            let Some(record) = self.repository.get_output(&input.output).await? else {
                let source = input.output.transaction_id;
                self.request_missing(source, ctx).await;
                return Err(ConsensusError::rejected(FailureCause::NotFound, source));
            };
            if record.address != input.address {
                tracing::debug!(tx = %id, output = %input.output, "input address does not own output");
                return Err(ConsensusError::rejected(FailureCause::Invalid, id));
            }
            input_total = input_total
                .checked_add(record.amount)
                .ok_or_else(|| ConsensusError::rejected(FailureCause::InvalidAmount, id))?;
        }

        if tx.output_total() > input_total {
            tracing::debug!(
                tx = %id,
                inputs = %input_total,
                outputs = %tx.output_total(),
                "outputs exceed inputs"
            );
            return Err(ConsensusError::rejected(FailureCause::InvalidAmount, id));
        }

        let sources = tx
            .source_transactions()
            .into_iter()
            .filter(|s| !ctx.visited.contains(s))
            .collect();
        Ok(Some(sources))
    }

    async fn fetch(
        &self,
        id: TransactionId,
        ctx: &mut ValidationContext,
    ) -> Result<Option<Transaction>, ConsensusError> {
        if let Some(tx) = ctx.cache.get(&id) {
            return Ok(Some(tx.clone()));
        }
        let found = self.repository.get_transaction_object(&id).await?;
        if let Some(tx) = &found {
            if ctx.cache.len() < TRAVERSAL_CACHE_MAX {
                ctx.cache.insert(id, tx.clone());
            }
        }
        Ok(found)
    }

    async fn request_missing(&self, id: TransactionId, ctx: &ValidationContext) {
        tracing::debug!(tx = %id, "transaction missing locally, requesting from network");
        self.wallet
            .request_transaction_from_network(&id, ctx.requesting_peer.as_ref())
            .await;
    }
}
