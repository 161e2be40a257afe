use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use crate::domain::{
    Commission, CommissionInput, Error, Escrow, EscrowStatus, EscrowStore, JobId, Money,
    SettlementFacts, UserId, calculate_commissions,
};
use crate::retry;

/// Outcome of a release call. `repeated` marks an idempotent replay that
/// returned the previously recorded settlement without charging again.
#[derive(Debug, Clone, Copy)]
pub struct Settlement {
    pub commission: Commission,
    pub repeated: bool,
}

/// Drives the per-job escrow state machine and charges commission exactly
/// once at release.
pub struct EscrowService<S> {
    store: Arc<S>,
}

impl<S> Clone for EscrowService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EscrowStore> EscrowService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        job_id: JobId,
        client_id: UserId,
        amount: Money,
        currency: &str,
    ) -> Result<Escrow, Error> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(format!(
                "escrow amount must be positive, got {amount}"
            )));
        }
        let escrow = Escrow::new(job_id, client_id, amount, currency);
        retry::run("escrow.create", || self.store.insert_escrow(escrow.clone()))?;
        info!(job_id, client_id, %amount, currency, "escrow created");
        Ok(escrow)
    }

    /// Marks the escrow funded once the payment collaborator reported
    /// success. Only valid from `created`; the transition is recorded even
    /// though funding itself is simulated without a gateway.
    pub fn fund(&self, job_id: JobId) -> Result<Escrow, Error> {
        let escrow = retry::run("escrow.fund", || {
            self.store.with_escrow(job_id, |txn| match txn.escrow.status {
                EscrowStatus::Created => {
                    txn.escrow.status = EscrowStatus::Funded;
                    Ok(txn.escrow.clone())
                }
                EscrowStatus::Released => Err(Error::AlreadyReleased(job_id)),
                status => Err(Error::InvalidTransition {
                    entity: "escrow",
                    from: status.as_str(),
                    attempted: EscrowStatus::Funded.as_str(),
                }),
            })
        })?;
        info!(job_id, "escrow funded");
        Ok(escrow)
    }

    /// Settles a funded escrow: computes the fee breakdown, records the
    /// commission, and flips the status to released, all in one atomic
    /// update. Releasing an already-released escrow is a no-op that returns
    /// the recorded settlement; it never charges a second time.
    pub fn release(&self, job_id: JobId, facts: SettlementFacts) -> Result<Settlement, Error> {
        let settlement = retry::run("escrow.release", || {
            self.store.with_escrow(job_id, |txn| match txn.escrow.status {
                EscrowStatus::Funded => {
                    let input = CommissionInput::from_facts(txn.escrow.amount, &facts);
                    let breakdown = calculate_commissions(&input)?;
                    let commission = Commission {
                        job_id,
                        breakdown,
                        charged_at: SystemTime::now(),
                    };
                    *txn.commission = Some(commission);
                    txn.escrow.status = EscrowStatus::Released;
                    txn.escrow.released_at = Some(commission.charged_at);
                    Ok(Settlement {
                        commission,
                        repeated: false,
                    })
                }
                EscrowStatus::Released => {
                    let prior = txn.commission.ok_or(Error::NotFound {
                        kind: "commission",
                        id: job_id,
                    })?;
                    Ok(Settlement {
                        commission: prior,
                        repeated: true,
                    })
                }
                status => Err(Error::InvalidTransition {
                    entity: "escrow",
                    from: status.as_str(),
                    attempted: EscrowStatus::Released.as_str(),
                }),
            })
        })?;
        if settlement.repeated {
            info!(job_id, "escrow release replayed, returning prior settlement");
        } else {
            info!(
                job_id,
                revenue = %settlement.commission.breakdown.total_platform_revenue,
                "escrow released"
            );
        }
        Ok(settlement)
    }

    /// Cancels an escrow that has not settled yet. Reserved worker credits
    /// tied to the job are released by the orchestration layer.
    pub fn cancel(&self, job_id: JobId) -> Result<Escrow, Error> {
        let escrow = retry::run("escrow.cancel", || {
            self.store.with_escrow(job_id, |txn| match txn.escrow.status {
                EscrowStatus::Created | EscrowStatus::Funded => {
                    txn.escrow.status = EscrowStatus::Cancelled;
                    Ok(txn.escrow.clone())
                }
                EscrowStatus::Released => Err(Error::AlreadyReleased(job_id)),
                status => Err(Error::InvalidTransition {
                    entity: "escrow",
                    from: status.as_str(),
                    attempted: EscrowStatus::Cancelled.as_str(),
                }),
            })
        })?;
        info!(job_id, "escrow cancelled");
        Ok(escrow)
    }

    pub fn get(&self, job_id: JobId) -> Option<Escrow> {
        self.store.escrow(job_id)
    }

    pub fn commission(&self, job_id: JobId) -> Option<Commission> {
        self.store.commission(job_id)
    }
}
