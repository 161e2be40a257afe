use std::collections::HashSet;

use futures::Stream;

use crate::domain::{
    Application, Command, Commission, CreditAccount, CreditTransaction, Error, Escrow, JobId,
    TransactionReason, UserId,
};

/// Entry staged by a ledger operation; the store turns it into a
/// `CreditTransaction` when the update commits.
#[derive(Debug, Clone, Copy)]
pub struct StagedTransaction {
    pub reason: TransactionReason,
    pub change_amount: i64,
    pub reference_id: Option<JobId>,
}

/// Mutable view of one credit account inside an atomic store update.
///
/// Account mutations and the staged transaction commit together or not at
/// all: when the closure returns `Err`, the persisted account is untouched
/// and nothing is appended to the log.
pub struct AccountTxn<'a> {
    pub account: &'a mut CreditAccount,
    refunded: &'a mut HashSet<JobId>,
    staged: Vec<StagedTransaction>,
}

impl<'a> AccountTxn<'a> {
    pub fn new(account: &'a mut CreditAccount, refunded: &'a mut HashSet<JobId>) -> Self {
        Self {
            account,
            refunded,
            staged: Vec::new(),
        }
    }

    pub fn refund_applied(&self, reference: JobId) -> bool {
        self.refunded.contains(&reference)
    }

    pub fn mark_refund_applied(&mut self, reference: JobId) {
        self.refunded.insert(reference);
    }

    pub fn record(&mut self, reason: TransactionReason, change_amount: i64, reference_id: Option<JobId>) {
        self.staged.push(StagedTransaction {
            reason,
            change_amount,
            reference_id,
        });
    }

    pub fn into_staged(self) -> Vec<StagedTransaction> {
        self.staged
    }
}

/// Storage seam for the credit ledger.
///
/// Every mutation is a single atomic read-modify-write against one account;
/// the account row is the unit of mutual exclusion for a user. Two
/// concurrent reservations must never both observe stale `available`.
pub trait LedgerStore: Send + Sync {
    /// Runs `apply` under the account's lock, creating the account with a
    /// zero balance on first use. Staged transactions are appended to the
    /// log only when `apply` returns `Ok`.
    fn with_account<T>(
        &self,
        user_id: UserId,
        apply: impl FnOnce(&mut AccountTxn<'_>) -> Result<T, Error>,
    ) -> Result<T, Error>;

    fn account(&self, user_id: UserId) -> Option<CreditAccount>;

    fn transactions(&self, user_id: UserId) -> Vec<CreditTransaction>;
}

/// Mutable view of one escrow and its commission record inside an atomic
/// store update. The commission row is written in the same update that
/// flips the status to released.
pub struct EscrowTxn<'a> {
    pub escrow: &'a mut Escrow,
    pub commission: &'a mut Option<Commission>,
}

/// Storage seam for the escrow lifecycle. The escrow row is the unit of
/// mutual exclusion for a job's settlement.
pub trait EscrowStore: Send + Sync {
    /// Fails with `DuplicateEscrow` when an escrow already exists for the job.
    fn insert_escrow(&self, escrow: Escrow) -> Result<(), Error>;

    fn with_escrow<T>(
        &self,
        job_id: JobId,
        apply: impl FnOnce(&mut EscrowTxn<'_>) -> Result<T, Error>,
    ) -> Result<T, Error>;

    fn escrow(&self, job_id: JobId) -> Option<Escrow>;

    fn commission(&self, job_id: JobId) -> Option<Commission>;
}

/// Storage seam for application rows. Credit fields on the rows are only
/// ever changed through ledger calls made by the orchestration layer.
pub trait ApplicationStore: Send + Sync {
    /// Fails with `DuplicateApplication` for a repeated (job, worker) pair.
    fn insert_application(&self, application: Application) -> Result<(), Error>;

    fn with_application<T>(
        &self,
        job_id: JobId,
        worker_id: UserId,
        apply: impl FnOnce(&mut Application) -> Result<T, Error>,
    ) -> Result<T, Error>;

    fn application(&self, job_id: JobId, worker_id: UserId) -> Option<Application>;

    /// Workers with a pending application for the job, in a stable order.
    fn pending_workers(&self, job_id: JobId) -> Vec<UserId>;
}

pub trait SettlementStore: LedgerStore + EscrowStore + ApplicationStore {
    /// Writes the final account and escrow summaries to stdout.
    fn flush(&self);
}

pub trait DeadLetterQueue {
    fn report(&self, error: &Error);
}

/// Job/contract store collaborator; answers whether a job still accepts
/// applications.
pub trait JobGate {
    fn is_open(&self, job_id: JobId) -> Result<bool, Error>;
}

pub trait CommandStream {
    type Commands: Stream<Item = Result<Command, Error>> + Send + Unpin + 'static;
    fn stream(&mut self) -> Self::Commands;
}
