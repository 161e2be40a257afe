use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::{
    Application, ApplicationStatus, ApplicationStore, Error, JobGate, JobId, LedgerStore, UserId,
};
use crate::ledger::CreditLedger;
use crate::retry;

/// Stand-in for the external job store; treats every job as open.
pub struct AllJobsOpen;

impl JobGate for AllJobsOpen {
    fn is_open(&self, _job_id: JobId) -> Result<bool, Error> {
        Ok(true)
    }
}

/// Orchestrates credit reservations around job applications.
///
/// Application rows are owned here, but their credit fields only ever
/// change through ledger calls. Compensating actions run even while the
/// triggering error propagates; a failed compensation is logged as a
/// second-order alert, never swallowed.
pub struct ApplicationFlow<S, G> {
    store: Arc<S>,
    ledger: CreditLedger<S>,
    gate: G,
}

impl<S: LedgerStore + ApplicationStore, G: JobGate> ApplicationFlow<S, G> {
    pub fn new(store: Arc<S>, ledger: CreditLedger<S>, gate: G) -> Self {
        Self {
            store,
            ledger,
            gate,
        }
    }

    /// Reserves the worker's credits, then creates the application row.
    /// When the row cannot be created the reservation is handed back before
    /// the error surfaces.
    pub fn apply(
        &self,
        job_id: JobId,
        worker_id: UserId,
        credits_required: u64,
    ) -> Result<Application, Error> {
        if !self.gate.is_open(job_id)? {
            return Err(Error::JobNotOpen(job_id));
        }
        if self.store.application(job_id, worker_id).is_some() {
            return Err(Error::DuplicateApplication { job_id, worker_id });
        }
        self.ledger.reserve(worker_id, credits_required, job_id)?;
        let application = Application::new(job_id, worker_id, credits_required);
        if let Err(err) = retry::run("application.insert", || {
            self.store.insert_application(application.clone())
        }) {
            if let Err(comp) = self.ledger.release(worker_id, credits_required, job_id) {
                error!(
                    job_id,
                    worker_id,
                    %comp,
                    "compensating release failed after aborted application"
                );
            }
            return Err(err);
        }
        info!(job_id, worker_id, credits_required, "application created");
        Ok(application)
    }

    /// Accepts one pending application and rejects every competitor.
    ///
    /// The winner's reservation is consumed; losing applicants only get
    /// their reservations released, so their balances never move and no
    /// refund transaction is written for them.
    pub fn accept(&self, job_id: JobId, worker_id: UserId) -> Result<Application, Error> {
        let accepted = self.transition(job_id, worker_id, ApplicationStatus::Accepted)?;
        if let Err(err) = self.ledger.consume(worker_id, accepted.credits_used, job_id) {
            // put the row back so the call can be retried cleanly
            let revert = self.store.with_application(job_id, worker_id, |app| {
                app.status = ApplicationStatus::Pending;
                Ok(())
            });
            if let Err(comp) = revert {
                error!(job_id, worker_id, %comp, "failed to revert acceptance");
            }
            return Err(err);
        }
        for loser in self.store.pending_workers(job_id) {
            let released = self
                .store
                .with_application(job_id, loser, |app| {
                    app.status = ApplicationStatus::Rejected;
                    Ok(app.credits_used)
                })
                .and_then(|credits| self.ledger.release(loser, credits, job_id));
            if let Err(err) = released {
                warn!(job_id, loser, %err, "failed to release a competing reservation");
            }
        }
        info!(job_id, worker_id, "application accepted");
        Ok(accepted)
    }

    pub fn reject(&self, job_id: JobId, worker_id: UserId) -> Result<Application, Error> {
        self.close(job_id, worker_id, ApplicationStatus::Rejected)
    }

    pub fn withdraw(&self, job_id: JobId, worker_id: UserId) -> Result<Application, Error> {
        self.close(job_id, worker_id, ApplicationStatus::Withdrawn)
    }

    /// Releases every pending reservation for a job whose escrow was
    /// cancelled. Individual failures are logged and do not stop the sweep.
    pub fn cancel_pending(&self, job_id: JobId) {
        for worker in self.store.pending_workers(job_id) {
            let released = self
                .store
                .with_application(job_id, worker, |app| {
                    app.status = ApplicationStatus::Rejected;
                    Ok(app.credits_used)
                })
                .and_then(|credits| self.ledger.release(worker, credits, job_id));
            if let Err(err) = released {
                warn!(job_id, worker, %err, "failed to release reservation on cancellation");
            }
        }
    }

    /// Closes an application as rejected or withdrawn and gives the worker
    /// their credits back: a release while still reserved, a refund once
    /// consumed. `credits_refunded` flips to true exactly once.
    fn close(
        &self,
        job_id: JobId,
        worker_id: UserId,
        next: ApplicationStatus,
    ) -> Result<Application, Error> {
        let prior = self
            .store
            .application(job_id, worker_id)
            .ok_or(Error::NotFound {
                kind: "application",
                id: job_id,
            })?
            .status;
        let closed = self.transition(job_id, worker_id, next)?;
        let returned = if prior == ApplicationStatus::Accepted {
            self.ledger.refund(worker_id, closed.credits_used, job_id)
        } else {
            self.ledger.release(worker_id, closed.credits_used, job_id)
        };
        if let Err(err) = returned {
            error!(job_id, worker_id, %err, "failed to return credits on close");
            // put the row back so the close can be retried cleanly
            let revert = self.store.with_application(job_id, worker_id, |app| {
                app.status = prior;
                Ok(())
            });
            if let Err(comp) = revert {
                error!(job_id, worker_id, %comp, "failed to revert close");
            }
            return Err(err);
        }
        let closed = self.store.with_application(job_id, worker_id, |app| {
            app.credits_refunded = true;
            Ok(app.clone())
        })?;
        info!(job_id, worker_id, status = %closed.status, "application closed");
        Ok(closed)
    }

    /// Status transition guard: accepted/rejected/withdrawn only follow
    /// pending, except that an accepted application may still be closed.
    fn transition(
        &self,
        job_id: JobId,
        worker_id: UserId,
        next: ApplicationStatus,
    ) -> Result<Application, Error> {
        self.store.with_application(job_id, worker_id, |app| {
            let allowed = match app.status {
                ApplicationStatus::Pending => true,
                ApplicationStatus::Accepted => next != ApplicationStatus::Accepted,
                _ => false,
            };
            if !allowed {
                return Err(Error::InvalidTransition {
                    entity: "application",
                    from: app.status.as_str(),
                    attempted: next.as_str(),
                });
            }
            app.status = next;
            Ok(app.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreditSource, SettlementStore};
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct ClosedJobs(Vec<JobId>);

    impl JobGate for ClosedJobs {
        fn is_open(&self, job_id: JobId) -> Result<bool, Error> {
            Ok(!self.0.contains(&job_id))
        }
    }

    fn flow() -> ApplicationFlow<MemoryStore, AllJobsOpen> {
        flow_with_gate(AllJobsOpen)
    }

    fn flow_with_gate<G: JobGate>(gate: G) -> ApplicationFlow<MemoryStore, G> {
        let store = Arc::new(MemoryStore::new());
        let ledger = CreditLedger::new(Arc::clone(&store));
        ApplicationFlow::new(store, ledger, gate)
    }

    fn fund(flow: &ApplicationFlow<MemoryStore, impl JobGate>, user: UserId, credits: u64) {
        flow.ledger.credit(user, credits, CreditSource::Purchase).unwrap();
    }

    #[test]
    fn apply_reserves_credits_and_creates_pending_row() {
        let flow = flow();
        fund(&flow, 1, 10);
        let application = flow.apply(7, 1, 4).unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert!(!application.credits_refunded);
        let balance = flow.ledger.balance(1);
        assert_eq!(balance.reserved, 4);
        assert_eq!(balance.available, 6);
    }

    #[test]
    fn apply_rejects_closed_jobs_without_touching_credits() {
        let flow = flow_with_gate(ClosedJobs(vec![7]));
        fund(&flow, 1, 10);
        assert!(matches!(flow.apply(7, 1, 4), Err(Error::JobNotOpen(7))));
        assert_eq!(flow.ledger.balance(1).reserved, 0);
    }

    #[test]
    fn apply_rejects_second_application_for_same_job() {
        let flow = flow();
        fund(&flow, 1, 10);
        flow.apply(7, 1, 4).unwrap();
        assert!(matches!(
            flow.apply(7, 1, 4),
            Err(Error::DuplicateApplication {
                job_id: 7,
                worker_id: 1
            })
        ));
        assert_eq!(flow.ledger.balance(1).reserved, 4);
    }

    #[test]
    fn apply_without_credits_fails_cleanly() {
        let flow = flow();
        fund(&flow, 1, 2);
        assert!(matches!(
            flow.apply(7, 1, 5),
            Err(Error::InsufficientCredits {
                required: 5,
                available: 2
            })
        ));
        assert!(flow.store.application(7, 1).is_none());
    }

    #[test]
    fn accept_consumes_winner_and_releases_losers() {
        let flow = flow();
        fund(&flow, 1, 10);
        fund(&flow, 2, 10);
        fund(&flow, 3, 10);
        flow.apply(7, 1, 5).unwrap();
        flow.apply(7, 2, 3).unwrap();
        flow.apply(7, 3, 2).unwrap();

        flow.accept(7, 2).unwrap();

        let winner = flow.ledger.get_or_init(2).unwrap();
        assert_eq!(winner.balance, 7);
        assert_eq!(winner.reserved, 0);
        assert_eq!(winner.lifetime_used, 3);

        for loser in [1u64, 3] {
            let account = flow.ledger.get_or_init(loser).unwrap();
            assert_eq!(account.balance, 10);
            assert_eq!(account.reserved, 0);
            let app = flow.store.application(7, loser).unwrap();
            assert_eq!(app.status, ApplicationStatus::Rejected);
            // released, not refunded
            assert!(!app.credits_refunded);
        }
    }

    #[test]
    fn accept_requires_a_pending_application() {
        let flow = flow();
        fund(&flow, 1, 10);
        flow.apply(7, 1, 5).unwrap();
        flow.accept(7, 1).unwrap();
        assert!(matches!(
            flow.accept(7, 1),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reject_pending_releases_reservation_and_flags_refunded() {
        let flow = flow();
        fund(&flow, 1, 10);
        flow.apply(7, 1, 5).unwrap();
        let rejected = flow.reject(7, 1).unwrap();
        assert_eq!(rejected.status, ApplicationStatus::Rejected);
        assert!(rejected.credits_refunded);
        let balance = flow.ledger.balance(1);
        assert_eq!(balance.balance, 10);
        assert_eq!(balance.reserved, 0);
        // terminal status: a second close is an invalid transition
        assert!(matches!(
            flow.withdraw(7, 1),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn withdraw_after_acceptance_refunds_consumed_credits() {
        let flow = flow();
        fund(&flow, 1, 10);
        flow.apply(7, 1, 5).unwrap();
        flow.accept(7, 1).unwrap();
        assert_eq!(flow.ledger.balance(1).balance, 5);

        let withdrawn = flow.withdraw(7, 1).unwrap();
        assert_eq!(withdrawn.status, ApplicationStatus::Withdrawn);
        assert!(withdrawn.credits_refunded);
        assert_eq!(flow.ledger.balance(1).balance, 10);

        // refund idempotency still guards the reference directly
        assert!(matches!(
            flow.ledger.refund(1, 5, 7),
            Err(Error::AlreadyRefunded(7))
        ));
    }

    #[test]
    fn cancel_pending_releases_every_reservation() {
        let flow = flow();
        fund(&flow, 1, 10);
        fund(&flow, 2, 10);
        flow.apply(7, 1, 5).unwrap();
        flow.apply(7, 2, 3).unwrap();
        flow.cancel_pending(7);
        for worker in [1u64, 2] {
            assert_eq!(flow.ledger.balance(worker).reserved, 0);
            assert_eq!(
                flow.store.application(7, worker).unwrap().status,
                ApplicationStatus::Rejected
            );
        }
    }

    /// Store wrapper whose application inserts always fail, to exercise the
    /// compensating release and the bounded retry.
    struct InsertAlwaysFails {
        inner: MemoryStore,
        insert_attempts: AtomicU32,
    }

    impl LedgerStore for InsertAlwaysFails {
        fn with_account<T>(
            &self,
            user_id: UserId,
            apply: impl FnOnce(&mut crate::domain::AccountTxn<'_>) -> Result<T, Error>,
        ) -> Result<T, Error> {
            self.inner.with_account(user_id, apply)
        }

        fn account(&self, user_id: UserId) -> Option<crate::domain::CreditAccount> {
            self.inner.account(user_id)
        }

        fn transactions(&self, user_id: UserId) -> Vec<crate::domain::CreditTransaction> {
            self.inner.transactions(user_id)
        }
    }

    impl ApplicationStore for InsertAlwaysFails {
        fn insert_application(&self, _application: Application) -> Result<(), Error> {
            self.insert_attempts.fetch_add(1, Ordering::Relaxed);
            Err(Error::TransientStore("application insert failed".into()))
        }

        fn with_application<T>(
            &self,
            job_id: JobId,
            worker_id: UserId,
            apply: impl FnOnce(&mut Application) -> Result<T, Error>,
        ) -> Result<T, Error> {
            self.inner.with_application(job_id, worker_id, apply)
        }

        fn application(&self, job_id: JobId, worker_id: UserId) -> Option<Application> {
            self.inner.application(job_id, worker_id)
        }

        fn pending_workers(&self, job_id: JobId) -> Vec<UserId> {
            self.inner.pending_workers(job_id)
        }
    }

    /// Store wrapper whose ledger side can be switched off, to exercise
    /// close-path failures after the application row already exists.
    struct LedgerFailsOnDemand {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl LedgerStore for LedgerFailsOnDemand {
        fn with_account<T>(
            &self,
            user_id: UserId,
            apply: impl FnOnce(&mut crate::domain::AccountTxn<'_>) -> Result<T, Error>,
        ) -> Result<T, Error> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(Error::TransientStore("ledger unavailable".into()));
            }
            self.inner.with_account(user_id, apply)
        }

        fn account(&self, user_id: UserId) -> Option<crate::domain::CreditAccount> {
            self.inner.account(user_id)
        }

        fn transactions(&self, user_id: UserId) -> Vec<crate::domain::CreditTransaction> {
            self.inner.transactions(user_id)
        }
    }

    impl ApplicationStore for LedgerFailsOnDemand {
        fn insert_application(&self, application: Application) -> Result<(), Error> {
            self.inner.insert_application(application)
        }

        fn with_application<T>(
            &self,
            job_id: JobId,
            worker_id: UserId,
            apply: impl FnOnce(&mut Application) -> Result<T, Error>,
        ) -> Result<T, Error> {
            self.inner.with_application(job_id, worker_id, apply)
        }

        fn application(&self, job_id: JobId, worker_id: UserId) -> Option<Application> {
            self.inner.application(job_id, worker_id)
        }

        fn pending_workers(&self, job_id: JobId) -> Vec<UserId> {
            self.inner.pending_workers(job_id)
        }
    }

    #[test]
    fn failed_credit_return_leaves_close_retryable() {
        let store = Arc::new(LedgerFailsOnDemand {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(false),
        });
        let ledger = CreditLedger::new(Arc::clone(&store));
        let flow = ApplicationFlow::new(Arc::clone(&store), ledger.clone(), AllJobsOpen);
        ledger.credit(1, 10, CreditSource::Purchase).unwrap();
        flow.apply(7, 1, 5).unwrap();

        store.fail.store(true, Ordering::Relaxed);
        let err = flow.withdraw(7, 1).unwrap_err();
        assert!(err.is_transient());
        // the failed close reverted the row, nothing is terminal yet
        let app = store.application(7, 1).unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert!(!app.credits_refunded);

        store.fail.store(false, Ordering::Relaxed);
        let withdrawn = flow.withdraw(7, 1).unwrap();
        assert_eq!(withdrawn.status, ApplicationStatus::Withdrawn);
        assert!(withdrawn.credits_refunded);
        let balance = ledger.balance(1);
        assert_eq!(balance.reserved, 0);
        assert_eq!(balance.available, 10);
    }

    #[test]
    fn failed_refund_after_acceptance_leaves_close_retryable() {
        let store = Arc::new(LedgerFailsOnDemand {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(false),
        });
        let ledger = CreditLedger::new(Arc::clone(&store));
        let flow = ApplicationFlow::new(Arc::clone(&store), ledger.clone(), AllJobsOpen);
        ledger.credit(1, 10, CreditSource::Purchase).unwrap();
        flow.apply(7, 1, 5).unwrap();
        flow.accept(7, 1).unwrap();

        store.fail.store(true, Ordering::Relaxed);
        assert!(flow.reject(7, 1).is_err());
        assert_eq!(
            store.application(7, 1).unwrap().status,
            ApplicationStatus::Accepted
        );

        store.fail.store(false, Ordering::Relaxed);
        let rejected = flow.reject(7, 1).unwrap();
        assert!(rejected.credits_refunded);
        assert_eq!(ledger.balance(1).balance, 10);
    }

    #[test]
    fn failed_row_creation_releases_the_reservation() {
        let store = Arc::new(InsertAlwaysFails {
            inner: MemoryStore::new(),
            insert_attempts: AtomicU32::new(0),
        });
        let ledger = CreditLedger::new(Arc::clone(&store));
        let flow = ApplicationFlow::new(Arc::clone(&store), ledger.clone(), AllJobsOpen);
        ledger.credit(1, 10, CreditSource::Purchase).unwrap();

        let err = flow.apply(7, 1, 4).unwrap_err();
        assert!(err.is_transient());
        // the insert was retried a bounded number of times
        assert_eq!(store.insert_attempts.load(Ordering::Relaxed), 3);
        // and the compensating release ran before the error surfaced
        let balance = ledger.balance(1);
        assert_eq!(balance.reserved, 0);
        assert_eq!(balance.available, 10);
    }

    #[test]
    fn flush_does_not_panic_on_populated_store() {
        let flow = flow();
        fund(&flow, 1, 10);
        flow.apply(7, 1, 4).unwrap();
        flow.store.flush();
    }
}
