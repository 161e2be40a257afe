use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::domain::{
    AccountTxn, Application, ApplicationStatus, ApplicationStore, Commission, CreditAccount,
    CreditTransaction, Error, Escrow, EscrowStore, EscrowTxn, JobId, LedgerStore, SettlementStore,
    UserId,
};

#[derive(Default)]
struct AccountSlot {
    account: CreditAccount,
    refunded: HashSet<JobId>,
    log: Vec<CreditTransaction>,
}

struct EscrowSlot {
    escrow: Escrow,
    commission: Option<Commission>,
}

/// In-memory settlement store.
///
/// Each map mutex is held for the whole of one read-modify-write, which
/// serializes operations per entity; a closure that fails rolls the entity
/// back to its pre-call state, so no partial mutation is ever visible.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<UserId, AccountSlot>>,
    escrows: Mutex<HashMap<JobId, EscrowSlot>>,
    applications: Mutex<HashMap<(JobId, UserId), Application>>,
    seq: AtomicU64,
}

fn poisoned(what: &str) -> Error {
    Error::TransientStore(format!("{what} lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn with_account<T>(
        &self,
        user_id: UserId,
        apply: impl FnOnce(&mut AccountTxn<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut accounts = self.accounts.lock().map_err(|_| poisoned("accounts"))?;
        let slot = accounts.entry(user_id).or_default();

        let account_snapshot = slot.account;
        let refunded_snapshot = slot.refunded.clone();
        let mut txn = AccountTxn::new(&mut slot.account, &mut slot.refunded);
        let result = apply(&mut txn);
        let staged = txn.into_staged();

        match result {
            Ok(value) => {
                for entry in staged {
                    slot.log.push(CreditTransaction {
                        seq: self.seq.fetch_add(1, Ordering::Relaxed),
                        user_id,
                        change_amount: entry.change_amount,
                        reason: entry.reason,
                        balance_after: slot.account.balance,
                        reserved_after: slot.account.reserved,
                        reference_id: entry.reference_id,
                        created_at: SystemTime::now(),
                    });
                }
                Ok(value)
            }
            Err(err) => {
                slot.account = account_snapshot;
                slot.refunded = refunded_snapshot;
                Err(err)
            }
        }
    }

    fn account(&self, user_id: UserId) -> Option<CreditAccount> {
        let accounts = self.accounts.lock().ok()?;
        accounts.get(&user_id).map(|slot| slot.account)
    }

    fn transactions(&self, user_id: UserId) -> Vec<CreditTransaction> {
        let Ok(accounts) = self.accounts.lock() else {
            return Vec::new();
        };
        accounts
            .get(&user_id)
            .map(|slot| slot.log.clone())
            .unwrap_or_default()
    }
}

impl EscrowStore for MemoryStore {
    fn insert_escrow(&self, escrow: Escrow) -> Result<(), Error> {
        let mut escrows = self.escrows.lock().map_err(|_| poisoned("escrows"))?;
        match escrows.entry(escrow.job_id) {
            Entry::Vacant(entry) => {
                entry.insert(EscrowSlot {
                    escrow,
                    commission: None,
                });
                Ok(())
            }
            Entry::Occupied(entry) => Err(Error::DuplicateEscrow(entry.key().to_owned())),
        }
    }

    fn with_escrow<T>(
        &self,
        job_id: JobId,
        apply: impl FnOnce(&mut EscrowTxn<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut escrows = self.escrows.lock().map_err(|_| poisoned("escrows"))?;
        let slot = escrows.get_mut(&job_id).ok_or(Error::NotFound {
            kind: "escrow",
            id: job_id,
        })?;

        let escrow_snapshot = slot.escrow.clone();
        let commission_snapshot = slot.commission;
        let mut txn = EscrowTxn {
            escrow: &mut slot.escrow,
            commission: &mut slot.commission,
        };
        match apply(&mut txn) {
            Ok(value) => Ok(value),
            Err(err) => {
                slot.escrow = escrow_snapshot;
                slot.commission = commission_snapshot;
                Err(err)
            }
        }
    }

    fn escrow(&self, job_id: JobId) -> Option<Escrow> {
        let escrows = self.escrows.lock().ok()?;
        escrows.get(&job_id).map(|slot| slot.escrow.clone())
    }

    fn commission(&self, job_id: JobId) -> Option<Commission> {
        let escrows = self.escrows.lock().ok()?;
        escrows.get(&job_id).and_then(|slot| slot.commission)
    }
}

impl ApplicationStore for MemoryStore {
    fn insert_application(&self, application: Application) -> Result<(), Error> {
        let mut applications = self
            .applications
            .lock()
            .map_err(|_| poisoned("applications"))?;
        match applications.entry((application.job_id, application.worker_id)) {
            Entry::Vacant(entry) => {
                entry.insert(application);
                Ok(())
            }
            Entry::Occupied(entry) => {
                let (job_id, worker_id) = *entry.key();
                Err(Error::DuplicateApplication { job_id, worker_id })
            }
        }
    }

    fn with_application<T>(
        &self,
        job_id: JobId,
        worker_id: UserId,
        apply: impl FnOnce(&mut Application) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut applications = self
            .applications
            .lock()
            .map_err(|_| poisoned("applications"))?;
        let application = applications
            .get_mut(&(job_id, worker_id))
            .ok_or(Error::NotFound {
                kind: "application",
                id: job_id,
            })?;

        let snapshot = application.clone();
        match apply(application) {
            Ok(value) => Ok(value),
            Err(err) => {
                *application = snapshot;
                Err(err)
            }
        }
    }

    fn application(&self, job_id: JobId, worker_id: UserId) -> Option<Application> {
        let applications = self.applications.lock().ok()?;
        applications.get(&(job_id, worker_id)).cloned()
    }

    fn pending_workers(&self, job_id: JobId) -> Vec<UserId> {
        let Ok(applications) = self.applications.lock() else {
            return Vec::new();
        };
        let mut workers: Vec<UserId> = applications
            .values()
            .filter(|app| app.job_id == job_id && app.status == ApplicationStatus::Pending)
            .map(|app| app.worker_id)
            .collect();
        workers.sort_unstable();
        workers
    }
}

impl SettlementStore for MemoryStore {
    fn flush(&self) {
        println!("user,balance,reserved,available,lifetime_purchased,lifetime_used");
        if let Ok(accounts) = self.accounts.lock() {
            let mut users: Vec<&UserId> = accounts.keys().collect();
            users.sort_unstable();
            for user_id in users {
                let slot = &accounts[user_id];
                println!(
                    "{},{},{},{},{},{}",
                    user_id,
                    slot.account.balance,
                    slot.account.reserved,
                    slot.account.available(),
                    slot.account.lifetime_purchased,
                    slot.account.lifetime_used
                );
            }
        }
        println!();
        println!("job,client,amount,currency,status");
        if let Ok(escrows) = self.escrows.lock() {
            let mut jobs: Vec<&JobId> = escrows.keys().collect();
            jobs.sort_unstable();
            for job_id in jobs {
                let escrow = &escrows[job_id].escrow;
                println!(
                    "{},{},{},{},{}",
                    job_id, escrow.client_id, escrow.amount, escrow.currency, escrow.status
                );
            }
        }
    }
}
