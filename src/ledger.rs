use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    BalanceView, CreditAccount, CreditSource, Error, JobId, LedgerStore, TransactionReason, UserId,
};
use crate::retry;

/// Owns every mutation of credit balances.
///
/// Each operation is a single atomic check-and-update on the backing store,
/// so concurrent callers can never both spend the same `available` credits.
/// Transient store failures are retried a bounded number of times; all
/// business rejections surface unchanged.
pub struct CreditLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for CreditLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn signed(amount: u64) -> Result<i64, Error> {
    i64::try_from(amount).map_err(|_| Error::Overflow("credit amount"))
}

impl<S: LedgerStore> CreditLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the account, creating it with a zero balance on first use.
    pub fn get_or_init(&self, user_id: UserId) -> Result<CreditAccount, Error> {
        retry::run("ledger.get_or_init", || {
            self.store.with_account(user_id, |txn| Ok(*txn.account))
        })
    }

    /// Read-only balance summary; does not create missing accounts.
    pub fn balance(&self, user_id: UserId) -> BalanceView {
        let account = self.store.account(user_id).unwrap_or_default();
        BalanceView {
            balance: account.balance,
            reserved: account.reserved,
            available: account.available(),
        }
    }

    /// Earmarks credits for a pending application. The balance itself is
    /// unchanged; only `available` shrinks.
    pub fn reserve(&self, user_id: UserId, amount: u64, reference: JobId) -> Result<CreditAccount, Error> {
        let change = signed(amount)?;
        let account = retry::run("ledger.reserve", || {
            self.store.with_account(user_id, |txn| {
                let available = txn.account.available();
                if amount > available {
                    return Err(Error::InsufficientCredits {
                        required: amount,
                        available,
                    });
                }
                txn.account.reserved = txn
                    .account
                    .reserved
                    .checked_add(amount)
                    .ok_or(Error::Overflow("reserved credits"))?;
                txn.record(TransactionReason::Reserve, -change, Some(reference));
                debug_assert!(txn.account.invariant_holds());
                Ok(*txn.account)
            })
        })?;
        debug!(user_id, amount, reference, "credits reserved");
        Ok(account)
    }

    /// Hands a reservation back without spending it.
    pub fn release(&self, user_id: UserId, amount: u64, reference: JobId) -> Result<CreditAccount, Error> {
        let change = signed(amount)?;
        let account = retry::run("ledger.release", || {
            self.store.with_account(user_id, |txn| {
                if amount > txn.account.reserved {
                    return Err(Error::InsufficientReserved {
                        required: amount,
                        reserved: txn.account.reserved,
                    });
                }
                txn.account.reserved -= amount;
                txn.record(TransactionReason::Release, change, Some(reference));
                debug_assert!(txn.account.invariant_holds());
                Ok(*txn.account)
            })
        })?;
        debug!(user_id, amount, reference, "reservation released");
        Ok(account)
    }

    /// Converts a reservation into a permanent spend, decrementing both
    /// balance and reserved.
    pub fn consume(&self, user_id: UserId, amount: u64, reference: JobId) -> Result<CreditAccount, Error> {
        let change = signed(amount)?;
        let account = retry::run("ledger.consume", || {
            self.store.with_account(user_id, |txn| {
                if amount > txn.account.reserved {
                    return Err(Error::InsufficientReserved {
                        required: amount,
                        reserved: txn.account.reserved,
                    });
                }
                txn.account.reserved -= amount;
                txn.account.balance -= amount; // reserved <= balance held before
                txn.account.lifetime_used = txn
                    .account
                    .lifetime_used
                    .checked_add(amount)
                    .ok_or(Error::Overflow("lifetime used"))?;
                txn.record(TransactionReason::Consume, -change, Some(reference));
                debug_assert!(txn.account.invariant_holds());
                Ok(*txn.account)
            })
        })?;
        debug!(user_id, amount, reference, "credits consumed");
        Ok(account)
    }

    /// Returns previously consumed credits. Idempotent per reference: a
    /// second refund for the same reference fails with `AlreadyRefunded`
    /// instead of crediting again.
    pub fn refund(&self, user_id: UserId, amount: u64, reference: JobId) -> Result<CreditAccount, Error> {
        let change = signed(amount)?;
        let account = retry::run("ledger.refund", || {
            self.store.with_account(user_id, |txn| {
                if txn.refund_applied(reference) {
                    return Err(Error::AlreadyRefunded(reference));
                }
                txn.account.balance = txn
                    .account
                    .balance
                    .checked_add(amount)
                    .ok_or(Error::Overflow("credit balance"))?;
                txn.mark_refund_applied(reference);
                txn.record(TransactionReason::Refund, change, Some(reference));
                debug_assert!(txn.account.invariant_holds());
                Ok(*txn.account)
            })
        })?;
        debug!(user_id, amount, reference, "credits refunded");
        Ok(account)
    }

    /// Adds credits from a purchase or a free grant.
    pub fn credit(&self, user_id: UserId, amount: u64, source: CreditSource) -> Result<CreditAccount, Error> {
        let change = signed(amount)?;
        let account = retry::run("ledger.credit", || {
            self.store.with_account(user_id, |txn| {
                txn.account.balance = txn
                    .account
                    .balance
                    .checked_add(amount)
                    .ok_or(Error::Overflow("credit balance"))?;
                if source == CreditSource::Purchase {
                    txn.account.lifetime_purchased = txn
                        .account
                        .lifetime_purchased
                        .checked_add(amount)
                        .ok_or(Error::Overflow("lifetime purchased"))?;
                }
                txn.record(source.reason(), change, None);
                debug_assert!(txn.account.invariant_holds());
                Ok(*txn.account)
            })
        })?;
        debug!(user_id, amount, source = %source.reason(), "credits added");
        Ok(account)
    }
}
