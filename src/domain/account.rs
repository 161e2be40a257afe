use crate::domain::transaction::{CreditTransaction, TransactionReason};

/// Per-user prepaid credit balance with reservation semantics.
///
/// Created lazily with a zero balance on first use and never deleted. Every
/// mutation goes through the ledger, which keeps `reserved <= balance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditAccount {
    /// Total credits owned.
    pub balance: u64,
    /// Credits earmarked for pending applications.
    pub reserved: u64,
    /// Monotonic counter of credits ever purchased. Informational only.
    pub lifetime_purchased: u64,
    /// Monotonic counter of credits ever consumed. Informational only.
    pub lifetime_used: u64,
}

impl CreditAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits not earmarked by a reservation.
    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.reserved)
    }

    /// `0 <= reserved <= balance` must hold after every ledger operation.
    pub fn invariant_holds(&self) -> bool {
        self.reserved <= self.balance
    }

    /// Rebuilds an account by replaying a transaction log in order.
    ///
    /// The result must match the live account; a mismatch means the log and
    /// the row have diverged.
    pub fn replay<'a>(log: impl IntoIterator<Item = &'a CreditTransaction>) -> Self {
        let mut account = Self::new();
        for tx in log {
            let amount = tx.change_amount.unsigned_abs();
            match tx.reason {
                TransactionReason::Purchase => {
                    account.balance = account.balance.saturating_add(amount);
                    account.lifetime_purchased = account.lifetime_purchased.saturating_add(amount);
                }
                TransactionReason::FreeCredit | TransactionReason::Refund => {
                    account.balance = account.balance.saturating_add(amount);
                }
                TransactionReason::Reserve => {
                    account.reserved = account.reserved.saturating_add(amount);
                }
                TransactionReason::Release => {
                    account.reserved = account.reserved.saturating_sub(amount);
                }
                TransactionReason::Consume => {
                    account.balance = account.balance.saturating_sub(amount);
                    account.reserved = account.reserved.saturating_sub(amount);
                    account.lifetime_used = account.lifetime_used.saturating_add(amount);
                }
            }
        }
        account
    }
}

/// Read-only balance summary exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceView {
    pub balance: u64,
    pub reserved: u64,
    pub available: u64,
}
