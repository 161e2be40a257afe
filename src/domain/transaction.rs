use std::time::SystemTime;

use crate::domain::{JobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionReason {
    Purchase,
    Reserve,
    Release,
    Consume,
    Refund,
    FreeCredit,
}

impl TransactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::Purchase => "purchase",
            TransactionReason::Reserve => "reserve",
            TransactionReason::Release => "release",
            TransactionReason::Consume => "consume",
            TransactionReason::Refund => "refund",
            TransactionReason::FreeCredit => "free_credit",
        }
    }
}

impl core::fmt::Display for TransactionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why credits were added outside the reservation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditSource {
    Purchase,
    FreeGrant,
}

impl CreditSource {
    pub fn reason(&self) -> TransactionReason {
        match self {
            CreditSource::Purchase => TransactionReason::Purchase,
            CreditSource::FreeGrant => TransactionReason::FreeCredit,
        }
    }
}

/// One append-only ledger entry. Never mutated or deleted; replaying a
/// user's entries in `seq` order reproduces the live account.
#[derive(Debug, Clone)]
pub struct CreditTransaction {
    pub seq: u64,
    pub user_id: UserId,
    pub change_amount: i64,
    pub reason: TransactionReason,
    pub balance_after: u64,
    pub reserved_after: u64,
    pub reference_id: Option<JobId>,
    pub created_at: SystemTime,
}

impl core::fmt::Display for CreditTransaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{},user={},change={},balance_after={}",
            self.reason, self.user_id, self.change_amount, self.balance_after
        )?;
        if let Some(reference) = self.reference_id {
            write!(f, ",ref={}", reference)?;
        }
        Ok(())
    }
}
