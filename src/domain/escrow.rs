use std::time::SystemTime;

use crate::domain::{CommissionResult, JobId, Money, UserId};

/// Escrow state machine: `Created -> Funded -> Released`, with
/// `Created|Funded -> Cancelled` as the only other transition. `Released`
/// and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowStatus {
    Created,
    Funded,
    Released,
    Cancelled,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Created => "created",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Released => "released",
            EscrowStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client funds held against a job until the work is approved. At most one
/// escrow exists per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escrow {
    pub job_id: JobId,
    pub client_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub status: EscrowStatus,
    pub released_at: Option<SystemTime>,
}

impl Escrow {
    pub fn new(job_id: JobId, client_id: UserId, amount: Money, currency: &str) -> Self {
        Self {
            job_id,
            client_id,
            amount,
            currency: currency.to_owned(),
            status: EscrowStatus::Created,
            released_at: None,
        }
    }
}

/// Fee breakdown recorded at settlement, at most once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commission {
    pub job_id: JobId,
    pub breakdown: CommissionResult,
    pub charged_at: SystemTime,
}
