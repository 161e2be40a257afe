use crate::domain::{JobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

impl core::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker's application to a job, at most one per (job, worker) pair.
///
/// `credits_refunded` flips false -> true at most once, and only when the
/// status is rejected or withdrawn. Released reservations do not count as
/// refunds; they simply restore `available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub job_id: JobId,
    pub worker_id: UserId,
    pub credits_used: u64,
    pub status: ApplicationStatus,
    pub credits_refunded: bool,
}

impl Application {
    pub fn new(job_id: JobId, worker_id: UserId, credits_used: u64) -> Self {
        Self {
            job_id,
            worker_id,
            credits_used,
            status: ApplicationStatus::Pending,
            credits_refunded: false,
        }
    }
}
