use crate::domain::{JobId, Money, SettlementFacts, UserId};

/// One settlement command from the replay stream.
#[derive(Debug, Clone)]
pub enum CommandKind {
    Credit { amount: u64 },
    Grant { amount: u64 },
    Reserve { job_id: JobId, amount: u64 },
    Release { job_id: JobId, amount: u64 },
    Consume { job_id: JobId, amount: u64 },
    Refund { job_id: JobId, amount: u64 },
    Apply { job_id: JobId, credits: u64 },
    Accept { job_id: JobId },
    Reject { job_id: JobId },
    Withdraw { job_id: JobId },
    EscrowCreate { job_id: JobId, amount: Money, currency: String },
    EscrowFund { job_id: JobId },
    EscrowRelease { job_id: JobId, facts: SettlementFacts },
    EscrowCancel { job_id: JobId },
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Credit { .. } => "credit",
            CommandKind::Grant { .. } => "grant",
            CommandKind::Reserve { .. } => "reserve",
            CommandKind::Release { .. } => "release",
            CommandKind::Consume { .. } => "consume",
            CommandKind::Refund { .. } => "refund",
            CommandKind::Apply { .. } => "apply",
            CommandKind::Accept { .. } => "accept",
            CommandKind::Reject { .. } => "reject",
            CommandKind::Withdraw { .. } => "withdraw",
            CommandKind::EscrowCreate { .. } => "escrow_create",
            CommandKind::EscrowFund { .. } => "escrow_fund",
            CommandKind::EscrowRelease { .. } => "escrow_release",
            CommandKind::EscrowCancel { .. } => "escrow_cancel",
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            CommandKind::Credit { .. } | CommandKind::Grant { .. } => None,
            CommandKind::Reserve { job_id, .. }
            | CommandKind::Release { job_id, .. }
            | CommandKind::Consume { job_id, .. }
            | CommandKind::Refund { job_id, .. }
            | CommandKind::Apply { job_id, .. }
            | CommandKind::Accept { job_id }
            | CommandKind::Reject { job_id }
            | CommandKind::Withdraw { job_id }
            | CommandKind::EscrowCreate { job_id, .. }
            | CommandKind::EscrowFund { job_id }
            | CommandKind::EscrowRelease { job_id, .. }
            | CommandKind::EscrowCancel { job_id } => Some(*job_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    pub user_id: UserId,
    pub kind: CommandKind,
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{},user={}", self.kind.name(), self.user_id)?;
        if let Some(job_id) = self.kind.job_id() {
            write!(f, ",job={}", job_id)?;
        }
        Ok(())
    }
}
