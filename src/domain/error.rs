use crate::domain::{JobId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("ingestion failed: {0}")]
    Ingestion(String),

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u64, available: u64 },

    #[error("insufficient reserved credits: required {required}, reserved {reserved}")]
    InsufficientReserved { required: u64, reserved: u64 },

    #[error("invalid {entity} transition: {from} -> {attempted}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        attempted: &'static str,
    },

    #[error("refund for reference {0} was already applied")]
    AlreadyRefunded(JobId),

    #[error("escrow for job {0} was already released")]
    AlreadyReleased(JobId),

    #[error("an escrow already exists for job {0}")]
    DuplicateEscrow(JobId),

    #[error("worker {worker_id} already applied to job {job_id}")]
    DuplicateApplication { job_id: JobId, worker_id: UserId },

    #[error("job {0} is not open for applications")]
    JobNotOpen(JobId),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("transient store failure: {0}")]
    TransientStore(String),
}

impl Error {
    /// Only transient infrastructure failures may be retried. Every business
    /// rejection is terminal for the call that produced it.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientStore(_))
    }
}
