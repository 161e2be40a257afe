use tracing::warn;

use crate::domain::{DeadLetterQueue, Error};

/// Rejected commands land here. Business rejections are an expected part of
/// settlement, so a warning with the structured error is all they get.
#[derive(Default, Debug)]
pub struct TracingDlq;

impl DeadLetterQueue for TracingDlq {
    fn report(&self, error: &Error) {
        warn!(%error, "command rejected");
    }
}
