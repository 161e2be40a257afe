use std::time::Duration;

use tracing::warn;

use crate::domain::Error;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(10);

/// Retries `op` a small, fixed number of times on transient store failures
/// with a short linear backoff. Business rejections return on the first
/// attempt; they represent a correct rejection, not a fault.
pub(crate) fn run<T>(name: &str, mut op: impl FnMut() -> Result<T, Error>) -> Result<T, Error> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(%err, name, attempt, "transient store failure, retrying");
                std::thread::sleep(BACKOFF_STEP * attempt);
                attempt += 1;
            }
            other => return other,
        }
    }
}
