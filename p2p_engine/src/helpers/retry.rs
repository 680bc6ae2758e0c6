use std::future::Future;

use log::*;
use tokio::time::{sleep, Duration};

use crate::traits::ExchangeError;

/// The number of times a write that lost a race on the sell order aggregate is attempted again.
pub const MAX_CONFLICT_RETRIES: usize = 5;

/// Runs `op`, re-running it with a short, growing back-off whenever it fails with
/// [`ExchangeError::ConcurrentModification`]. Any other result is returned as is.
pub async fn retry_on_conflict<T, F, Fut>(label: &str, mut op: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(ExchangeError::ConcurrentModification(msg)) if attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                let wait = Duration::from_millis(10 * (1 << attempt) + rand::random::<u64>() % 10);
                debug!("🔁️ {label} lost a race ({msg}). Retry {attempt}/{MAX_CONFLICT_RETRIES} in {wait:?}");
                sleep(wait).await;
            },
            result => return result,
        }
    }
}
