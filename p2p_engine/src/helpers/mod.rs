mod ids;
mod retry;

pub use ids::new_prefixed_id;
pub use retry::{retry_on_conflict, MAX_CONFLICT_RETRIES};
