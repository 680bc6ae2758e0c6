use chrono::Utc;
use rand::Rng;

/// Generates an identifier of the form `{prefix}_{unix_millis}_{random}`.
///
/// Ids sort roughly by creation time, and the random suffix keeps ids created in the same millisecond apart.
pub fn new_prefixed_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    format!("{prefix}_{millis}_{suffix}")
}
