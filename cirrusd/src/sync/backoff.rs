use std::time::Duration;

use rand::Rng;

use super::queue::{ErrorCategory, NETWORK_DELAY_INDEX_CAP};

/// Standard retry schedule in seconds. Beyond the last index the cap repeats.
const RETRY_SCHEDULE_SECS: [u64; 11] = [
    1, 4, 16, 64, 256, 1024, 4096, 16384, 65536, 262144, 604800,
];

const JITTER_MIN: f64 = 0.75;
const JITTER_MAX: f64 = 1.25;

/// Delay before the retry following `n_retries` prior failures, with ±25%
/// uniform jitter and a floor of one second. Network failures stop climbing
/// the schedule at 256 s.
pub fn retry_delay(category: ErrorCategory, n_retries: u32) -> Duration {
    let mut rng = rand::thread_rng();
    retry_delay_with_rng(category, n_retries, &mut rng)
}

pub fn retry_delay_with_rng<R: Rng + ?Sized>(
    category: ErrorCategory,
    n_retries: u32,
    rng: &mut R,
) -> Duration {
    let cap = match category {
        ErrorCategory::Network => NETWORK_DELAY_INDEX_CAP,
        ErrorCategory::ReuploadNeeded | ErrorCategory::Other => RETRY_SCHEDULE_SECS.len() - 1,
    };
    let index = (n_retries as usize).min(cap);
    let base = RETRY_SCHEDULE_SECS[index] as f64;
    let jittered = base * rng.gen_range(JITTER_MIN..=JITTER_MAX);
    Duration::from_secs_f64(jittered.max(1.0))
}
