//! Loading a key/value source with bounded retries.

use crate::error::{ControlError, Result};
use crate::log_sink::LogSink;
use crate::sources::KeyValueSource;
use std::sync::Arc;
use std::time::Duration;

/// How often and how far apart a failing load is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy; at least one attempt is always made.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Load `source`, retrying per `policy`.
///
/// Each failed attempt is reported at warn level. The blocking read runs on
/// the blocking pool so the retry sleep never stalls other tasks.
///
/// # Errors
///
/// Returns [`ControlError::MalformedDocument`] once every attempt has failed.
/// Nothing is logged at error level here; the caller decides how to report it.
pub(crate) async fn load_with_retry(
    source: &Arc<dyn KeyValueSource>,
    policy: RetryPolicy,
    sink: &dyn LogSink,
) -> Result<Vec<(String, String)>> {
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=attempts {
        let worker = Arc::clone(source);
        let loaded = tokio::task::spawn_blocking(move || worker.load())
            .await
            .unwrap_or_else(|e| Err(ControlError::Load(format!("load task failed: {}", e))));

        match loaded {
            Ok(entries) => return Ok(entries),
            Err(e) => {
                sink.warn(
                    &format!(
                        "loading {} failed (attempt {}/{})",
                        source.locator(),
                        attempt,
                        attempts
                    ),
                    Some(&e),
                );
                last = e.to_string();
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(ControlError::MalformedDocument { attempts, last })
}
