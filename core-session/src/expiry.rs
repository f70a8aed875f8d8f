//! Expiry evaluation
//!
//! Decides whether an access token is close enough to its `exp` to be
//! refreshed. Anything that cannot be decoded counts as stale.

use crate::claims::Claims;
use bridge_traits::time::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Refresh when less than this much lifetime remains.
pub const DEFAULT_LEAD_TIME: Duration = core_runtime::config::DEFAULT_REFRESH_LEAD_TIME;

/// Pure staleness check against an explicit `now` (Unix seconds).
///
/// True when `exp - now < lead_time` or when the token cannot be decoded.
///
/// ```
/// use core_session::expiry::is_stale_at;
/// use std::time::Duration;
///
/// assert!(is_stale_at("garbage", Duration::from_secs(300), 0));
/// ```
pub fn is_stale_at(token: &str, lead_time: Duration, now: i64) -> bool {
    match Claims::decode(token) {
        Ok(claims) => remaining(&claims, now) < lead_secs(lead_time),
        Err(e) => {
            debug!(error = %e, "Treating undecodable token as stale");
            true
        }
    }
}

fn remaining(claims: &Claims, now: i64) -> i64 {
    claims.expires_at.saturating_sub(now)
}

fn lead_secs(lead_time: Duration) -> i64 {
    i64::try_from(lead_time.as_secs()).unwrap_or(i64::MAX)
}

/// [`is_stale_at`] bound to a clock and lead time.
#[derive(Clone)]
pub struct ExpiryEvaluator {
    lead_time: Duration,
    clock: Arc<dyn Clock>,
}

impl ExpiryEvaluator {
    pub fn new(lead_time: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { lead_time, clock }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    pub fn is_stale(&self, token: &str) -> bool {
        is_stale_at(token, self.lead_time, self.clock.unix_timestamp())
    }

    /// Time left before the token enters its refresh window.
    ///
    /// `None` when the token is already stale or cannot be decoded.
    pub fn time_until_refresh(&self, token: &str) -> Option<Duration> {
        let claims = Claims::decode(token).ok()?;
        let margin = remaining(&claims, self.clock.unix_timestamp()) - lead_secs(self.lead_time);
        u64::try_from(margin)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for ExpiryEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_LEAD_TIME, Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for ExpiryEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryEvaluator")
            .field("lead_time", &self.lead_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::tests::encode_jwt;
    use bridge_traits::time::ManualClock;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;
    const LEAD: Duration = Duration::from_secs(300);

    fn token_expiring_in(secs: i64) -> String {
        encode_jwt(&json!({ "exp": NOW + secs, "roles": ["HR"] }))
    }

    #[test]
    fn test_fresh_token_is_not_stale() {
        assert!(!is_stale_at(&token_expiring_in(3600), LEAD, NOW));
        assert!(!is_stale_at(&token_expiring_in(301), LEAD, NOW));
    }

    #[test]
    fn test_boundary_is_not_stale() {
        // exactly lead time left: exp - now == lead, not less
        assert!(!is_stale_at(&token_expiring_in(300), LEAD, NOW));
        assert!(is_stale_at(&token_expiring_in(299), LEAD, NOW));
    }

    #[test]
    fn test_expired_token_is_stale() {
        assert!(is_stale_at(&token_expiring_in(240), LEAD, NOW));
        assert!(is_stale_at(&token_expiring_in(0), LEAD, NOW));
        assert!(is_stale_at(&token_expiring_in(-600), LEAD, NOW));
    }

    #[test]
    fn test_malformed_tokens_are_stale() {
        for token in ["", "abc", "a.b.c", "a.b"] {
            assert!(is_stale_at(token, LEAD, NOW), "{token:?}");
        }
        let no_exp = encode_jwt(&json!({ "roles": ["HR"] }));
        assert!(is_stale_at(&no_exp, LEAD, NOW));
    }

    #[test]
    fn test_evaluator_follows_clock() {
        let clock = Arc::new(ManualClock::at_unix(NOW));
        let evaluator = ExpiryEvaluator::new(LEAD, clock.clone());
        let token = token_expiring_in(600);

        assert!(!evaluator.is_stale(&token));
        assert_eq!(
            evaluator.time_until_refresh(&token),
            Some(Duration::from_secs(300))
        );

        clock.advance(chrono::Duration::seconds(301));
        assert!(evaluator.is_stale(&token));
        assert_eq!(evaluator.time_until_refresh(&token), None);
        assert_eq!(evaluator.time_until_refresh("garbage"), None);
    }

    #[test]
    fn test_default_lead_time() {
        assert_eq!(ExpiryEvaluator::default().lead_time(), Duration::from_secs(300));
    }
}
