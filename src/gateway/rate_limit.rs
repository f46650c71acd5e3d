use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use axum::http::Method;
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Route classes with distinct per-minute budgets. Money movement is
/// throttled far harder than reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Reversal,
    Withdrawal,
    MoneyMovement,
    General,
}

impl RouteClass {
    pub fn classify(method: &Method, path: &str) -> RouteClass {
        if *method != Method::POST || !path.starts_with("/api/v1/transactions") {
            return RouteClass::General;
        }
        if path.ends_with("/reverse") {
            RouteClass::Reversal
        } else if path.ends_with("/withdrawal") {
            RouteClass::Withdrawal
        } else {
            RouteClass::MoneyMovement
        }
    }

    pub fn max_per_minute(self) -> usize {
        match self {
            RouteClass::Reversal => 3,
            RouteClass::Withdrawal => 5,
            RouteClass::MoneyMovement => 10,
            RouteClass::General => 100,
        }
    }
}

/// Sliding-window limiter keyed by (caller, route class).
pub struct RateLimiter {
    requests: Mutex<HashMap<(String, RouteClass), VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Ok if allowed; Err carries seconds until the next free slot.
    pub async fn check(&self, caller: &str, class: RouteClass) -> Result<(), u64> {
        let mut map = self.requests.lock().await;
        let now = Instant::now();
        let entry = map.entry((caller.to_string(), class)).or_default();

        while entry.front().is_some_and(|t| now.duration_since(*t) > WINDOW) {
            entry.pop_front();
        }

        if entry.len() >= class.max_per_minute() {
            let oldest = entry.front().copied().unwrap_or(now);
            let retry_after = WINDOW
                .as_secs()
                .saturating_sub(now.duration_since(oldest).as_secs());
            return Err(retry_after.max(1));
        }

        entry.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn classes_have_independent_budgets() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("ip", RouteClass::Reversal).await.is_ok());
        }
        assert!(limiter.check("ip", RouteClass::Reversal).await.is_err());
        // A different class is untouched.
        assert!(limiter.check("ip", RouteClass::General).await.is_ok());
        // As is another caller.
        assert!(limiter.check("other", RouteClass::Reversal).await.is_ok());
    }

    #[test]
    fn classify_splits_money_routes() {
        assert_eq!(
            RouteClass::classify(&Method::POST, "/api/v1/transactions/transfer"),
            RouteClass::MoneyMovement
        );
        assert_eq!(
            RouteClass::classify(&Method::POST, "/api/v1/transactions/withdrawal"),
            RouteClass::Withdrawal
        );
        assert_eq!(
            RouteClass::classify(&Method::POST, "/api/v1/transactions/abc123/reverse"),
            RouteClass::Reversal
        );
        assert_eq!(
            RouteClass::classify(&Method::GET, "/api/v1/wallets"),
            RouteClass::General
        );
    }
}
