// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost-core - Submission rate limiter
//!
//! At most [`MAX_SAVE_ATTEMPTS`] credential submissions per
//! [`RATE_LIMIT_WINDOW_MS`].  Runs before any other submission check.  A
//! rejected attempt does not move the window, so the limiter opens again
//! once the window has elapsed since the last accepted attempt.

/// Length of the rate-limit window.
pub const RATE_LIMIT_WINDOW_MS: u64 = 60_000;

/// Attempts allowed within one window.
pub const MAX_SAVE_ATTEMPTS: u8 = 5;

/// Marker error: the attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited;

#[derive(Debug)]
pub struct RateLimiter {
    last_attempt_ms: Option<u64>,
    attempts: u8,
}

impl RateLimiter {
    pub const fn new() -> Self {
        Self {
            last_attempt_ms: None,
            attempts: 0,
        }
    }

    /// Registers a submission attempt at `now_ms` (a monotonic
    /// milliseconds reading).  `Err(RateLimited)` means the caller must
    /// reject the request without evaluating it further.
    pub fn register_attempt(&mut self, now_ms: u64) -> Result<(), RateLimited> {
        match self.last_attempt_ms {
            Some(last) if now_ms.saturating_sub(last) < RATE_LIMIT_WINDOW_MS => {
                self.attempts = self.attempts.saturating_add(1);
                if self.attempts > MAX_SAVE_ATTEMPTS {
                    return Err(RateLimited);
                }
            }
            _ => self.attempts = 1,
        }
        self.last_attempt_ms = Some(now_ms);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_attempt_in_window_rejected() {
        let mut limiter = RateLimiter::new();
        for i in 0..MAX_SAVE_ATTEMPTS {
            assert_eq!(limiter.register_attempt(1_000 + u64::from(i)), Ok(()));
        }
        assert_eq!(limiter.register_attempt(1_010), Err(RateLimited));
    }

    #[test]
    fn window_resets_after_inactivity() {
        let mut limiter = RateLimiter::new();
        for i in 0..=MAX_SAVE_ATTEMPTS {
            let _ = limiter.register_attempt(1_000 + u64::from(i));
        }
        assert_eq!(limiter.register_attempt(1_020), Err(RateLimited));

        // A full window after the last accepted attempt, the limiter opens.
        let last_accepted = 1_000 + u64::from(MAX_SAVE_ATTEMPTS) - 1;
        assert_eq!(
            limiter.register_attempt(last_accepted + RATE_LIMIT_WINDOW_MS),
            Ok(())
        );
    }

    #[test]
    fn rejected_attempts_do_not_extend_the_window() {
        let mut limiter = RateLimiter::new();
        for i in 0..MAX_SAVE_ATTEMPTS {
            let _ = limiter.register_attempt(u64::from(i));
        }
        // Hammering while limited...
        for t in 10..50 {
            assert_eq!(limiter.register_attempt(t), Err(RateLimited));
        }
        // ...does not push the reopening time out.
        let last_accepted = u64::from(MAX_SAVE_ATTEMPTS) - 1;
        assert_eq!(
            limiter.register_attempt(last_accepted + RATE_LIMIT_WINDOW_MS),
            Ok(())
        );
    }

    #[test]
    fn spaced_attempts_never_limited() {
        let mut limiter = RateLimiter::new();
        for i in 0..20u64 {
            assert_eq!(limiter.register_attempt(i * RATE_LIMIT_WINDOW_MS), Ok(()));
        }
    }
}
