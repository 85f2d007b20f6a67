//! Rate limiter for authentication attempts
//!
//! Two sliding windows guard the login surface:
//! - failed logins per email (5 per 15 minutes by default)
//! - requests per client IP (20 per minute by default)
//!
//! State is in-process only; a restart forgets every window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How many events are allowed inside a sliding window
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_attempts: usize,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self { max_attempts, window }
    }

    /// Seconds until the oldest event in `times` leaves the window, if the window is full
    fn retry_after(&self, times: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<i64> {
        if times.len() < self.max_attempts {
            return None;
        }
        let oldest = times.iter().min()?;
        Some((*oldest + self.window - now).num_seconds().max(1))
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    email_policy: RateLimitPolicy,
    ip_policy: RateLimitPolicy,
    /// Failed login attempts by normalized email
    email_attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    /// Requests by client IP
    ip_attempts: Arc<RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>>,
}

impl LoginRateLimiter {
    /// Create a limiter with the default policies
    pub fn new() -> Self {
        Self::with_policies(
            RateLimitPolicy::new(5, Duration::minutes(15)),
            RateLimitPolicy::new(20, Duration::minutes(1)),
        )
    }

    pub fn with_policies(email_policy: RateLimitPolicy, ip_policy: RateLimitPolicy) -> Self {
        Self {
            email_policy,
            ip_policy,
            email_attempts: Arc::new(RwLock::new(HashMap::new())),
            ip_attempts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// `Some(retry_after_secs)` if this email has too many recent failures
    pub async fn check_email(&self, email: &str) -> Option<i64> {
        let mut attempts = self.email_attempts.write().await;
        let now = Utc::now();
        let cutoff = now - self.email_policy.window;

        let times = attempts.entry(email.trim().to_lowercase()).or_default();
        times.retain(|time| *time > cutoff);

        self.email_policy.retry_after(times, now)
    }

    /// Record a failed login attempt for email
    pub async fn record_failed_attempt(&self, email: &str) {
        let mut attempts = self.email_attempts.write().await;
        attempts
            .entry(email.trim().to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    /// Clear failed attempts for email (on successful login)
    pub async fn clear_email_attempts(&self, email: &str) {
        let mut attempts = self.email_attempts.write().await;
        attempts.remove(&email.trim().to_lowercase());
    }

    /// `Some(retry_after_secs)` if this IP is over its request budget.
    /// Otherwise the request is counted.
    pub async fn check_ip(&self, ip: IpAddr) -> Option<i64> {
        let mut attempts = self.ip_attempts.write().await;
        let now = Utc::now();
        let cutoff = now - self.ip_policy.window;

        let times = attempts.entry(ip).or_default();
        times.retain(|time| *time > cutoff);

        if let Some(retry_after) = self.ip_policy.retry_after(times, now) {
            return Some(retry_after);
        }
        times.push(now);
        None
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let email_cutoff = now - self.email_policy.window;
        let ip_cutoff = now - self.ip_policy.window;

        {
            let mut attempts = self.email_attempts.write().await;
            attempts.retain(|_, times| {
                times.retain(|time| *time > email_cutoff);
                !times.is_empty()
            });
        }

        {
            let mut attempts = self.ip_attempts.write().await;
            attempts.retain(|_, times| {
                times.retain(|time| *time > ip_cutoff);
                !times.is_empty()
            });
        }
    }

    /// Number of tracked keys (emails + IPs)
    pub async fn tracked_keys(&self) -> usize {
        self.email_attempts.read().await.len() + self.ip_attempts.read().await.len()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
