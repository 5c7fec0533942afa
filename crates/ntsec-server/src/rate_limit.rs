// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Per-client request rate limiting.
//!
//! Clients are keyed by IP address, not by port (RFC 9109). A client that
//! exceeds its budget is answered with a `RATE` Kiss-o'-Death.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Configuration for per-client rate limiting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed per window from a single client IP.
    pub max_requests_per_window: u32,
    /// Duration of the rate limit window.
    pub window_duration: Duration,
    /// Minimum interval between successive requests from the same client.
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_requests_per_window: 20,
            window_duration: Duration::from_secs(60),
            min_interval: Duration::from_secs(2),
        }
    }
}

/// Result of a rate limit check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateLimitResult {
    /// Request is within limits.
    Allow,
    /// Request exceeds the limit; answer with KoD RATE.
    RateExceeded,
}

/// Rate limiting state for one client address.
#[derive(Clone, Debug)]
pub struct ClientState {
    /// Time of the last request that was allowed, if any.
    last_request_time: Option<Instant>,
    /// Time of the last request seen, allowed or not.
    last_seen: Instant,
    /// Requests counted in the current window.
    request_count: u32,
    /// Start of the current window.
    window_start: Instant,
}

impl ClientState {
    /// A client first seen at `now`.
    pub fn new(now: Instant) -> Self {
        ClientState {
            last_request_time: None,
            last_seen: now,
            request_count: 0,
            window_start: now,
        }
    }
}

/// Bounded client state table keyed by IP address.
#[derive(Debug)]
pub struct ClientTable {
    entries: HashMap<IpAddr, ClientState>,
    max_entries: usize,
    /// How long an idle entry is kept before it may be evicted.
    stale_threshold: Duration,
}

impl ClientTable {
    /// Create a table tracking at most `max_entries` clients.
    pub fn new(max_entries: usize) -> Self {
        ClientTable {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            stale_threshold: Duration::from_secs(24 * 3600),
        }
    }

    /// Get or create the entry for `ip`, evicting if the table is full.
    pub fn get_or_insert(&mut self, ip: IpAddr, now: Instant) -> &mut ClientState {
        if !self.entries.contains_key(&ip) && self.entries.len() >= self.max_entries {
            self.evict_stale(now);
        }
        self.entries
            .entry(ip)
            .or_insert_with(|| ClientState::new(now))
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_stale(&mut self, now: Instant) {
        let threshold = self.stale_threshold;
        self.entries
            .retain(|_, state| now.saturating_duration_since(state.last_seen) < threshold);

        // Still full: drop the least recently seen client.
        if self.entries.len() >= self.max_entries
            && let Some(oldest_ip) = self
                .entries
                .iter()
                .min_by_key(|(_, state)| state.last_seen)
                .map(|(ip, _)| *ip)
        {
            self.entries.remove(&oldest_ip);
        }
    }

    /// Record a request from `ip` and check it against `config`.
    pub fn check(&mut self, ip: IpAddr, now: Instant, config: &RateLimitConfig) -> RateLimitResult {
        check_rate_limit(self.get_or_insert(ip, now), now, config)
    }
}

/// Check the rate limit for one client.
pub fn check_rate_limit(
    client: &mut ClientState,
    now: Instant,
    config: &RateLimitConfig,
) -> RateLimitResult {
    client.last_seen = now;

    if let Some(last) = client.last_request_time
        && now.saturating_duration_since(last) < config.min_interval
    {
        return RateLimitResult::RateExceeded;
    }

    if now.saturating_duration_since(client.window_start) > config.window_duration {
        client.window_start = now;
        client.request_count = 0;
    }

    client.request_count += 1;
    if client.request_count > config.max_requests_per_window {
        return RateLimitResult::RateExceeded;
    }

    client.last_request_time = Some(now);
    RateLimitResult::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_allows_first_request() {
        let now = Instant::now();
        let mut client = ClientState::new(now);
        let config = RateLimitConfig::default();
        assert_eq!(
            check_rate_limit(&mut client, now, &config),
            RateLimitResult::Allow
        );
    }

    #[test]
    fn test_rate_limit_min_interval() {
        let now = Instant::now();
        let mut client = ClientState::new(now);
        let config = RateLimitConfig {
            min_interval: Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(
            check_rate_limit(&mut client, now, &config),
            RateLimitResult::Allow
        );
        let result = check_rate_limit(&mut client, now + Duration::from_secs(1), &config);
        assert_eq!(result, RateLimitResult::RateExceeded);
        let result = check_rate_limit(&mut client, now + Duration::from_secs(3), &config);
        assert_eq!(result, RateLimitResult::Allow);
    }

    #[test]
    fn test_rate_limit_window_exceeded() {
        let now = Instant::now();
        let mut client = ClientState::new(now);
        let config = RateLimitConfig {
            max_requests_per_window: 2,
            window_duration: Duration::from_secs(60),
            min_interval: Duration::from_millis(1),
        };
        let t1 = now;
        let t2 = now + Duration::from_millis(100);
        let t3 = now + Duration::from_millis(200);

        assert_eq!(check_rate_limit(&mut client, t1, &config), RateLimitResult::Allow);
        assert_eq!(check_rate_limit(&mut client, t2, &config), RateLimitResult::Allow);
        assert_eq!(
            check_rate_limit(&mut client, t3, &config),
            RateLimitResult::RateExceeded
        );
    }

    #[test]
    fn test_rate_limit_window_reset() {
        let now = Instant::now();
        let mut client = ClientState::new(now);
        let config = RateLimitConfig {
            max_requests_per_window: 1,
            window_duration: Duration::from_secs(1),
            min_interval: Duration::from_millis(1),
        };

        let t1 = now;
        let t2 = now + Duration::from_millis(100);
        let t3 = now + Duration::from_secs(2);

        assert_eq!(check_rate_limit(&mut client, t1, &config), RateLimitResult::Allow);
        assert_eq!(
            check_rate_limit(&mut client, t2, &config),
            RateLimitResult::RateExceeded
        );
        assert_eq!(check_rate_limit(&mut client, t3, &config), RateLimitResult::Allow);
    }

    #[test]
    fn test_table_tracks_by_ip() {
        let mut table = ClientTable::new(100);
        let now = Instant::now();
        let config = RateLimitConfig::default();
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "192.0.2.2".parse().unwrap();

        assert_eq!(table.check(a, now, &config), RateLimitResult::Allow);
        assert_eq!(table.check(b, now, &config), RateLimitResult::Allow);
        assert_eq!(table.check(a, now, &config), RateLimitResult::RateExceeded);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_table_evicts_oldest_when_full() {
        let mut table = ClientTable::new(2);
        let now = Instant::now();
        let ips: Vec<IpAddr> = ["192.0.2.1", "192.0.2.2", "192.0.2.3"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        table.get_or_insert(ips[0], now);
        table.get_or_insert(ips[1], now + Duration::from_secs(1));
        table.get_or_insert(ips[2], now + Duration::from_secs(2));
        assert_eq!(table.len(), 2);
        assert!(!table.entries.contains_key(&ips[0]));
        assert!(table.entries.contains_key(&ips[2]));
    }
}
