use std::collections::HashMap;

/// Round trips a cold DNS lookup is assumed to cost.
pub const DNS_RESOLUTION_RTT_MULTIPLIER: f64 = 2.0;

/// Per-run record of when each host name finishes resolving.
#[derive(Debug, Clone)]
pub struct DnsCache {
    rtt: f64,
    resolved_at: HashMap<String, f64>,
}

impl DnsCache {
    pub fn new(rtt: f64) -> Self {
        Self {
            rtt,
            resolved_at: HashMap::new(),
        }
    }

    /// Time a request issued at `requested_at` waits for `host` to resolve.
    /// A host already resolved (or resolving) only costs the remainder.
    pub fn time_until_resolution(&mut self, host: &str, requested_at: f64, update_cache: bool) -> f64 {
        let mut time_until_resolved = self.rtt * DNS_RESOLUTION_RTT_MULTIPLIER;
        if let Some(&resolved_at) = self.resolved_at.get(host) {
            let time_until_cached_is_resolved = (resolved_at - requested_at).max(0.0);
            time_until_resolved = time_until_resolved.min(time_until_cached_is_resolved);
        }

        if update_cache {
            let resolved_at = requested_at + time_until_resolved;
            self.resolved_at
                .entry(host.to_string())
                .and_modify(|existing| *existing = existing.min(resolved_at))
                .or_insert(resolved_at);
        }

        time_until_resolved
    }

    pub fn is_resolved(&self, host: &str, at: f64) -> bool {
        self.resolved_at.get(host).is_some_and(|&resolved| resolved <= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_lookup_costs_two_round_trips() {
        let mut dns = DnsCache::new(100.0);
        assert_eq!(dns.time_until_resolution("example.com", 0.0, true), 200.0);
    }

    #[test]
    fn test_resolved_host_is_free() {
        let mut dns = DnsCache::new(100.0);
        dns.time_until_resolution("example.com", 0.0, true);
        assert_eq!(dns.time_until_resolution("example.com", 500.0, true), 0.0);
        assert!(dns.is_resolved("example.com", 200.0));
    }

    #[test]
    fn test_in_flight_lookup_costs_remainder() {
        let mut dns = DnsCache::new(100.0);
        dns.time_until_resolution("example.com", 0.0, true);
        assert_eq!(dns.time_until_resolution("example.com", 50.0, false), 150.0);
    }

    #[test]
    fn test_lookup_without_update_leaves_cache_cold() {
        let mut dns = DnsCache::new(100.0);
        dns.time_until_resolution("example.com", 0.0, false);
        assert_eq!(dns.time_until_resolution("example.com", 300.0, false), 200.0);
        assert!(!dns.is_resolved("example.com", 300.0));
    }

    #[test]
    fn test_hosts_resolve_independently() {
        let mut dns = DnsCache::new(100.0);
        dns.time_until_resolution("a.example.com", 0.0, true);
        assert_eq!(dns.time_until_resolution("b.example.com", 0.0, true), 200.0);
    }
}
