//! Backend-selection policies.
//!
//! Translated from `multirpc.py`'s `LoadBalancingTransport._next_backend`:
//! the original cycled through a sorted set of backends with a module-level
//! call counter. Here that becomes a trait so alternate policies can be
//! swapped in, with the original's cyclic behavior preserved as
//! [`RoundRobin`].

use std::collections::VecDeque;
use std::time::Duration;

use rand::seq::SliceRandom;

use super::Backend;

/// Chooses the next backend to send a request to, given the current set.
/// Implementations only read `backends`; `Connection` applies the result.
pub trait BackendPolicy: Send + Sync {
    fn select<'a>(&mut self, backends: &'a [Backend]) -> Option<&'a Backend>;
}

/// Cycles through backends in a fixed order, wrapping around. Mirrors the
/// original's `_call_number %= len(self._backends)` advance-then-wrap.
pub struct RoundRobin {
    order: VecDeque<usize>,
}

impl RoundRobin {
    pub fn new(backend_count: usize) -> Self {
        RoundRobin {
            order: (0..backend_count).collect(),
        }
    }
}

impl BackendPolicy for RoundRobin {
    fn select<'a>(&mut self, backends: &'a [Backend]) -> Option<&'a Backend> {
        if backends.is_empty() {
            return None;
        }
        if self.order.len() != backends.len() {
            self.order = (0..backends.len()).collect();
        }
        let index = self.order.pop_front()?;
        self.order.push_back(index);
        backends.get(index)
    }
}

/// Picks a uniformly random backend each call.
#[derive(Default)]
pub struct Random;

impl BackendPolicy for Random {
    fn select<'a>(&mut self, backends: &'a [Backend]) -> Option<&'a Backend> {
        backends.choose(&mut rand::thread_rng())
    }
}

/// Picks the backend with the lowest last-observed round-trip time. While
/// any backend has no recorded RTT yet, picks randomly among all of them
/// rather than letting an unmeasured backend look artificially fast.
#[derive(Default)]
pub struct LowestLatency {
    random: Random,
}

impl BackendPolicy for LowestLatency {
    fn select<'a>(&mut self, backends: &'a [Backend]) -> Option<&'a Backend> {
        if backends.iter().any(|b| b.last_rtt.is_none()) {
            return self.random.select(backends);
        }
        backends.iter().min_by_key(|b| b.last_rtt.unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends(n: usize) -> Vec<Backend> {
        (0..n).map(|i| Backend::new(format!("host{i}"), "/JSONRPC2")).collect()
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let backends = backends(3);
        let mut policy = RoundRobin::new(3);
        let picks: Vec<&str> = (0..6)
            .map(|_| policy.select(&backends).unwrap().address.as_str())
            .collect();
        assert_eq!(picks, vec!["host0", "host1", "host2", "host0", "host1", "host2"]);
    }

    #[test]
    fn random_always_picks_from_the_set() {
        let backends = backends(4);
        let mut policy = Random;
        for _ in 0..20 {
            let pick = policy.select(&backends).unwrap();
            assert!(backends.iter().any(|b| b.address == pick.address));
        }
    }

    #[test]
    fn lowest_latency_prefers_the_fastest_measured_backend() {
        let mut backends = backends(3);
        backends[0].last_rtt = Some(Duration::from_millis(50));
        backends[1].last_rtt = Some(Duration::from_millis(5));
        backends[2].last_rtt = Some(Duration::from_millis(30));
        let mut policy = LowestLatency::default();
        let pick = policy.select(&backends).unwrap();
        assert_eq!(pick.address, "host1");
    }

    #[test]
    fn lowest_latency_picks_randomly_while_any_backend_is_unmeasured() {
        let mut backends = backends(3);
        backends[0].last_rtt = Some(Duration::from_millis(50));
        // backends[1] and backends[2] have no RTT recorded yet.
        let mut policy = LowestLatency::default();
        for _ in 0..20 {
            let pick = policy.select(&backends).unwrap();
            assert!(backends.iter().any(|b| b.address == pick.address));
        }
    }

    #[test]
    fn empty_backend_set_selects_nothing() {
        let backends: Vec<Backend> = Vec::new();
        assert!(RoundRobin::new(0).select(&backends).is_none());
    }
}
