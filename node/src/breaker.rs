use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sysinfo::{System, SystemExt};

/// Admission guard consulted before a task is accepted.
///
/// The runners only read breaker state; whatever trips or resets a breaker
/// lives outside of them (see `monitor`).
pub trait CircuitBreaker: Send + Sync {
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;
}

pub const MEMORY_BREAKER: &str = "memory";

/// Trips when used memory reaches `threshold_percent` of total memory.
#[derive(Debug)]
pub struct MemoryCircuitBreaker {
    threshold_percent: u64,
    // used memory in tenths of a percent, last reading
    used_permille: AtomicU64,
}

impl MemoryCircuitBreaker {
    pub fn new(threshold_percent: u8) -> Self {
        Self {
            threshold_percent: threshold_percent.min(100) as u64,
            used_permille: AtomicU64::new(0),
        }
    }

    pub fn record_usage(&self, used: u64, total: u64) {
        if total == 0 {
            return;
        }
        let permille = used.saturating_mul(1000) / total;
        self.used_permille.store(permille, Ordering::Relaxed);
    }

    /// Takes a fresh memory reading from the OS.
    pub fn refresh(&self, sys: &mut System) {
        sys.refresh_memory();
        self.record_usage(sys.used_memory(), sys.total_memory());
    }

    pub fn used_percent(&self) -> f64 {
        self.used_permille.load(Ordering::Relaxed) as f64 / 10.0
    }
}

impl CircuitBreaker for MemoryCircuitBreaker {
    fn name(&self) -> &str {
        MEMORY_BREAKER
    }

    fn is_open(&self) -> bool {
        self.used_permille.load(Ordering::Relaxed) >= self.threshold_percent * 10
    }
}

/// All breakers of a node.
#[derive(Clone, Default)]
pub struct CircuitBreakerService {
    breakers: Vec<Arc<dyn CircuitBreaker>>,
}

impl CircuitBreakerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_breaker(mut self, breaker: Arc<dyn CircuitBreaker>) -> Self {
        self.breakers.push(breaker);
        self
    }

    /// Name of the first open breaker, if any.
    pub fn check_open(&self) -> Option<String> {
        self.breakers
            .iter()
            .find(|b| b.is_open())
            .map(|b| b.name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_breaker_trips_at_threshold() {
        let breaker = MemoryCircuitBreaker::new(85);
        breaker.record_usage(84, 100);
        assert!(!breaker.is_open());

        breaker.record_usage(85, 100);
        assert!(breaker.is_open());
        assert_eq!(breaker.used_percent(), 85.0);

        breaker.record_usage(10, 100);
        assert!(!breaker.is_open());
    }

    #[test]
    fn zero_total_keeps_last_reading() {
        let breaker = MemoryCircuitBreaker::new(50);
        breaker.record_usage(90, 100);
        breaker.record_usage(0, 0);
        assert!(breaker.is_open());
    }

    #[test]
    fn service_reports_first_open_breaker() {
        let low = Arc::new(MemoryCircuitBreaker::new(90));
        let service = CircuitBreakerService::new().with_breaker(low.clone());
        assert_eq!(service.check_open(), None);

        low.record_usage(95, 100);
        assert_eq!(service.check_open().as_deref(), Some(MEMORY_BREAKER));
    }
}
