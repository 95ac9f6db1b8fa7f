use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const ML_EXECUTING_TASK_COUNT: &str = "ml_executing_task_count";
pub const ML_TOTAL_REQUEST_COUNT: &str = "ml_total_request_count";
pub const ML_TOTAL_FAILURE_COUNT: &str = "ml_total_failure_count";
pub const ML_TOTAL_MODEL_COUNT: &str = "ml_total_model_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    Train,
    Predict,
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionName::Train => f.write_str("train"),
            ActionName::Predict => f.write_str("predict"),
        }
    }
}

/// `ml_<function>_<action>_request_count`
pub fn request_count_stat(function_name: &str, action: ActionName) -> String {
    format!("ml_{}_{}_request_count", function_name, action)
}

/// `ml_<function>_<action>_failure_count`
pub fn failure_count_stat(function_name: &str, action: ActionName) -> String {
    format!("ml_{}_{}_failure_count", function_name, action)
}

/// Atomic counter. `decrement` saturates at zero.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Process-wide named counters.
///
/// The global counters exist from construction; per-(function, action)
/// counters are created on first use. Counters are never removed, so a handle
/// obtained once stays valid for the life of the process.
#[derive(Debug)]
pub struct MlStats {
    counters: Mutex<HashMap<String, Arc<Counter>>>,
}

impl MlStats {
    pub fn new() -> Self {
        let mut counters = HashMap::new();
        for name in [
            ML_EXECUTING_TASK_COUNT,
            ML_TOTAL_REQUEST_COUNT,
            ML_TOTAL_FAILURE_COUNT,
            ML_TOTAL_MODEL_COUNT,
        ] {
            counters.insert(name.to_string(), Arc::new(Counter::default()));
        }
        Self {
            counters: Mutex::new(counters),
        }
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, Arc<Counter>>> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_stat(&self, name: &str) -> Option<Arc<Counter>> {
        self.counters().get(name).cloned()
    }

    pub fn create_counter_stat_if_absent(&self, key: &str) -> Arc<Counter> {
        self.counters()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Counter::default()))
            .clone()
    }

    /// Current value, 0 for a counter nobody has touched yet.
    pub fn value(&self, name: &str) -> u64 {
        self.get_stat(name).map(|c| c.value()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters()
            .iter()
            .map(|(name, counter)| (name.clone(), counter.value()))
            .collect()
    }
}

impl Default for MlStats {
    fn default() -> Self {
        Self::new()
    }
}
