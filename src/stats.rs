//! Retry statistics.
//!
//! Every retry-driver pass records one outcome per logical operation:
//! success after N tries, budget exhausted, or fatal. Counters are kept per
//! [`OperationClass`] behind a single registry-wide mutex; every critical
//! section is one increment or one settings write, so contention is not a
//! concern. Reports are best-effort snapshots.
//!
//! The per-class `max_tries` setting also lives here, along with the highest
//! and lowest values it has been set to, so a report can say what budget the
//! counters were collected under.

use crate::error::DdcError;
use crate::retry::{MAX_MAX_TRIES, OperationClass};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, OnceLock};

const DEFAULT_MAX_TRIES: u8 = 4;

#[derive(Debug, Clone)]
struct ClassStats {
    max_tries: u8,
    highest_max_tries: u8,
    lowest_max_tries: u8,
    fatal: u64,
    exceeded: u64,
    by_tries: [u64; MAX_MAX_TRIES],
}

impl ClassStats {
    fn new() -> ClassStats {
        ClassStats {
            max_tries: DEFAULT_MAX_TRIES,
            highest_max_tries: DEFAULT_MAX_TRIES,
            lowest_max_tries: DEFAULT_MAX_TRIES,
            fatal: 0,
            exceeded: 0,
            by_tries: [0; MAX_MAX_TRIES],
        }
    }

    fn reset_counters(&mut self) {
        self.fatal = 0;
        self.exceeded = 0;
        self.by_tries = [0; MAX_MAX_TRIES];
    }
}

/// Process- or instance-scoped retry counters.
///
/// [`StatsRegistry::global`] is shared by every handle opened through
/// `DdcHandle::open`; embedders that want isolation construct their own with
/// [`StatsRegistry::new`] and pass it to `DdcHandle::with_transport`.
///
/// # Example
///
/// ```
/// use ddci::{OperationClass, StatsRegistry};
///
/// let stats = StatsRegistry::new();
/// stats.set_max_tries(OperationClass::WriteRead, 8).unwrap();
/// assert_eq!(stats.get_max_tries(OperationClass::WriteRead), 8);
/// assert_eq!(stats.snapshot(OperationClass::WriteRead).total_operations(), 0);
/// println!("{}", stats.report(OperationClass::WriteRead, 0));
/// ```
#[derive(Debug)]
pub struct StatsRegistry {
    classes: Mutex<[ClassStats; OperationClass::COUNT]>,
}

impl Default for StatsRegistry {
    fn default() -> StatsRegistry {
        StatsRegistry::new()
    }
}

/// A copy of one class's counters at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClassSnapshot {
    pub class: OperationClass,
    pub max_tries: u8,
    pub highest_max_tries: u8,
    pub lowest_max_tries: u8,
    pub fatal_failures: u64,
    pub retries_exceeded: u64,
    /// `successes_by_tries[n]` counts operations that succeeded after
    /// `n + 1` tries.
    pub successes_by_tries: Vec<u64>,
}

impl ClassSnapshot {
    pub fn total_operations(&self) -> u64 {
        self.fatal_failures
            + self.retries_exceeded
            + self.successes_by_tries.iter().sum::<u64>()
    }
}

impl StatsRegistry {
    pub fn new() -> StatsRegistry {
        StatsRegistry {
            classes: Mutex::new(std::array::from_fn(|_| ClassStats::new())),
        }
    }

    /// The process-wide registry, shared by every handle opened through
    /// `DdcHandle::open`.
    pub fn global() -> Arc<StatsRegistry> {
        static GLOBAL: OnceLock<Arc<StatsRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(StatsRegistry::new())))
    }

    /// Set the retry budget for `class`. Values outside `1..=15` are
    /// rejected.
    pub fn set_max_tries(&self, class: OperationClass, max_tries: u8) -> Result<(), DdcError> {
        if max_tries < 1 || max_tries as usize > MAX_MAX_TRIES {
            return Err(DdcError::InvalidData("max_tries out of range"));
        }
        let mut classes = self.classes.lock().unwrap();
        let stats = &mut classes[class.index()];
        stats.max_tries = max_tries;
        stats.highest_max_tries = stats.highest_max_tries.max(max_tries);
        stats.lowest_max_tries = stats.lowest_max_tries.min(max_tries);
        Ok(())
    }

    pub fn get_max_tries(&self, class: OperationClass) -> u8 {
        self.classes.lock().unwrap()[class.index()].max_tries
    }

    pub(crate) fn record_success(&self, class: OperationClass, tries: usize) {
        debug_assert!(tries >= 1 && tries <= MAX_MAX_TRIES);
        let slot = tries.clamp(1, MAX_MAX_TRIES) - 1;
        self.classes.lock().unwrap()[class.index()].by_tries[slot] += 1;
    }

    pub(crate) fn record_fatal(&self, class: OperationClass) {
        self.classes.lock().unwrap()[class.index()].fatal += 1;
    }

    pub(crate) fn record_exceeded(&self, class: OperationClass) {
        self.classes.lock().unwrap()[class.index()].exceeded += 1;
    }

    /// Zero the counters for `class`, keeping its budget and watermarks.
    pub fn reset(&self, class: OperationClass) {
        self.classes.lock().unwrap()[class.index()].reset_counters();
    }

    pub fn reset_all(&self) {
        let mut classes = self.classes.lock().unwrap();
        for stats in classes.iter_mut() {
            stats.reset_counters();
        }
    }

    pub fn snapshot(&self, class: OperationClass) -> ClassSnapshot {
        let classes = self.classes.lock().unwrap();
        let stats = &classes[class.index()];
        ClassSnapshot {
            class,
            max_tries: stats.max_tries,
            highest_max_tries: stats.highest_max_tries,
            lowest_max_tries: stats.lowest_max_tries,
            fatal_failures: stats.fatal,
            retries_exceeded: stats.exceeded,
            successes_by_tries: stats.by_tries.to_vec(),
        }
    }

    /// Render a human-readable report for `class`, indented by `depth`
    /// two-space steps.
    pub fn report(&self, class: OperationClass, depth: usize) -> String {
        let snap = self.snapshot(class);
        let pad = "  ".repeat(depth);
        let mut out = String::new();
        let _ = writeln!(out, "{pad}Retry statistics for {}:", class.label());
        let _ = writeln!(
            out,
            "{pad}  Max tries: {} (highest observed {}, lowest observed {})",
            snap.max_tries, snap.highest_max_tries, snap.lowest_max_tries
        );
        let _ = writeln!(out, "{pad}  Successful attempts by tries required:");
        let shown = snap.highest_max_tries as usize;
        for (index, count) in snap.successes_by_tries.iter().take(shown).enumerate() {
            let _ = writeln!(out, "{pad}    {:>2} tries: {}", index + 1, count);
        }
        let _ = writeln!(out, "{pad}  Failures, retries exhausted: {}", snap.retries_exceeded);
        let _ = writeln!(out, "{pad}  Failures, fatal: {}", snap.fatal_failures);
        let _ = writeln!(out, "{pad}  Total operations: {}", snap.total_operations());
        out
    }
}
