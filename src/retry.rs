// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded retry driver.
//!
//! Wraps a fallible exchange in a budgeted loop. The driver is the only
//! place that decides whether an error is worth another attempt: terminal
//! classes (the monitor answered, just not the way we hoped) return
//! immediately, everything else is retried until the budget runs out. The
//! per-attempt classifications are kept so an exhausted budget can report
//! exactly what happened on each try.

use crate::error::{DdcError, ErrorKind};
use crate::sleep::{SleepEvent, SleepPolicy};
use crate::stats::StatsRegistry;

/// Upper bound on any retry budget.
pub const MAX_MAX_TRIES: usize = 15;

/// The operation classes tracked separately for retry budgets and
/// statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OperationClass {
    WriteOnly,
    WriteRead,
    MultiPartRead,
    MultiPartWrite,
}

impl OperationClass {
    pub(crate) const COUNT: usize = 4;

    pub(crate) fn index(self) -> usize {
        match self {
            OperationClass::WriteOnly => 0,
            OperationClass::WriteRead => 1,
            OperationClass::MultiPartRead => 2,
            OperationClass::MultiPartWrite => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationClass::WriteOnly => "write-only exchange",
            OperationClass::WriteRead => "write-read exchange",
            OperationClass::MultiPartRead => "multi-part read",
            OperationClass::MultiPartWrite => "multi-part write",
        }
    }
}

/// Per-attempt outcomes of one logical operation.
///
/// Capacity is bounded by the class's `max_tries`; the record exists for the
/// lifetime of one driver invocation and feeds both the retry decision and
/// the final `RetriesExceeded` payload.
#[derive(Debug, Default)]
struct RetryRecord {
    statuses: Vec<ErrorKind>,
}

impl RetryRecord {
    fn with_capacity(max_tries: usize) -> RetryRecord {
        RetryRecord { statuses: Vec::with_capacity(max_tries) }
    }

    fn note(&mut self, kind: ErrorKind) {
        self.statuses.push(kind);
    }

    fn tries(&self) -> usize {
        self.statuses.len()
    }
}

/// Run `attempt` up to the class's budget, recording the outcome in `stats`.
///
/// On success the statistics counter for "succeeded after N tries" is
/// incremented. A terminal error stops the loop at once and counts as a
/// fatal failure; exhausting the budget counts as retries-exceeded and
/// returns [`DdcError::RetriesExceeded`] carrying every attempt's class.
pub(crate) fn with_retry<T>(
    class: OperationClass,
    sleep: &dyn SleepPolicy,
    stats: &StatsRegistry,
    mut attempt: impl FnMut() -> Result<T, DdcError>,
) -> Result<T, DdcError> {
    let max_tries = stats.get_max_tries(class) as usize;
    let mut record = RetryRecord::with_capacity(max_tries);
    for try_ctr in 0..max_tries {
        match attempt() {
            Ok(value) => {
                stats.record_success(class, try_ctr + 1);
                return Ok(value);
            }
            Err(error) => {
                let kind = error.kind();
                record.note(kind);
                if kind.is_terminal() {
                    stats.record_fatal(class);
                    return Err(error);
                }
                #[cfg(feature = "logwise")]
                logwise::debuginternal_sync!(
                    "ddci: {label} attempt {attempt} of {budget} failed, retrying",
                    label = class.label(),
                    attempt = try_ctr + 1,
                    budget = max_tries
                );
                if try_ctr + 1 < max_tries {
                    sleep.sleep(SleepEvent::PreRetry);
                }
            }
        }
    }
    debug_assert_eq!(record.tries(), max_tries);
    #[cfg(feature = "logwise")]
    logwise::error_sync!(
        "ddci: {label} failed after {tries} tries",
        label = class.label(),
        tries = max_tries
    );
    stats.record_exceeded(class);
    Err(DdcError::RetriesExceeded { attempts: record.statuses })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testutil::RecordingSleep;

    fn failing(kind: &'static str) -> DdcError {
        match kind {
            "bus" => DdcError::Bus(std::io::Error::from_raw_os_error(5)),
            "checksum" => DdcError::Checksum,
            "null" => DdcError::NullResponse,
            "unsupported" => DdcError::ReportedUnsupported,
            _ => unreachable!(),
        }
    }

    #[test]
    fn first_try_success_records_one_try() {
        let stats = StatsRegistry::new();
        let sleep = RecordingSleep::default();
        let result: Result<u32, _> =
            with_retry(OperationClass::WriteRead, &sleep, &stats, || Ok(7));
        assert_eq!(result.unwrap(), 7);
        let snap = stats.snapshot(OperationClass::WriteRead);
        assert_eq!(snap.successes_by_tries[0], 1);
        assert_eq!(snap.total_operations(), 1);
    }

    #[test]
    fn terminal_error_stops_after_one_attempt() {
        for terminal in ["null", "unsupported"] {
            let stats = StatsRegistry::new();
            let sleep = RecordingSleep::default();
            let mut attempts = 0;
            let result: Result<(), _> =
                with_retry(OperationClass::WriteRead, &sleep, &stats, || {
                    attempts += 1;
                    Err(failing(terminal))
                });
            assert!(result.is_err());
            assert_eq!(attempts, 1);
            assert!(sleep.events.borrow().is_empty());
            let snap = stats.snapshot(OperationClass::WriteRead);
            assert_eq!(snap.fatal_failures, 1);
            assert_eq!(snap.retries_exceeded, 0);
        }
    }

    #[test]
    fn retryable_error_exhausts_budget() {
        let stats = StatsRegistry::new();
        let sleep = RecordingSleep::default();
        let mut attempts = 0;
        let result: Result<(), _> = with_retry(OperationClass::WriteRead, &sleep, &stats, || {
            attempts += 1;
            Err(failing("bus"))
        });
        assert_eq!(attempts, 4);
        match result.unwrap_err() {
            DdcError::RetriesExceeded { attempts } => {
                assert_eq!(attempts, vec![ErrorKind::Bus; 4]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // PreRetry between attempts, but not after the last one.
        assert_eq!(
            *sleep.events.borrow(),
            vec![SleepEvent::PreRetry; 3]
        );
        let snap = stats.snapshot(OperationClass::WriteRead);
        assert_eq!(snap.retries_exceeded, 1);
        assert_eq!(snap.fatal_failures, 0);
    }

    #[test]
    fn eventual_success_counts_tries_required() {
        for succeed_on in 1..=4usize {
            let stats = StatsRegistry::new();
            let sleep = RecordingSleep::default();
            let mut attempts = 0;
            let result: Result<(), _> =
                with_retry(OperationClass::WriteRead, &sleep, &stats, || {
                    attempts += 1;
                    if attempts == succeed_on { Ok(()) } else { Err(failing("checksum")) }
                });
            assert!(result.is_ok());
            assert_eq!(attempts, succeed_on);
            let snap = stats.snapshot(OperationClass::WriteRead);
            assert_eq!(snap.successes_by_tries[succeed_on - 1], 1);
            assert_eq!(snap.total_operations(), 1);
        }
    }

    #[test]
    fn mixed_attempt_kinds_preserved_in_order() {
        let stats = StatsRegistry::new();
        let sleep = RecordingSleep::default();
        let mut attempts = 0;
        let result: Result<(), _> = with_retry(OperationClass::WriteOnly, &sleep, &stats, || {
            attempts += 1;
            if attempts % 2 == 0 { Err(failing("bus")) } else { Err(failing("checksum")) }
        });
        match result.unwrap_err() {
            DdcError::RetriesExceeded { attempts } => {
                assert_eq!(
                    attempts,
                    vec![ErrorKind::Checksum, ErrorKind::Bus, ErrorKind::Checksum, ErrorKind::Bus]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn terminal_error_after_retryable_attempts_stops_early() {
        let stats = StatsRegistry::new();
        let sleep = RecordingSleep::default();
        let mut attempts = 0;
        let result: Result<(), _> = with_retry(OperationClass::WriteRead, &sleep, &stats, || {
            attempts += 1;
            if attempts < 3 { Err(failing("checksum")) } else { Err(failing("null")) }
        });
        assert!(matches!(result.unwrap_err(), DdcError::NullResponse));
        assert_eq!(attempts, 3);
        let snap = stats.snapshot(OperationClass::WriteRead);
        assert_eq!(snap.fatal_failures, 1);
        assert_eq!(snap.retries_exceeded, 0);
    }

    #[test]
    fn honors_configured_budget() {
        let stats = StatsRegistry::new();
        stats.set_max_tries(OperationClass::WriteOnly, 2).unwrap();
        let sleep = RecordingSleep::default();
        let mut attempts = 0;
        let _: Result<(), _> = with_retry(OperationClass::WriteOnly, &sleep, &stats, || {
            attempts += 1;
            Err(failing("bus"))
        });
        assert_eq!(attempts, 2);
    }
}
