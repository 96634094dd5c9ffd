//! Configuration surface for DDC handles.

use crate::error::DdcError;
use crate::retry::MAX_MAX_TRIES;

/// Options accepted when opening a [`crate::DdcHandle`].
///
/// All fields have conservative defaults; `Config::default()` is what
/// `DdcHandle::open` uses. The three `max_tries_*` budgets seed the
/// statistics registry's per-class settings at handle construction.
///
/// # Example
///
/// ```
/// use ddci::Config;
///
/// let config = Config {
///     max_tries_write_read: 8,
///     verify_set_vcp: true,
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retry budget for write-only exchanges (set-VCP, save-settings).
    pub max_tries_write_only: u8,
    /// Retry budget for write-read exchanges (get-VCP, each fragment).
    pub max_tries_write_read: u8,
    /// Retry budget for whole multi-part transfers.
    pub max_tries_multi_part: u8,
    /// Fall back to the forced slave-address ioctl when the plain one
    /// reports the address busy.
    pub force_slave_addr: bool,
    /// Kernel-side read timeout, in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Accept an all-zero first fragment on capabilities reads instead of
    /// failing. Some monitors answer a capabilities probe this way before
    /// the string is ready.
    pub allow_all_zero_first_fragment: bool,
    /// After a successful non-table set, read the feature back and fail
    /// with `VerifyFailed` if the monitor reports a different value.
    pub verify_set_vcp: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_tries_write_only: 4,
            max_tries_write_read: 4,
            max_tries_multi_part: 4,
            force_slave_addr: false,
            read_timeout_ms: None,
            allow_all_zero_first_fragment: false,
            verify_set_vcp: false,
        }
    }
}

impl Config {
    /// Check that every retry budget is inside `1..=15`.
    pub fn validate(&self) -> Result<(), DdcError> {
        for budget in [
            self.max_tries_write_only,
            self.max_tries_write_read,
            self.max_tries_multi_part,
        ] {
            if budget < 1 || budget as usize > MAX_MAX_TRIES {
                return Err(DdcError::InvalidData("max_tries out of range"));
            }
        }
        Ok(())
    }
}
