//! The public DDC/CI operations on one open monitor.
//!
//! A [`DdcHandle`] owns a transport, a sleep policy, a configuration and a
//! reference to a statistics registry, and exposes the MCCS operations:
//! get/set of non-table VCP features, capabilities and table reads, table
//! writes, and save-settings.
//!
//! Every exchange through one handle is strictly serialized: the operations
//! take `&mut self`, so reads and writes can never interleave on a single
//! monitor. Different handles are fully independent and may run on
//! different threads.

use crate::config::Config;
use crate::error::DdcError;
use crate::exchange;
use crate::multipart::{self, MultiPartTarget};
use crate::packet::{self, Decoded, PacketKind, Request, VcpValue};
use crate::retry::{self, OperationClass};
use crate::sleep::{FixedSleep, SleepPolicy};
use crate::stats::StatsRegistry;
use crate::transport::Transport;
use std::sync::Arc;

/// An open DDC/CI connection to one monitor.
pub struct DdcHandle {
    transport: Box<dyn Transport + Send>,
    sleep: Box<dyn SleepPolicy + Send>,
    config: Config,
    stats: Arc<StatsRegistry>,
}

impl DdcHandle {
    /// Open `/dev/i2c-{bus}` with the default configuration, the default
    /// fixed sleep policy and the process-global statistics registry.
    #[cfg(target_os = "linux")]
    pub fn open(bus: u32) -> Result<DdcHandle, DdcError> {
        DdcHandle::open_with(bus, Config::default())
    }

    /// Open `/dev/i2c-{bus}` with an explicit configuration.
    #[cfg(target_os = "linux")]
    pub fn open_with(bus: u32, config: Config) -> Result<DdcHandle, DdcError> {
        config.validate()?;
        let transport = crate::transport::I2cDevice::open(
            bus,
            config.force_slave_addr,
            config.read_timeout_ms,
        )?;
        DdcHandle::with_transport(
            Box::new(transport),
            Box::new(FixedSleep::default()),
            config,
            StatsRegistry::global(),
        )
    }

    /// Assemble a handle from parts.
    ///
    /// This is the seam for embedders: any [`Transport`] implementation, any
    /// [`SleepPolicy`], and an isolated [`StatsRegistry`] if process-global
    /// counters are unwanted. The configuration's retry budgets seed the
    /// registry's per-class settings.
    pub fn with_transport(
        transport: Box<dyn Transport + Send>,
        sleep: Box<dyn SleepPolicy + Send>,
        config: Config,
        stats: Arc<StatsRegistry>,
    ) -> Result<DdcHandle, DdcError> {
        config.validate()?;
        stats.set_max_tries(OperationClass::WriteOnly, config.max_tries_write_only)?;
        stats.set_max_tries(OperationClass::WriteRead, config.max_tries_write_read)?;
        stats.set_max_tries(OperationClass::MultiPartRead, config.max_tries_multi_part)?;
        stats.set_max_tries(OperationClass::MultiPartWrite, config.max_tries_multi_part)?;
        Ok(DdcHandle { transport, sleep, config, stats })
    }

    /// Read the current and maximum value of a non-table VCP feature.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() -> Result<(), ddci::DdcError> {
    /// let mut monitor = ddci::DdcHandle::open(4)?;
    /// let luminance = monitor.get_vcp(0x10)?;
    /// println!("luminance {} of {}", luminance.current, luminance.maximum);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_vcp(&mut self, feature: u8) -> Result<VcpValue, DdcError> {
        let request = Request::get_vcp(feature);
        let DdcHandle { transport, sleep, stats, .. } = self;
        let decoded = retry::with_retry(OperationClass::WriteRead, &**sleep, &**stats, || {
            exchange::write_read(
                &mut **transport,
                &**sleep,
                &request,
                PacketKind::GetVcpResponse,
                Some(feature),
                packet::NONTABLE_READ_LEN,
                false,
            )
        })?;
        match decoded {
            Decoded::Vcp(value) => Ok(value),
            _ => Err(DdcError::InvalidData("non-VCP reply to get-VCP")),
        }
    }

    /// Set a non-table VCP feature.
    ///
    /// With `Config::verify_set_vcp` enabled, the feature is read back after
    /// the write and a differing current value fails with
    /// [`DdcError::VerifyFailed`].
    pub fn set_vcp(&mut self, feature: u8, value: u16) -> Result<(), DdcError> {
        let request = Request::set_vcp(feature, value);
        {
            let DdcHandle { transport, sleep, stats, .. } = &mut *self;
            retry::with_retry(OperationClass::WriteOnly, &**sleep, &**stats, || {
                exchange::write_only(&mut **transport, &**sleep, &request)
            })?;
        }
        if self.config.verify_set_vcp {
            let read_back = self.get_vcp(feature)?;
            if read_back.current != value {
                return Err(DdcError::VerifyFailed { expected: value, actual: read_back.current });
            }
        }
        Ok(())
    }

    /// Fetch the monitor's capabilities string.
    ///
    /// The string arrives as retried fragments; a retryable failure partway
    /// through (including a fragment at the wrong offset) restarts the whole
    /// read from offset zero, up to the multi-part budget.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() -> Result<(), ddci::DdcError> {
    /// let mut monitor = ddci::DdcHandle::open(4)?;
    /// let capabilities = monitor.get_capabilities()?;
    /// println!("{}", String::from_utf8_lossy(&capabilities));
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_capabilities(&mut self) -> Result<Vec<u8>, DdcError> {
        self.multi_part_read(MultiPartTarget::Capabilities)
    }

    /// Read a table-type VCP feature value.
    pub fn get_table_vcp(&mut self, feature: u8) -> Result<Vec<u8>, DdcError> {
        self.multi_part_read(MultiPartTarget::Table { feature })
    }

    fn multi_part_read(&mut self, target: MultiPartTarget) -> Result<Vec<u8>, DdcError> {
        let allow_all_zero = self.config.allow_all_zero_first_fragment;
        let DdcHandle { transport, sleep, stats, .. } = self;
        retry::with_retry(OperationClass::MultiPartRead, &**sleep, &**stats, || {
            multipart::read_assembled(&mut **transport, &**sleep, &**stats, target, allow_all_zero)
        })
    }

    /// Write a table-type VCP feature value.
    ///
    /// The value goes out in 28-byte fragments, each retried on its own.
    /// When a fragment fails for good the whole write is retried wholesale;
    /// the monitor may observe the partial transfers in between, which the
    /// protocol offers no way to roll back.
    pub fn set_table_vcp(&mut self, feature: u8, value: &[u8]) -> Result<(), DdcError> {
        if value.len() > u16::MAX as usize {
            return Err(DdcError::InvalidData("table value too long"));
        }
        let DdcHandle { transport, sleep, stats, .. } = self;
        retry::with_retry(OperationClass::MultiPartWrite, &**sleep, &**stats, || {
            multipart::write_segmented(&mut **transport, &**sleep, &**stats, feature, value)
        })
    }

    /// Ask the monitor to persist its current settings.
    pub fn save_settings(&mut self) -> Result<(), DdcError> {
        if !self.transport.supports_save_settings() {
            return Err(DdcError::OperationUnsupported);
        }
        let request = Request::save_settings();
        let DdcHandle { transport, sleep, stats, .. } = self;
        retry::with_retry(OperationClass::WriteOnly, &**sleep, &**stats, || {
            exchange::write_only(&mut **transport, &**sleep, &request)
        })
    }

    /// The statistics registry this handle records into.
    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close the handle. Equivalent to dropping it; the transport is
    /// released either way.
    pub fn close(self) {}
}
