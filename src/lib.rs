//! ddci talks to monitors over the VESA DDC/CI protocol on Linux.
//!
//! DDC/CI carries the Monitor Control Command Set (MCCS) over the I²C bus
//! every display connector already has, at slave address `0x37`. With it you
//! can read and change any setting the monitor exposes as a VCP feature
//! (brightness, contrast, input source, and so on) without touching the
//! on-screen menu.
//!
//! # Overview
//!
//! The crate is a layered stack over `/dev/i2c-N`:
//!
//! - a byte-exact packet codec (framing plus the DDC XOR checksum),
//! - a single-exchange engine that performs one write or write/read with
//!   monitor-friendly pacing,
//! - a retry driver that distinguishes transient garbage (checksum errors,
//!   bus hiccups) from authoritative refusals (Null responses, reported
//!   unsupported features),
//! - multi-part assembly for capabilities strings and table features, which
//!   arrive as sequences of offset-tagged fragments,
//! - and per-operation-class retry statistics.
//!
//! The transport and pacing layers are traits, so the whole stack can be
//! driven against an in-memory monitor in tests or embedded behind a
//! different bus implementation.
//!
//! # Quick start
//!
//! ```no_run
//! use ddci::DdcHandle;
//!
//! # fn main() -> Result<(), ddci::DdcError> {
//! let mut monitor = DdcHandle::open(4)?;
//! let brightness = monitor.get_vcp(0x10)?;
//! println!("brightness {}/{}", brightness.current, brightness.maximum);
//! monitor.set_vcp(0x10, brightness.maximum / 2)?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "logwise")]
logwise::declare_logging_domain!();

pub mod config;
pub mod error;
mod exchange;
mod multipart;
pub mod packet;
pub mod retry;
pub mod sleep;
pub mod stats;
pub mod transport;
mod handle;

pub use config::Config;
pub use error::{DdcError, ErrorKind};
pub use handle::DdcHandle;
pub use packet::{MultiPartFragment, VcpType, VcpValue};
pub use retry::OperationClass;
pub use sleep::{FixedSleep, NoSleep, SleepEvent, SleepPolicy};
pub use stats::{ClassSnapshot, StatsRegistry};
pub use transport::Transport;
