// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for DDC/CI exchanges.
//!
//! Every failure the crate can produce is a variant of [`DdcError`]. The
//! retry driver does not care about the full payload of an error, only its
//! class, so each error maps onto a copyable [`ErrorKind`] which also decides
//! whether another attempt is worthwhile.
//!
//! The split matters because DDC monitors fail in several distinct ways that
//! demand different handling: a garbled frame (checksum, byte count) is worth
//! retrying, while a Null response is the monitor's authoritative "no" and
//! retrying it only burns time on every operation.

/// Errors produced by DDC/CI operations.
#[derive(Debug, thiserror::Error)]
pub enum DdcError {
    /// The underlying I²C device reported an I/O error.
    #[error("i2c bus error: {0}")]
    Bus(#[from] std::io::Error),
    /// The transport returned fewer bytes than requested.
    #[error("short read: got {got} of {expected} bytes")]
    ShortRead { got: usize, expected: usize },
    /// A write did not transmit the whole frame.
    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },
    /// The response checksum did not match the frame contents.
    #[error("response checksum mismatch")]
    Checksum,
    /// The length byte disagreed with the number of bytes received.
    #[error("bad byte count in response")]
    BadByteCount,
    /// The frame was structurally valid but its contents made no sense.
    #[error("invalid data in response: {0}")]
    InvalidData(&'static str),
    /// The monitor answered with a Null response, refusing the command.
    #[error("monitor returned a null response")]
    NullResponse,
    /// Every data byte of the response was zero.
    #[error("monitor returned an all-zero response")]
    AllZeroResponse,
    /// The monitor explicitly reported the feature as unsupported.
    #[error("monitor reports feature unsupported")]
    ReportedUnsupported,
    /// A multi-part fragment arrived with the wrong offset.
    #[error("fragment offset mismatch: expected {expected_offset}, got {got_offset}")]
    MultiPartFragmentMismatch { expected_offset: u16, got_offset: u16 },
    /// Every attempt failed; the per-attempt classifications are preserved.
    #[error("all {} tries failed (last: {:?})", .attempts.len(), .attempts.last())]
    RetriesExceeded { attempts: Vec<ErrorKind> },
    /// The operation is not meaningful on this transport.
    #[error("operation unsupported on this transport")]
    OperationUnsupported,
    /// A verified set read back a different value than was written.
    #[error("set verification failed: wrote {expected}, read back {actual}")]
    VerifyFailed { expected: u16, actual: u16 },
}

/// Classification of a [`DdcError`], used for retry decisions and for the
/// attempt lists inside [`DdcError::RetriesExceeded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    Bus,
    ShortRead,
    ShortWrite,
    Checksum,
    BadByteCount,
    InvalidData,
    NullResponse,
    AllZeroResponse,
    ReportedUnsupported,
    FragmentMismatch,
    RetriesExceeded,
    Unsupported,
    VerifyFailed,
}

impl DdcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DdcError::Bus(_) => ErrorKind::Bus,
            DdcError::ShortRead { .. } => ErrorKind::ShortRead,
            DdcError::ShortWrite { .. } => ErrorKind::ShortWrite,
            DdcError::Checksum => ErrorKind::Checksum,
            DdcError::BadByteCount => ErrorKind::BadByteCount,
            DdcError::InvalidData(_) => ErrorKind::InvalidData,
            DdcError::NullResponse => ErrorKind::NullResponse,
            DdcError::AllZeroResponse => ErrorKind::AllZeroResponse,
            DdcError::ReportedUnsupported => ErrorKind::ReportedUnsupported,
            DdcError::MultiPartFragmentMismatch { .. } => ErrorKind::FragmentMismatch,
            DdcError::RetriesExceeded { .. } => ErrorKind::RetriesExceeded,
            DdcError::OperationUnsupported => ErrorKind::Unsupported,
            DdcError::VerifyFailed { .. } => ErrorKind::VerifyFailed,
        }
    }
}

impl ErrorKind {
    /// Whether another attempt of the same exchange could plausibly succeed.
    ///
    /// Null, all-zero and reported-unsupported responses are the monitor
    /// answering clearly; repeating the question does not change the answer.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::NullResponse
                | ErrorKind::AllZeroResponse
                | ErrorKind::ReportedUnsupported
                | ErrorKind::Unsupported
                | ErrorKind::VerifyFailed
        )
    }

    pub fn is_retryable(self) -> bool {
        !self.is_terminal()
    }
}
