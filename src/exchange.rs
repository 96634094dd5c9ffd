//! Single-exchange engine: one request, at most one response.
//!
//! This layer stitches together the codec, the transport and the sleep
//! policy into exactly one attempt. It classifies the outcome and returns.
//! It never loops; budgeted repetition is the retry driver's job.

use crate::error::DdcError;
use crate::packet::{self, Decoded, PacketKind, Request};
use crate::sleep::{SleepEvent, SleepPolicy};
use crate::transport::Transport;

/// Send a request that expects no response.
///
/// Succeeds when the transport accepts the full frame. The monitor gives no
/// acknowledgment for these commands, so a clean write is the only success
/// signal available.
pub(crate) fn write_only(
    transport: &mut dyn Transport,
    sleep: &dyn SleepPolicy,
    request: &Request,
) -> Result<(), DdcError> {
    let result = write_frame(transport, sleep, request);
    if result.is_err() {
        sleep.sleep(SleepEvent::PostFailure);
    }
    result
}

/// Send a request and read back one response frame.
///
/// `read_len` is the worst-case frame length for the expected response kind;
/// the transport reads exactly that many bytes and the codec ignores
/// whatever trails the checksum. `allow_all_zero` accepts an all-zero
/// response as [`Decoded::AllZero`] instead of an error.
pub(crate) fn write_read(
    transport: &mut dyn Transport,
    sleep: &dyn SleepPolicy,
    request: &Request,
    expected: PacketKind,
    expected_subtype: Option<u8>,
    read_len: usize,
    allow_all_zero: bool,
) -> Result<Decoded, DdcError> {
    let result = write_read_inner(
        transport,
        sleep,
        request,
        expected,
        expected_subtype,
        read_len,
        allow_all_zero,
    );
    if result.is_err() {
        sleep.sleep(SleepEvent::PostFailure);
    }
    result
}

fn write_frame(
    transport: &mut dyn Transport,
    sleep: &dyn SleepPolicy,
    request: &Request,
) -> Result<(), DdcError> {
    let wire = request.to_wire();
    sleep.sleep(SleepEvent::PreWrite);
    let sent = transport.write(&wire)?;
    sleep.sleep(SleepEvent::PostWrite);
    if sent != wire.len() {
        return Err(DdcError::ShortWrite { sent, expected: wire.len() });
    }
    Ok(())
}

fn write_read_inner(
    transport: &mut dyn Transport,
    sleep: &dyn SleepPolicy,
    request: &Request,
    expected: PacketKind,
    expected_subtype: Option<u8>,
    read_len: usize,
    allow_all_zero: bool,
) -> Result<Decoded, DdcError> {
    write_frame(transport, sleep, request)?;
    let bytes = transport.read(read_len)?;
    sleep.sleep(SleepEvent::PostRead);
    if bytes.is_empty() {
        return Err(DdcError::NullResponse);
    }
    if bytes.iter().all(|b| *b == 0) {
        // A fully zero buffer never decodes as a frame, so the flag is
        // resolved here rather than in the codec.
        if allow_all_zero {
            return Ok(Decoded::AllZero);
        }
        return Err(DdcError::AllZeroResponse);
    }
    packet::decode(&bytes, expected, expected_subtype, allow_all_zero)
}
