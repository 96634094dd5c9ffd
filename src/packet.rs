// SPDX-License-Identifier: MIT OR Apache-2.0
//! DDC/CI packet codec.
//!
//! Builds the request frames the host emits and parses the response frames a
//! monitor returns. This module is pure: it never touches the bus, it only
//! transforms byte buffers.
//!
//! # Wire format
//!
//! A host request frame is `[0x6E, 0x51, 0x80|n, data…, chk]` where `n` is
//! the data byte count and `chk` is the XOR of every preceding byte starting
//! at the destination address. The destination byte `0x6E` is consumed by the
//! transport's slave-address selection, so [`Request::to_wire`] returns the
//! frame starting at the source byte `0x51`.
//!
//! A monitor response as read from the bus is `[0x6E, 0x80|n, data…, chk]`.
//! Its checksum substitutes the virtual host address `0x50` for the
//! destination byte, then XORs the rest of the frame.

use crate::error::DdcError;

/// The I²C slave address DDC/CI monitors answer on.
pub const DDC_SLAVE_ADDR: u16 = 0x37;

/// Destination address of host-originated frames.
const DEST_ADDR: u8 = 0x6E;
/// Source address of host-originated frames.
const SRC_ADDR_HOST: u8 = 0x51;
/// Virtual host address substituted into response checksums.
const VIRTUAL_HOST_ADDR: u8 = 0x50;
/// High bit of the length byte, always set on DDC frames.
const LENGTH_PREFIX: u8 = 0x80;

/// Maximum data bytes in a request frame.
pub const MAX_REQUEST_DATA: usize = 32;
/// Maximum data bytes in a response frame: a 32-byte fragment plus the
/// 4-byte multi-part header.
pub const MAX_RESPONSE_DATA: usize = 36;
/// Maximum value bytes carried by one table-write fragment (32 minus the
/// opcode, VCP code and offset overhead).
pub const MAX_TABLE_WRITE_BYTES: usize = 28;

/// Bytes to read for a non-table get-VCP response.
pub const NONTABLE_READ_LEN: usize = 11;
/// Bytes to read for a multi-part (capabilities / table read) response.
pub const MULTIPART_READ_LEN: usize = 6 + 32 + 1;

/// The packet kinds the core exchanges with a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    CapabilitiesRequest,
    CapabilitiesResponse,
    TableReadRequest,
    TableReadResponse,
    TableWriteRequest,
    GetVcpRequest,
    GetVcpResponse,
    SetVcpRequest,
    SaveSettingsRequest,
    NullResponse,
}

impl PacketKind {
    /// The first data byte of a request of this kind, if it is a request.
    pub fn request_tag(self) -> Option<u8> {
        match self {
            PacketKind::GetVcpRequest => Some(0x01),
            PacketKind::SetVcpRequest => Some(0x03),
            PacketKind::SaveSettingsRequest => Some(0x0C),
            PacketKind::CapabilitiesRequest => Some(0xF3),
            PacketKind::TableReadRequest => Some(0xE2),
            PacketKind::TableWriteRequest => Some(0xE7),
            _ => None,
        }
    }

    /// The first data byte of a response of this kind, if it is a response.
    pub fn response_tag(self) -> Option<u8> {
        match self {
            PacketKind::GetVcpResponse => Some(0x02),
            PacketKind::CapabilitiesResponse => Some(0xE3),
            PacketKind::TableReadResponse => Some(0xE4),
            _ => None,
        }
    }
}

/// XOR of `seed` and every byte of `bytes`.
fn xor_checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, b| acc ^ b)
}

/// A request packet in decoded form.
///
/// Construct one with the kind-specific constructors, then serialize it with
/// [`Request::to_wire`] immediately before transmission. Requests are cheap;
/// the engine builds a fresh one per attempt.
///
/// # Example
///
/// ```
/// use ddci::packet::Request;
///
/// // Get-VCP for luminance (0x10): source, length, opcode, feature, checksum.
/// let wire = Request::get_vcp(0x10).to_wire();
/// assert_eq!(wire, [0x51, 0x82, 0x01, 0x10, 0xAC]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    kind: PacketKind,
    data: Vec<u8>,
}

impl Request {
    /// Get the current value of a non-table VCP feature.
    pub fn get_vcp(feature: u8) -> Request {
        Request {
            kind: PacketKind::GetVcpRequest,
            data: vec![0x01, feature],
        }
    }

    /// Set a non-table VCP feature to `value`.
    pub fn set_vcp(feature: u8, value: u16) -> Request {
        let [hi, lo] = value.to_be_bytes();
        Request {
            kind: PacketKind::SetVcpRequest,
            data: vec![0x03, feature, hi, lo],
        }
    }

    /// Ask the monitor to persist its current settings.
    pub fn save_settings() -> Request {
        Request {
            kind: PacketKind::SaveSettingsRequest,
            data: vec![0x0C],
        }
    }

    /// Request the capabilities fragment starting at `offset`.
    pub fn capabilities(offset: u16) -> Request {
        let [hi, lo] = offset.to_be_bytes();
        Request {
            kind: PacketKind::CapabilitiesRequest,
            data: vec![0xF3, hi, lo],
        }
    }

    /// Request the table-feature fragment of `feature` starting at `offset`.
    pub fn table_read(feature: u8, offset: u16) -> Request {
        let [hi, lo] = offset.to_be_bytes();
        Request {
            kind: PacketKind::TableReadRequest,
            data: vec![0xE2, feature, hi, lo],
        }
    }

    /// Write `bytes` of a table feature value at `offset`.
    ///
    /// A zero-length `bytes` is the terminating write of a segmented
    /// transfer. At most [`MAX_TABLE_WRITE_BYTES`] value bytes fit in one
    /// fragment.
    pub fn table_write(feature: u8, offset: u16, bytes: &[u8]) -> Result<Request, DdcError> {
        if bytes.len() > MAX_TABLE_WRITE_BYTES {
            return Err(DdcError::InvalidData("table write fragment too long"));
        }
        let [hi, lo] = offset.to_be_bytes();
        let mut data = Vec::with_capacity(4 + bytes.len());
        data.extend_from_slice(&[0xE7, feature, hi, lo]);
        data.extend_from_slice(bytes);
        Ok(Request { kind: PacketKind::TableWriteRequest, data })
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Serialize to the bytes handed to the transport.
    ///
    /// The frame starts at the source byte; the checksum nonetheless covers
    /// the destination address the transport will address the write to.
    pub fn to_wire(&self) -> Vec<u8> {
        debug_assert!(self.data.len() <= MAX_REQUEST_DATA);
        let length_byte = LENGTH_PREFIX | self.data.len() as u8;
        let mut wire = Vec::with_capacity(self.data.len() + 3);
        wire.push(SRC_ADDR_HOST);
        wire.push(length_byte);
        wire.extend_from_slice(&self.data);
        let chk = xor_checksum(DEST_ADDR, &wire);
        wire.push(chk);
        wire
    }
}

/// One parsed capabilities or table-read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPartFragment {
    /// The offset the monitor declares for this fragment.
    pub offset: u16,
    /// The fragment payload. Empty means "no more data".
    pub bytes: Vec<u8>,
}

/// The declared type of a non-table VCP feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcpType {
    SetParameter,
    Momentary,
    Other(u8),
}

impl From<u8> for VcpType {
    fn from(byte: u8) -> VcpType {
        match byte {
            0x00 => VcpType::SetParameter,
            0x01 => VcpType::Momentary,
            other => VcpType::Other(other),
        }
    }
}

/// A parsed non-table get-VCP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpValue {
    /// The feature code the monitor echoes back.
    pub feature: u8,
    pub vcp_type: VcpType,
    pub maximum: u16,
    pub current: u16,
}

/// Result of decoding a response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Vcp(VcpValue),
    Fragment(MultiPartFragment),
    /// All data bytes were zero and the caller permitted that.
    AllZero,
}

/// Decode a response frame read from the bus.
///
/// `expected` names the response kind the pending request calls for;
/// `expected_subtype` is the VCP code the reply must echo (table reads and
/// get-VCP), or `None` for capabilities. `allow_all_zero` lets an all-zero
/// data section through as [`Decoded::AllZero`] instead of failing; only the
/// first fragment of a capabilities read sets it.
///
/// `bytes` may be longer than the frame it contains: reads are issued at a
/// fixed worst-case length, so trailing bytes past the checksum are ignored.
///
/// # Example
///
/// ```
/// use ddci::packet::{self, PacketKind};
///
/// // The minimal null frame: the monitor refused the command.
/// let result = packet::decode(&[0x6E, 0x80, 0xBE], PacketKind::GetVcpResponse, Some(0x10), false);
/// assert!(matches!(result, Err(ddci::DdcError::NullResponse)));
/// ```
pub fn decode(
    bytes: &[u8],
    expected: PacketKind,
    expected_subtype: Option<u8>,
    allow_all_zero: bool,
) -> Result<Decoded, DdcError> {
    if bytes.len() < 3 {
        return Err(DdcError::BadByteCount);
    }
    if bytes[0] != DEST_ADDR {
        return Err(DdcError::InvalidData("bad source address in response"));
    }
    let length_byte = bytes[1];
    if length_byte & LENGTH_PREFIX == 0 {
        return Err(DdcError::InvalidData("length byte high bit clear"));
    }
    let n = (length_byte & 0x7F) as usize;
    if n > MAX_RESPONSE_DATA || bytes.len() < n + 3 {
        return Err(DdcError::BadByteCount);
    }
    let frame = &bytes[..n + 3];
    let chk = xor_checksum(VIRTUAL_HOST_ADDR, &frame[..n + 2]);
    if chk != frame[n + 2] {
        return Err(DdcError::Checksum);
    }
    if n == 0 {
        return Err(DdcError::NullResponse);
    }
    let data = &frame[2..2 + n];
    if data.iter().all(|b| *b == 0) {
        if allow_all_zero {
            return Ok(Decoded::AllZero);
        }
        return Err(DdcError::AllZeroResponse);
    }
    let tag = expected
        .response_tag()
        .ok_or(DdcError::InvalidData("expected kind is not a response"))?;
    if data[0] != tag {
        return Err(DdcError::InvalidData("unexpected reply opcode"));
    }
    if let Some(subtype) = expected_subtype {
        if data.len() < 2 || data[1] != subtype {
            return Err(DdcError::InvalidData("reply echoes wrong feature code"));
        }
    }
    match expected {
        PacketKind::GetVcpResponse => decode_vcp(data),
        PacketKind::CapabilitiesResponse | PacketKind::TableReadResponse => decode_fragment(data),
        _ => Err(DdcError::InvalidData("expected kind is not a response")),
    }
}

/// Non-table reply data: `[0x02, vcp, result, type, max_hi, max_lo, cur_hi, cur_lo]`.
fn decode_vcp(data: &[u8]) -> Result<Decoded, DdcError> {
    if data.len() != 8 {
        return Err(DdcError::BadByteCount);
    }
    match data[2] {
        0x00 => {}
        0x01 => return Err(DdcError::ReportedUnsupported),
        _ => return Err(DdcError::InvalidData("unrecognized result code")),
    }
    Ok(Decoded::Vcp(VcpValue {
        feature: data[1],
        vcp_type: VcpType::from(data[3]),
        maximum: u16::from_be_bytes([data[4], data[5]]),
        current: u16::from_be_bytes([data[6], data[7]]),
    }))
}

/// Multi-part reply data: `[tag, subtype, off_hi, off_lo, fragment…]`.
fn decode_fragment(data: &[u8]) -> Result<Decoded, DdcError> {
    if data.len() < 4 {
        return Err(DdcError::BadByteCount);
    }
    let offset = u16::from_be_bytes([data[2], data[3]]);
    Ok(Decoded::Fragment(MultiPartFragment {
        offset,
        bytes: data[4..].to_vec(),
    }))
}
