// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multi-part transfers: fragment reassembly and segmented writes.
//!
//! Capabilities strings and table feature values do not fit in one DDC
//! frame. Reads arrive as a sequence of offset-tagged fragments terminated
//! by a zero-length fragment; writes go out the same way. Each fragment is
//! an independent, individually retried exchange.
//!
//! The assembler validates that every fragment lands exactly at the running
//! offset. A mismatch is not patched over: the bytes are dropped and the
//! error propagates, because a monitor that answers with the wrong offset is
//! usually replaying a stale response and the whole transfer needs to start
//! over to be trustworthy.

use crate::error::DdcError;
use crate::exchange;
use crate::packet::{self, Decoded, PacketKind, Request};
use crate::retry::{self, OperationClass};
use crate::sleep::SleepPolicy;
use crate::stats::StatsRegistry;
use crate::transport::Transport;

/// Initial accumulator capacity; capabilities strings usually run a few
/// hundred bytes to a couple of kilobytes.
const ASSEMBLY_RESERVE: usize = 2048;

/// What a multi-part read is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MultiPartTarget {
    Capabilities,
    Table { feature: u8 },
}

impl MultiPartTarget {
    fn request(self, offset: u16) -> Request {
        match self {
            MultiPartTarget::Capabilities => Request::capabilities(offset),
            MultiPartTarget::Table { feature } => Request::table_read(feature, offset),
        }
    }

    fn response_kind(self) -> PacketKind {
        match self {
            MultiPartTarget::Capabilities => PacketKind::CapabilitiesResponse,
            MultiPartTarget::Table { .. } => PacketKind::TableReadResponse,
        }
    }

    fn subtype(self) -> Option<u8> {
        match self {
            MultiPartTarget::Capabilities => None,
            MultiPartTarget::Table { feature } => Some(feature),
        }
    }
}

/// Read a complete multi-part value, one retried fragment exchange at a
/// time.
///
/// `allow_all_zero_first` tolerates an all-zero answer to the very first
/// fragment; an accepted all-zero answer completes the read with whatever
/// has been accumulated (nothing). Subsequent fragments never get the
/// allowance.
pub(crate) fn read_assembled(
    transport: &mut dyn Transport,
    sleep: &dyn SleepPolicy,
    stats: &StatsRegistry,
    target: MultiPartTarget,
    allow_all_zero_first: bool,
) -> Result<Vec<u8>, DdcError> {
    let mut assembled = Vec::with_capacity(ASSEMBLY_RESERVE);
    let mut cur_offset: u16 = 0;
    let mut allow_all_zero = allow_all_zero_first;
    loop {
        let request = target.request(cur_offset);
        let decoded = retry::with_retry(OperationClass::WriteRead, sleep, stats, || {
            exchange::write_read(
                &mut *transport,
                sleep,
                &request,
                target.response_kind(),
                target.subtype(),
                packet::MULTIPART_READ_LEN,
                allow_all_zero,
            )
        })?;
        match decoded {
            Decoded::AllZero => {
                #[cfg(feature = "logwise")]
                logwise::debuginternal_sync!("ddci: all-zero first fragment accepted as empty value");
                return Ok(assembled);
            }
            Decoded::Fragment(fragment) => {
                if fragment.offset != cur_offset {
                    return Err(DdcError::MultiPartFragmentMismatch {
                        expected_offset: cur_offset,
                        got_offset: fragment.offset,
                    });
                }
                if fragment.bytes.is_empty() {
                    return Ok(assembled);
                }
                if cur_offset as u32 + fragment.bytes.len() as u32 > u16::MAX as u32 {
                    return Err(DdcError::InvalidData("fragment offset overflow"));
                }
                cur_offset += fragment.bytes.len() as u16;
                assembled.extend_from_slice(&fragment.bytes);
                allow_all_zero = false;
            }
            Decoded::Vcp(_) => {
                return Err(DdcError::InvalidData("non-fragment reply to multi-part read"));
            }
        }
    }
}

/// Write a table feature value as a sequence of offset-tagged fragments.
///
/// Offsets count bytes, not fragments. The transfer ends with a zero-length
/// write at the total length. Each fragment write is retried on its own; a
/// failure aborts mid-transfer and the monitor keeps whatever fragments it
/// already accepted.
pub(crate) fn write_segmented(
    transport: &mut dyn Transport,
    sleep: &dyn SleepPolicy,
    stats: &StatsRegistry,
    feature: u8,
    value: &[u8],
) -> Result<(), DdcError> {
    if value.len() > u16::MAX as usize {
        return Err(DdcError::InvalidData("table value too long"));
    }
    let mut offset = 0usize;
    for chunk in value.chunks(packet::MAX_TABLE_WRITE_BYTES) {
        let request = Request::table_write(feature, offset as u16, chunk)?;
        retry::with_retry(OperationClass::WriteOnly, sleep, stats, || {
            exchange::write_only(&mut *transport, sleep, &request)
        })?;
        offset += chunk.len();
    }
    let terminator = Request::table_write(feature, value.len() as u16, &[])?;
    retry::with_retry(OperationClass::WriteOnly, sleep, stats, || {
        exchange::write_only(&mut *transport, sleep, &terminator)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::exchange::testutil::RecordingSleep;
    use crate::packet::testutil as frames;

    /// An in-memory monitor serving a payload as offset-tagged fragments.
    ///
    /// Parses the offsets out of the request frames it receives, so it
    /// behaves like a real monitor rather than a fixed script.
    struct MockMonitor {
        payload: Vec<u8>,
        chunk: usize,
        feature: Option<u8>,
        pending_offset: Option<u16>,
        /// When a request for this offset arrives, report this offset
        /// instead of the requested one.
        misreport: Option<(u16, u16)>,
        /// Corrupt the checksum of this many responses before behaving.
        checksum_glitches: usize,
        /// Answer the first read with an all-zero buffer.
        all_zero_first: bool,
        reads_served: usize,
    }

    impl MockMonitor {
        fn capabilities(payload: &[u8], chunk: usize) -> MockMonitor {
            MockMonitor {
                payload: payload.to_vec(),
                chunk,
                feature: None,
                pending_offset: None,
                misreport: None,
                checksum_glitches: 0,
                all_zero_first: false,
                reads_served: 0,
            }
        }

        fn table(feature: u8, payload: &[u8], chunk: usize) -> MockMonitor {
            MockMonitor { feature: Some(feature), ..MockMonitor::capabilities(payload, chunk) }
        }

        fn fragment_frame(&self, offset: u16) -> Vec<u8> {
            let start = (offset as usize).min(self.payload.len());
            let end = (start + self.chunk).min(self.payload.len());
            let body = &self.payload[start..end];
            match self.feature {
                None => frames::capabilities_reply(offset, body),
                Some(feature) => frames::table_read_reply(feature, offset, body),
            }
        }
    }

    impl Transport for MockMonitor {
        fn write(&mut self, bytes: &[u8]) -> Result<usize, DdcError> {
            // [0x51, len, tag, (feature,) off_hi, off_lo, chk]
            let offset_at = match self.feature {
                None => 3,
                Some(_) => 4,
            };
            self.pending_offset =
                Some(u16::from_be_bytes([bytes[offset_at], bytes[offset_at + 1]]));
            Ok(bytes.len())
        }

        fn read(&mut self, len: usize) -> Result<Vec<u8>, DdcError> {
            self.reads_served += 1;
            if self.all_zero_first && self.reads_served == 1 {
                return Ok(vec![0; len]);
            }
            let requested = self.pending_offset.expect("read without a pending request");
            let reported = match self.misreport {
                Some((when, instead)) if when == requested => instead,
                _ => requested,
            };
            let mut frame = self.fragment_frame(reported);
            if self.checksum_glitches > 0 {
                self.checksum_glitches -= 1;
                let last = frame.len() - 1;
                frame[last] ^= 0x55;
            }
            frame.resize(len, 0);
            Ok(frame)
        }
    }

    fn assemble(monitor: &mut MockMonitor, allow_all_zero: bool) -> Result<Vec<u8>, DdcError> {
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        let target = match monitor.feature {
            None => MultiPartTarget::Capabilities,
            Some(feature) => MultiPartTarget::Table { feature },
        };
        read_assembled(monitor, &sleep, &stats, target, allow_all_zero)
    }

    #[test]
    fn reassembles_payloads_of_many_lengths() {
        for &len in &[0usize, 1, 27, 28, 29, 31, 32, 33, 100, 1000, 9973] {
            for &chunk in &[7usize, 28, 32] {
                let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
                let mut monitor = MockMonitor::capabilities(&payload, chunk);
                let assembled = assemble(&mut monitor, false).unwrap();
                assert_eq!(assembled, payload, "len={} chunk={}", len, chunk);
            }
        }
    }

    #[test]
    fn reassembles_table_reads_with_subtype() {
        let payload: Vec<u8> = (0..70u8).collect();
        // Payload bytes include zeros, but the fragment header keeps frames
        // from ever looking all-zero.
        let mut monitor = MockMonitor::table(0x73, &payload, 32);
        let assembled = assemble(&mut monitor, false).unwrap();
        assert_eq!(assembled, payload);
    }

    #[test]
    fn capabilities_happy_path_scenario() {
        // Fragments "prot(" at 0, "mon)" at 5, zero-length at 9.
        let mut monitor = MockMonitor::capabilities(b"prot(mon)", 5);
        let assembled = assemble(&mut monitor, false).unwrap();
        assert_eq!(assembled, b"prot(mon)");
        assert_eq!(monitor.reads_served, 3);
    }

    #[test]
    fn offset_mismatch_drops_bytes_and_errors() {
        let mut monitor = MockMonitor::capabilities(&[1u8; 100], 32);
        monitor.misreport = Some((32, 0));
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        let err = read_assembled(
            &mut monitor,
            &sleep,
            &stats,
            MultiPartTarget::Capabilities,
            false,
        )
        .unwrap_err();
        match err {
            DdcError::MultiPartFragmentMismatch { expected_offset, got_offset } => {
                assert_eq!(expected_offset, 32);
                assert_eq!(got_offset, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn checksum_glitch_is_retried_within_fragment() {
        let payload: Vec<u8> = (1..=60u8).collect();
        let mut monitor = MockMonitor::capabilities(&payload, 32);
        monitor.checksum_glitches = 1;
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        let assembled = read_assembled(
            &mut monitor,
            &sleep,
            &stats,
            MultiPartTarget::Capabilities,
            false,
        )
        .unwrap();
        assert_eq!(assembled, payload);
        // One fragment exchange needed two tries, the rest one.
        let snap = stats.snapshot(OperationClass::WriteRead);
        assert_eq!(snap.successes_by_tries[1], 1);
        assert!(snap.successes_by_tries[0] >= 2);
    }

    #[test]
    fn persistent_null_response_terminates() {
        struct NullMonitor;
        impl Transport for NullMonitor {
            fn write(&mut self, bytes: &[u8]) -> Result<usize, DdcError> {
                Ok(bytes.len())
            }
            fn read(&mut self, len: usize) -> Result<Vec<u8>, DdcError> {
                let mut frame = frames::null_frame();
                frame.resize(len, 0);
                Ok(frame)
            }
        }
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        let err = read_assembled(
            &mut NullMonitor,
            &sleep,
            &stats,
            MultiPartTarget::Capabilities,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DdcError::NullResponse));
        assert_eq!(stats.snapshot(OperationClass::WriteRead).fatal_failures, 1);
    }

    #[test]
    fn all_zero_first_fragment_completes_empty_when_allowed() {
        let mut monitor = MockMonitor::capabilities(b"never read", 32);
        monitor.all_zero_first = true;
        let assembled = assemble(&mut monitor, true).unwrap();
        assert!(assembled.is_empty());

        let mut monitor = MockMonitor::capabilities(b"never read", 32);
        monitor.all_zero_first = true;
        let err = assemble(&mut monitor, false).unwrap_err();
        assert!(matches!(err, DdcError::AllZeroResponse));
    }

    #[test]
    fn read_ending_exactly_at_offset_limit_succeeds() {
        let payload = vec![3u8; 65535];
        let mut monitor = MockMonitor::capabilities(&payload, 32);
        let assembled = assemble(&mut monitor, false).unwrap();
        assert_eq!(assembled.len(), 65535);
    }

    #[test]
    fn offset_overflow_is_a_protocol_error() {
        let mut monitor = MockMonitor::capabilities(&vec![9u8; 65600], 32);
        let err = assemble(&mut monitor, false).unwrap_err();
        assert!(matches!(err, DdcError::InvalidData(_)));
    }

    #[test]
    fn segmented_write_offsets_and_terminator() {
        use crate::transport::mock::MockTransport;
        let mut transport = MockTransport::new();
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        let value = vec![0xABu8; 70];
        write_segmented(&mut transport, &sleep, &stats, 0x73, &value).unwrap();
        // Fragments at 0, 28, 56, then the zero-length terminator at 70.
        assert_eq!(transport.writes.len(), 4);
        let offsets: Vec<u16> = transport
            .writes
            .iter()
            .map(|frame| u16::from_be_bytes([frame[4], frame[5]]))
            .collect();
        assert_eq!(offsets, vec![0, 28, 56, 70]);
        let data_lens: Vec<usize> = transport
            .writes
            .iter()
            .map(|frame| (frame[1] & 0x7F) as usize - 4)
            .collect();
        assert_eq!(data_lens, vec![28, 28, 14, 0]);
        assert_eq!(stats.snapshot(OperationClass::WriteOnly).successes_by_tries[0], 4);
    }

    #[test]
    fn empty_value_writes_only_the_terminator() {
        use crate::transport::mock::MockTransport;
        let mut transport = MockTransport::new();
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        write_segmented(&mut transport, &sleep, &stats, 0x73, &[]).unwrap();
        assert_eq!(transport.writes.len(), 1);
        assert_eq!(transport.writes[0][1], 0x80 | 4);
    }

    #[test]
    fn failing_fragment_write_is_retried() {
        use crate::transport::mock::MockTransport;
        let mut transport = MockTransport::new();
        transport.failing_writes = 1;
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        write_segmented(&mut transport, &sleep, &stats, 0x73, &[1, 2, 3]).unwrap();
        assert_eq!(transport.writes.len(), 2);
        let snap = stats.snapshot(OperationClass::WriteOnly);
        assert_eq!(snap.successes_by_tries[1], 1);
        assert_eq!(snap.successes_by_tries[0], 1);
    }

    #[test]
    fn write_budget_exhaustion_propagates_attempts() {
        use crate::transport::mock::MockTransport;
        let mut transport = MockTransport::new();
        transport.failing_writes = usize::MAX;
        let sleep = RecordingSleep::default();
        let stats = StatsRegistry::new();
        let err = write_segmented(&mut transport, &sleep, &stats, 0x73, &[1]).unwrap_err();
        match err {
            DdcError::RetriesExceeded { attempts } => {
                assert_eq!(attempts, vec![ErrorKind::Bus; 4]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
