/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Incremental FIX framing over a byte stream.
//!
//! The [`Framer`] is a tokio codec that splits arbitrary read chunks into
//! complete `8=...10=XXX<SOH>` frames, verifying BodyLength and CheckSum.
//! Framing failures are recoverable: the offending bytes are discarded up
//! to the next `8=` and reported as a [`FramedEvent::Garbled`] item, so a
//! corrupt frame never kills the stream. [`scan_message`] is the cheap
//! boundary detector used when sniffing the first message of an inbound
//! connection.

use bytes::{Buf, BytesMut};
use fixline_core::checksum::{SOH, checksum, parse_checksum};
use memchr::memchr;
use memchr::memmem;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Framing I/O failure; everything protocol-level is a
/// [`FramedEvent::Garbled`] item instead.
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O error from the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoder output: a verified frame or a reported garble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramedEvent {
    /// A complete frame with valid BodyLength (and CheckSum when enabled).
    Frame(BytesMut),
    /// Bytes discarded during resynchronization.
    Garbled {
        /// What was wrong with the discarded bytes.
        reason: String,
    },
}

/// Incremental FIX frame splitter with resynchronization.
#[derive(Debug, Clone)]
pub struct Framer {
    max_message_size: usize,
    validate_checksum: bool,
}

impl Framer {
    /// Creates a framer with a 1 MiB frame limit and checksum validation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            validate_checksum: true,
        }
    }

    /// Sets the maximum tolerated frame size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether CheckSum is verified.
    #[must_use]
    pub fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Discards bytes up to the next `8=` (or the whole buffer) and
    /// reports the garble.
    fn resync(&self, src: &mut BytesMut, reason: impl Into<String>) -> FramedEvent {
        let skip = memmem::find(&src[1..], b"8=").map_or(src.len(), |pos| pos + 1);
        src.advance(skip);
        FramedEvent::Garbled {
            reason: reason.into(),
        }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Framer {
    type Item = FramedEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // a lone byte may be the first half of "8="
        if src.len() < 2 {
            return Ok(None);
        }

        // hunt for the start of a frame
        if !src.starts_with(b"8=") {
            return Ok(Some(self.resync(src, "stream does not start with 8=")));
        }

        // BeginString value ends at the first SOH
        let Some(begin_end) = memchr(SOH, src) else {
            return Ok(if src.len() > self.max_message_size {
                Some(self.resync(src, "unterminated BeginString"))
            } else {
                None
            });
        };

        // BodyLength field: 9=<digits><SOH>
        let len_start = begin_end + 1;
        if src.len() < len_start + 2 {
            return Ok(None);
        }
        if &src[len_start..len_start + 2] != b"9=" {
            return Ok(Some(self.resync(src, "BodyLength must follow BeginString")));
        }
        let Some(len_soh) = memchr(SOH, &src[len_start..]).map(|p| len_start + p) else {
            return Ok(None);
        };
        let declared: usize = match std::str::from_utf8(&src[len_start + 2..len_soh])
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(n) => n,
            None => return Ok(Some(self.resync(src, "malformed BodyLength"))),
        };

        // body plus |10=XXX<SOH> trailer
        let body_start = len_soh + 1;
        let total = body_start + declared + 7;
        if total > self.max_message_size {
            return Ok(Some(self.resync(
                src,
                format!("frame of {total} bytes exceeds limit"),
            )));
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let trailer = &src[body_start + declared..total];
        if &trailer[..3] != b"10=" || trailer[6] != SOH {
            return Ok(Some(self.resync(
                src,
                "BodyLength does not land on the CheckSum field",
            )));
        }

        if self.validate_checksum {
            let Some(declared_sum) = parse_checksum(&trailer[3..6]) else {
                return Ok(Some(self.resync(src, "CheckSum is not three digits")));
            };
            let calculated = checksum(&src[..body_start + declared]);
            if calculated != declared_sum {
                return Ok(Some(self.resync(
                    src,
                    format!("CheckSum mismatch: calculated {calculated}, declared {declared_sum}"),
                )));
            }
        }

        Ok(Some(FramedEvent::Frame(src.split_to(total))))
    }
}

impl Encoder<bytes::Bytes> for Framer {
    type Error = CodecError;

    fn encode(&mut self, item: bytes::Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Locates the end of the first complete frame in `buf`: the `<SOH>10=`
/// marker plus the four checksum bytes (`XXX<SOH>`).
///
/// # Returns
/// The frame length in bytes, or `None` while the frame is incomplete.
#[must_use]
pub fn scan_message(buf: &[u8]) -> Option<usize> {
    let marker = memmem::find(buf, b"\x0110=")?;
    let end = marker + 4 + 4;
    (buf.len() >= end).then_some(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::checksum::format_checksum;

    fn frame(inner: &str) -> Vec<u8> {
        let inner = inner.replace('|', "\x01");
        let mut out = format!("8=FIX.4.4\x019={}\x01{inner}", inner.len()).into_bytes();
        let digits = format_checksum(checksum(&out));
        out.extend_from_slice(b"10=");
        out.extend_from_slice(&digits);
        out.push(SOH);
        out
    }

    fn drain(framer: &mut Framer, buf: &mut BytesMut) -> Vec<FramedEvent> {
        let mut events = Vec::new();
        while let Some(event) = framer.decode(buf).unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_decode_single_frame() {
        let mut framer = Framer::new();
        let mut buf = BytesMut::from(&frame("35=0|49=S|56=T|")[..]);
        let events = drain(&mut framer, &mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FramedEvent::Frame(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_across_arbitrary_boundaries() {
        let mut framer = Framer::new();
        let bytes = frame("35=0|49=S|56=T|");
        let mut buf = BytesMut::new();

        for chunk in bytes.chunks(3) {
            buf.extend_from_slice(chunk);
            // no spurious frames or errors mid-message
            if buf.len() < bytes.len() {
                assert!(framer.decode(&mut buf).unwrap().is_none());
            }
        }
        assert!(matches!(
            framer.decode(&mut buf).unwrap(),
            Some(FramedEvent::Frame(_))
        ));
    }

    #[test]
    fn test_decode_two_frames_in_one_read() {
        let mut framer = Framer::new();
        let mut bytes = frame("35=0|");
        bytes.extend_from_slice(&frame("35=1|112=X|"));
        let mut buf = BytesMut::from(&bytes[..]);

        let events = drain(&mut framer, &mut buf);
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|e| matches!(e, FramedEvent::Frame(_)))
        );
    }

    #[test]
    fn test_checksum_mismatch_resyncs_to_next_frame() {
        let mut framer = Framer::new();
        let mut corrupt = frame("35=0|");
        let len = corrupt.len();
        corrupt[len - 2] = b'0'; // break the checksum
        corrupt.extend_from_slice(&frame("35=1|112=X|"));
        let mut buf = BytesMut::from(&corrupt[..]);

        let events = drain(&mut framer, &mut buf);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FramedEvent::Garbled { .. }));
        assert!(matches!(events[1], FramedEvent::Frame(_)));
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut framer = Framer::new();
        let mut bytes = b"noise noise ".to_vec();
        bytes.extend_from_slice(&frame("35=0|"));
        let mut buf = BytesMut::from(&bytes[..]);

        let events = drain(&mut framer, &mut buf);
        assert!(matches!(events[0], FramedEvent::Garbled { .. }));
        assert!(matches!(events[1], FramedEvent::Frame(_)));
    }

    #[test]
    fn test_bad_body_length_resyncs() {
        let mut framer = Framer::new();
        let mut bytes = b"8=FIX.4.4\x019=abc\x0135=0\x01".to_vec();
        bytes.extend_from_slice(&frame("35=0|"));
        let mut buf = BytesMut::from(&bytes[..]);

        let events = drain(&mut framer, &mut buf);
        assert!(matches!(events[0], FramedEvent::Garbled { .. }));
        assert!(matches!(events[1], FramedEvent::Frame(_)));
    }

    #[test]
    fn test_body_length_off_by_one_is_garbled() {
        let mut framer = Framer::new();
        let good = frame("35=0|49=S|");
        // declared length one byte short: 10= lands in the wrong spot
        let raw = String::from_utf8(good).unwrap();
        let bad = raw.replacen("9=10", "9=9", 1);
        let mut buf = BytesMut::from(bad.as_bytes());

        let events = drain(&mut framer, &mut buf);
        assert!(matches!(events[0], FramedEvent::Garbled { .. }));
    }

    #[test]
    fn test_checksum_validation_can_be_disabled() {
        let mut framer = Framer::new().with_checksum_validation(false);
        let mut corrupt = frame("35=0|");
        let len = corrupt.len();
        corrupt[len - 2] = b'0';
        let mut buf = BytesMut::from(&corrupt[..]);

        assert!(matches!(
            framer.decode(&mut buf).unwrap(),
            Some(FramedEvent::Frame(_))
        ));
    }

    #[test]
    fn test_scan_message() {
        let bytes = frame("35=0|49=S|56=T|");
        assert_eq!(scan_message(&bytes), Some(bytes.len()));
        assert_eq!(scan_message(&bytes[..bytes.len() - 2]), None);
        assert_eq!(scan_message(b"8=FIX.4.4\x019=5\x01"), None);

        let mut two = bytes.clone();
        two.extend_from_slice(&frame("35=1|"));
        assert_eq!(scan_message(&two), Some(bytes.len()));
    }
}
