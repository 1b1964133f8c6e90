//! Binary codec for the update stream.
//!
//! Every binary socket message carries two frames back to back, each with an
//! 8-byte big-endian header:
//!
//! ```text
//! [u8 packet type] [u8 payload format] [u8 deflated] [u8 reserved] [u32 BE size]
//! [payload: size bytes]
//! ```
//!
//! The first frame is the *action* frame (what happened to which entity), the
//! second the *data* frame (the patch or event body). The data frame header
//! sits at offset `8 + action payload size`.
//!
//! Packet types: `0x01` action, `0x02` payload.
//! Payload formats: `0x01` JSON, `0x02` UTF-8 string, `0x03` Node buffer.
//!
//! Deflated payloads start with a 2-byte zlib header that is discarded before
//! raw-deflate decompression.

// Rust guideline compliant 2026-02

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;

use crate::constants::{HEADER_SIZE, MAX_INFLATED_SIZE, ZLIB_PREFIX_SIZE};
use crate::error::{ProtectError, Result};

/// Kind of frame within a message pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Names the mutation kind and target entity.
    Action = 0x01,
    /// Carries the JSON patch or event body.
    Payload = 0x02,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtectError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Action),
            0x02 => Ok(Self::Payload),
            other => Err(ProtectError::Frame(format!(
                "unknown packet type: 0x{other:02x}"
            ))),
        }
    }
}

/// Encoding of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadFormat {
    /// UTF-8 JSON document.
    Json = 0x01,
    /// Plain UTF-8 text.
    Utf8String = 0x02,
    /// Opaque binary buffer.
    NodeBuffer = 0x03,
}

impl TryFrom<u8> for PayloadFormat {
    type Error = ProtectError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Json),
            0x02 => Ok(Self::Utf8String),
            0x03 => Ok(Self::NodeBuffer),
            other => Err(ProtectError::Frame(format!(
                "unknown payload format: 0x{other:02x}"
            ))),
        }
    }
}

/// Decoded 8-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Action or payload frame.
    pub packet_type: PacketType,
    /// Encoding of the payload bytes.
    pub payload_format: PayloadFormat,
    /// Whether the payload is zlib-wrapped deflate.
    pub deflated: bool,
    /// Size of the payload on the wire, in bytes.
    pub payload_size: u32,
}

impl FrameHeader {
    /// Parse a header from the first 8 bytes of `bytes`.
    ///
    /// The reserved byte is not validated.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtectError::Frame(format!(
                "header too short: {} bytes",
                bytes.len()
            )));
        }

        Ok(Self {
            packet_type: PacketType::try_from(bytes[0])?,
            payload_format: PayloadFormat::try_from(bytes[1])?,
            deflated: bytes[2] == 1,
            payload_size: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// Encode this header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let size = self.payload_size.to_be_bytes();
        [
            self.packet_type as u8,
            self.payload_format as u8,
            u8::from(self.deflated),
            0,
            size[0],
            size[1],
            size[2],
            size[3],
        ]
    }
}

/// A frame with its payload already decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header as read from the wire.
    pub header: FrameHeader,
    /// Decompressed payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Deserialize a JSON payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.header.payload_format != PayloadFormat::Json {
            return Err(ProtectError::Decode(format!(
                "expected JSON payload, got {:?}",
                self.header.payload_format
            )));
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Payload as UTF-8 text (lossy), for logging.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// The action frame and data frame of one socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    /// First frame: what happened to which entity.
    pub action: Frame,
    /// Second frame: patch or event body.
    pub data: Frame,
}

/// Extract a frame's payload from `bytes` (which start at the payload).
///
/// Deflated payloads have their 2-byte zlib header skipped and the remainder
/// inflated as raw deflate. Plain payloads are returned unchanged.
pub fn decode_payload(bytes: &[u8], header: &FrameHeader) -> Result<Vec<u8>> {
    let size = header.payload_size as usize;
    if bytes.len() < size {
        return Err(ProtectError::Frame(format!(
            "payload truncated: header declares {size} bytes, {} available",
            bytes.len()
        )));
    }
    let raw = &bytes[..size];

    if !header.deflated {
        return Ok(raw.to_vec());
    }

    if raw.len() < ZLIB_PREFIX_SIZE {
        return Err(ProtectError::Frame(format!(
            "deflated payload too short: {} bytes",
            raw.len()
        )));
    }

    let inflated = inflate(&raw[ZLIB_PREFIX_SIZE..], MAX_INFLATED_SIZE)?;
    log::trace!("[Codec] Inflated {} -> {} bytes", raw.len(), inflated.len());
    Ok(inflated)
}

/// Inflate raw deflate data, failing once the output passes `limit` bytes.
fn inflate(deflated: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut inflated = Vec::with_capacity((deflated.len() * 4).min(limit));
    DeflateDecoder::new(deflated)
        .take(limit as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| ProtectError::Frame(format!("inflate failed: {e}")))?;
    if inflated.len() > limit {
        return Err(ProtectError::Frame(format!(
            "inflated payload exceeds {limit} bytes"
        )));
    }
    Ok(inflated)
}

/// Read one header + payload starting at `offset`.
fn decode_frame_at(message: &[u8], offset: usize) -> Result<(Frame, usize)> {
    let rest = message.get(offset..).unwrap_or_default();
    let header = FrameHeader::parse(rest)?;
    let payload = decode_payload(&rest[HEADER_SIZE..], &header)?;
    let next = offset + HEADER_SIZE + header.payload_size as usize;
    Ok((Frame { header, payload }, next))
}

/// Decode a complete socket message into its action/data frame pair.
///
/// Fails with [`ProtectError::Frame`] if the message is shorter than the
/// declared sizes; the caller drops the message and continues.
pub fn decode_message(message: &[u8]) -> Result<FramePair> {
    let (action, data_offset) = decode_frame_at(message, 0)?;
    let (data, _) = decode_frame_at(message, data_offset)?;
    Ok(FramePair { action, data })
}

/// Encode one frame (header + payload), optionally zlib-compressing it.
pub fn encode_frame(
    packet_type: PacketType,
    payload_format: PayloadFormat,
    payload: &[u8],
    deflate: bool,
) -> Result<Vec<u8>> {
    let body = if deflate {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len()), Compression::fast());
        encoder
            .write_all(payload)
            .map_err(|e| ProtectError::Frame(format!("deflate write failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| ProtectError::Frame(format!("deflate finish failed: {e}")))?
    } else {
        payload.to_vec()
    };

    let payload_size = u32::try_from(body.len())
        .map_err(|e| ProtectError::Frame(format!("payload too large ({} bytes): {e}", body.len())))?;

    let header = FrameHeader {
        packet_type,
        payload_format,
        deflated: deflate,
        payload_size,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Encode a JSON action frame followed by a JSON data frame.
pub fn encode_message(
    action: &serde_json::Value,
    data: &serde_json::Value,
    deflate: bool,
) -> Result<Vec<u8>> {
    let action_bytes = serde_json::to_vec(action)?;
    let data_bytes = serde_json::to_vec(data)?;
    let mut message = encode_frame(PacketType::Action, PayloadFormat::Json, &action_bytes, deflate)?;
    message.extend(encode_frame(PacketType::Payload, PayloadFormat::Json, &data_bytes, deflate)?);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `{"isMotionDetected":true,"lastMotion":1626580814723}` compressed with zlib.
    const GOLDEN_DEFLATED: [u8; 56] = [
        0x78, 0xda, 0xab, 0x56, 0xca, 0x2c, 0xf6, 0xcd, 0x2f, 0xc9, 0xcc, 0xcf, 0x73, 0x49,
        0x2d, 0x49, 0x4d, 0x2e, 0x49, 0x4d, 0x51, 0xb2, 0x2a, 0x29, 0x2a, 0x4d, 0xd5, 0x51,
        0xca, 0x49, 0x2c, 0x2e, 0x81, 0xc8, 0x28, 0x59, 0x19, 0x9a, 0x19, 0x99, 0x99, 0x5a,
        0x18, 0x58, 0x18, 0x9a, 0x98, 0x1b, 0x19, 0xd7, 0x02, 0x00, 0xf0, 0xbf, 0x11, 0x24,
    ];

    #[test]
    fn test_header_round_trip_all_variants() {
        for packet_type in [PacketType::Action, PacketType::Payload] {
            for payload_format in [
                PayloadFormat::Json,
                PayloadFormat::Utf8String,
                PayloadFormat::NodeBuffer,
            ] {
                for deflated in [false, true] {
                    for payload_size in [0, 1, 0x0102_0304, u32::MAX] {
                        let header = FrameHeader {
                            packet_type,
                            payload_format,
                            deflated,
                            payload_size,
                        };
                        assert_eq!(FrameHeader::parse(&header.encode()).unwrap(), header);
                    }
                }
            }
        }
    }

    #[test]
    fn test_header_size_is_big_endian() {
        let bytes = [0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x2c];
        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.packet_type, PacketType::Action);
        assert_eq!(header.payload_format, PayloadFormat::Json);
        assert!(!header.deflated);
        assert_eq!(header.payload_size, 300);
    }

    #[test]
    fn test_header_reserved_byte_not_validated() {
        let bytes = [0x02, 0x03, 0x01, 0xff, 0x00, 0x00, 0x00, 0x04];
        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.packet_type, PacketType::Payload);
        assert_eq!(header.payload_format, PayloadFormat::NodeBuffer);
        assert!(header.deflated);
    }

    #[test]
    fn test_header_too_short() {
        let err = FrameHeader::parse(&[0x01, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, ProtectError::Frame(_)));
    }

    #[test]
    fn test_header_unknown_packet_type() {
        let err = FrameHeader::parse(&[0x07, 0x01, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtectError::Frame(_)));
    }

    #[test]
    fn test_golden_deflate_payload() {
        let header = FrameHeader {
            packet_type: PacketType::Payload,
            payload_format: PayloadFormat::Json,
            deflated: true,
            payload_size: GOLDEN_DEFLATED.len() as u32,
        };
        let payload = decode_payload(&GOLDEN_DEFLATED, &header).unwrap();
        assert_eq!(
            payload,
            br#"{"isMotionDetected":true,"lastMotion":1626580814723}"#.to_vec()
        );
    }

    #[test]
    fn test_plain_payload_returned_unchanged() {
        let header = FrameHeader {
            packet_type: PacketType::Payload,
            payload_format: PayloadFormat::Utf8String,
            deflated: false,
            payload_size: 5,
        };
        // Trailing bytes beyond payload_size belong to the next frame
        let payload = decode_payload(b"hello world", &header).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn test_payload_truncated() {
        let header = FrameHeader {
            packet_type: PacketType::Payload,
            payload_format: PayloadFormat::Json,
            deflated: false,
            payload_size: 64,
        };
        let err = decode_payload(b"{}", &header).unwrap_err();
        assert!(matches!(err, ProtectError::Frame(_)));
    }

    #[test]
    fn test_corrupt_deflate_is_frame_error() {
        let garbage = [0x78, 0xda, 0xff, 0xff, 0xff, 0xff];
        let header = FrameHeader {
            packet_type: PacketType::Payload,
            payload_format: PayloadFormat::Json,
            deflated: true,
            payload_size: garbage.len() as u32,
        };
        assert!(matches!(
            decode_payload(&garbage, &header),
            Err(ProtectError::Frame(_))
        ));
    }

    #[test]
    fn test_inflate_stops_at_limit() {
        let frame = encode_frame(PacketType::Payload, PayloadFormat::Json, &[b'a'; 4096], true)
            .unwrap();
        let deflated = &frame[HEADER_SIZE + ZLIB_PREFIX_SIZE..];

        assert_eq!(inflate(deflated, 4096).unwrap().len(), 4096);
        assert!(matches!(inflate(deflated, 1024), Err(ProtectError::Frame(_))));
    }

    #[test]
    fn test_decode_message_pair() {
        let action = serde_json::json!({
            "action": "update",
            "id": "cam-1",
            "modelKey": "camera",
            "newUpdateId": "u-2"
        });
        let data = serde_json::json!({ "isConnected": false });

        for deflate in [false, true] {
            let message = encode_message(&action, &data, deflate).unwrap();
            let pair = decode_message(&message).unwrap();

            assert_eq!(pair.action.header.packet_type, PacketType::Action);
            assert_eq!(pair.data.header.packet_type, PacketType::Payload);
            assert_eq!(pair.action.header.deflated, deflate);
            assert_eq!(pair.action.json::<serde_json::Value>().unwrap(), action);
            assert_eq!(pair.data.json::<serde_json::Value>().unwrap(), data);
        }
    }

    #[test]
    fn test_decode_message_missing_data_frame() {
        let action = encode_frame(PacketType::Action, PayloadFormat::Json, b"{}", false).unwrap();
        let err = decode_message(&action).unwrap_err();
        assert!(matches!(err, ProtectError::Frame(_)));
    }

    #[test]
    fn test_decode_message_truncated_data_payload() {
        let mut message =
            encode_frame(PacketType::Action, PayloadFormat::Json, b"{}", false).unwrap();
        let mut data =
            encode_frame(PacketType::Payload, PayloadFormat::Json, b"{\"a\":1}", false).unwrap();
        data.truncate(data.len() - 3);
        message.extend(data);

        assert!(matches!(decode_message(&message), Err(ProtectError::Frame(_))));
    }

    #[test]
    fn test_json_on_non_json_frame() {
        let frame = Frame {
            header: FrameHeader {
                packet_type: PacketType::Payload,
                payload_format: PayloadFormat::Utf8String,
                deflated: false,
                payload_size: 2,
            },
            payload: b"hi".to_vec(),
        };
        assert!(matches!(
            frame.json::<serde_json::Value>(),
            Err(ProtectError::Decode(_))
        ));
        assert_eq!(frame.text_lossy(), "hi");
    }
}
