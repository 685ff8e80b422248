//! Byte-accurate bus messages.
//!
//! Two message kinds travel the bus: raw frames (recorder → analyzer) and
//! keyframe metadata (analyzer → consumers). Both are framed as a packed
//! little-endian header, an optional payload, and a trailing CRC-32 over
//! everything before it.

use fsift_models::Frame;

use crate::error::{ProtoError, ProtoResult};

/// Protocol magic, first four bytes of every message.
pub const MAGIC: u32 = 0x4653_4654;
/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;
/// Message type tag for raw frames.
pub const MSG_TYPE_FRAME: u8 = 1;
/// Message type tag for keyframe metadata.
pub const MSG_TYPE_METADATA: u8 = 2;

/// Packed frame header length: magic(4) + version(1) + type(1) + id(4) +
/// timestamp(8) + width(4) + height(4) + channels(1) + data_size(4).
pub const FRAME_HEADER_LEN: usize = 31;
/// Full metadata message length including the CRC.
pub const METADATA_LEN: usize = 39;

const CRC_LEN: usize = 4;

/// One step of the reflected CRC-32 (polynomial 0xEDB88320), without the
/// final XOR. Feed the previous return value to continue over split
/// buffers.
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// CRC-32 of a buffer: initial 0xFFFFFFFF, final XOR 0xFFFFFFFF.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0xFFFF_FFFF, data) ^ 0xFFFF_FFFF
}

/// Keyframe metadata as published on the bus for every selected frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeMetadata {
    pub frame_id: u32,
    pub timestamp_ms: u64,
    pub final_score: f32,
    pub scene_score: f32,
    pub motion_score: f32,
    pub text_score: f32,
    pub is_scene_change: bool,
}

/// Serialize a frame into header + pixels + CRC.
pub fn serialize_frame(frame: &Frame) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(FRAME_HEADER_LEN + frame.data.len() + CRC_LEN);
    buffer.extend_from_slice(&MAGIC.to_le_bytes());
    buffer.push(PROTOCOL_VERSION);
    buffer.push(MSG_TYPE_FRAME);
    buffer.extend_from_slice(&frame.frame_id.to_le_bytes());
    buffer.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
    buffer.extend_from_slice(&frame.width.to_le_bytes());
    buffer.extend_from_slice(&frame.height.to_le_bytes());
    buffer.push(frame.channels);
    buffer.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&frame.data);

    let crc = crc32(&buffer);
    buffer.extend_from_slice(&crc.to_le_bytes());
    buffer
}

/// Parse and verify a frame message.
///
/// Truncation is rejected before the CRC is consulted, so `data_size` is
/// never trusted beyond the buffer bounds.
pub fn deserialize_frame(buffer: &[u8]) -> ProtoResult<Frame> {
    if buffer.len() < FRAME_HEADER_LEN + CRC_LEN {
        return Err(ProtoError::Truncated {
            expected: FRAME_HEADER_LEN + CRC_LEN,
            actual: buffer.len(),
        });
    }

    let magic = read_u32(buffer, 0);
    if magic != MAGIC {
        return Err(ProtoError::BadMagic { found: magic });
    }

    let data_size = read_u32(buffer, 27) as usize;
    let expected = FRAME_HEADER_LEN + data_size + CRC_LEN;
    if buffer.len() != expected {
        return Err(ProtoError::Truncated {
            expected,
            actual: buffer.len(),
        });
    }

    let body = &buffer[..FRAME_HEADER_LEN + data_size];
    let stored_crc = read_u32(buffer, FRAME_HEADER_LEN + data_size);
    if crc32(body) != stored_crc {
        return Err(ProtoError::BadCrc);
    }

    Ok(Frame {
        frame_id: read_u32(buffer, 6),
        timestamp_ms: read_u64(buffer, 10),
        width: read_u32(buffer, 18),
        height: read_u32(buffer, 22),
        channels: buffer[26],
        data: buffer[FRAME_HEADER_LEN..FRAME_HEADER_LEN + data_size].to_vec(),
    })
}

/// Serialize keyframe metadata into its fixed 39-byte form.
pub fn serialize_metadata(meta: &KeyframeMetadata) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(METADATA_LEN);
    buffer.extend_from_slice(&MAGIC.to_le_bytes());
    buffer.push(PROTOCOL_VERSION);
    buffer.push(MSG_TYPE_METADATA);
    buffer.extend_from_slice(&meta.frame_id.to_le_bytes());
    buffer.extend_from_slice(&meta.timestamp_ms.to_le_bytes());
    buffer.extend_from_slice(&meta.final_score.to_le_bytes());
    buffer.extend_from_slice(&meta.scene_score.to_le_bytes());
    buffer.extend_from_slice(&meta.motion_score.to_le_bytes());
    buffer.extend_from_slice(&meta.text_score.to_le_bytes());
    buffer.push(meta.is_scene_change as u8);

    let crc = crc32(&buffer);
    buffer.extend_from_slice(&crc.to_le_bytes());
    buffer
}

/// Parse and verify a keyframe metadata message.
pub fn deserialize_metadata(buffer: &[u8]) -> ProtoResult<KeyframeMetadata> {
    if buffer.len() != METADATA_LEN {
        return Err(ProtoError::Truncated {
            expected: METADATA_LEN,
            actual: buffer.len(),
        });
    }

    let magic = read_u32(buffer, 0);
    if magic != MAGIC {
        return Err(ProtoError::BadMagic { found: magic });
    }

    let body = &buffer[..METADATA_LEN - CRC_LEN];
    let stored_crc = read_u32(buffer, METADATA_LEN - CRC_LEN);
    if crc32(body) != stored_crc {
        return Err(ProtoError::BadCrc);
    }

    Ok(KeyframeMetadata {
        frame_id: read_u32(buffer, 6),
        timestamp_ms: read_u64(buffer, 10),
        final_score: read_f32(buffer, 18),
        scene_score: read_f32(buffer, 22),
        motion_score: read_f32(buffer, 26),
        text_score: read_f32(buffer, 30),
        is_scene_change: buffer[34] != 0,
    })
}

fn read_u32(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buffer[offset..offset + 4].try_into().unwrap())
}

fn read_u64(buffer: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buffer[offset..offset + 8].try_into().unwrap())
}

fn read_f32(buffer: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(buffer[offset..offset + 4].try_into().unwrap())
}
