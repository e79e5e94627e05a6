//! Section framing
//!
//! After the header a save carries six sections in a fixed order. Each one
//! is framed as a `u32` physical length followed by that many bytes; when the
//! header's compression flag is set the bytes are an independent zlib stream.
//! A failure inside one frame never affects its neighbours.

use std::fmt;
use std::io::Read;

use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CodecConfig;
use crate::cursor::{ByteReader, ByteWriter};
use crate::document::SaveHeader;
use crate::error::{Result, SaveError};

/// Logical regions of a save stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Header,
    Templates,
    World,
    Settings,
    Sim,
    GameObjects,
    GameData,
    /// Cursor-level errors before they are attributed to a section
    Unknown,
}

impl SectionKind {
    /// Framed sections in stream order.
    pub const FRAMED: [SectionKind; 6] = [
        SectionKind::Templates,
        SectionKind::World,
        SectionKind::Settings,
        SectionKind::Sim,
        SectionKind::GameObjects,
        SectionKind::GameData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Header => "header",
            SectionKind::Templates => "templates",
            SectionKind::World => "world",
            SectionKind::Settings => "settings",
            SectionKind::Sim => "sim",
            SectionKind::GameObjects => "game_objects",
            SectionKind::GameData => "game_data",
            SectionKind::Unknown => "unknown",
        }
    }

    /// Next framed section, `None` after game data.
    pub fn next(&self) -> Option<SectionKind> {
        let idx = Self::FRAMED.iter().position(|k| k == self)?;
        Self::FRAMED.get(idx + 1).copied()
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a section ended up in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Decoded,
    Opaque,
    Unreadable,
    Missing,
}

/// Per-section diagnostics recorded while parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub kind: SectionKind,
    /// Offset of the length prefix in the stream
    pub offset: usize,
    pub physical_len: usize,
    pub logical_len: Option<usize>,
    /// SHA-256 of the logical bytes
    pub sha256: Option<String>,
    pub status: SectionStatus,
}

impl SectionInfo {
    pub fn missing(kind: SectionKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            physical_len: 0,
            logical_len: None,
            sha256: None,
            status: SectionStatus::Missing,
        }
    }
}

/// One raw frame borrowed from the input.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub offset: usize,
    pub data_offset: usize,
    pub physical: &'a [u8],
}

/// Read the next `u32`-length-prefixed frame.
pub fn read_frame<'a>(reader: &mut ByteReader<'a>) -> Result<Frame<'a>> {
    let offset = reader.offset();
    let len = reader.read_u32()? as usize;
    let data_offset = reader.offset();
    let physical = reader.read_bytes(len)?;
    Ok(Frame { offset, data_offset, physical })
}

pub fn write_frame(writer: &mut ByteWriter, physical: &[u8]) {
    writer.write_u32(physical.len() as u32);
    writer.write_bytes(physical);
}

/// Turn logical section bytes into their on-disk form.
pub fn frame_section(logical: &[u8], compressed: bool, level: u32) -> Result<Vec<u8>> {
    if !compressed {
        return Ok(logical.to_vec());
    }
    let mut encoder = ZlibEncoder::new(logical, Compression::new(level.min(9)));
    let mut physical = Vec::with_capacity(logical.len() / 2 + 16);
    encoder.read_to_end(&mut physical).map_err(|e| SaveError::CompressionError {
        section: SectionKind::Unknown,
        message: format!("compression failed: {}", e),
    })?;
    Ok(physical)
}

/// Recover logical section bytes, refusing output larger than `max_size`.
pub fn unframe_section(physical: &[u8], compressed: bool, max_size: usize) -> Result<Vec<u8>> {
    if !compressed {
        return Ok(physical.to_vec());
    }
    let compression_error = |message: String| SaveError::CompressionError {
        section: SectionKind::Unknown,
        message,
    };

    let mut decoder = ZlibDecoder::new(physical);
    let mut logical = Vec::with_capacity(max_size.min(physical.len() * 4));

    // Read in chunks to enforce the size limit
    let mut buffer = [0u8; 8192];
    loop {
        match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if logical.len() + n > max_size {
                    return Err(compression_error(format!(
                        "decompressed size exceeds limit of {} bytes",
                        max_size
                    )));
                }
                logical.extend_from_slice(&buffer[..n]);
            }
            Err(e) => return Err(compression_error(format!("decompression failed: {}", e))),
        }
    }

    // Bytes after the end of the zlib stream would be lost on rewrite
    let consumed = decoder.total_in() as usize;
    if consumed != physical.len() {
        return Err(compression_error(format!(
            "zlib stream ended after {} of {} bytes",
            consumed,
            physical.len()
        )));
    }
    Ok(logical)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Re-frame a whole stream with every section decompressed.
///
/// The header is copied verbatim (compression flag included) so two streams
/// carrying the same content produce identical images whatever compressor
/// wrote them. Frames that do not decompress are copied as stored. Stops
/// quietly at the end of the input; bytes after the last frame are appended
/// unchanged.
pub fn logical_image(bytes: &[u8], config: &CodecConfig) -> Result<Vec<u8>> {
    let mut reader = ByteReader::new(bytes);
    let header = SaveHeader::read(&mut reader)?;
    let header_len = reader.position();

    let mut out = ByteWriter::new();
    out.write_bytes(&bytes[..header_len]);

    for kind in SectionKind::FRAMED {
        if reader.is_empty() {
            return Ok(out.into_inner());
        }
        let frame = read_frame(&mut reader)?;
        match unframe_section(frame.physical, header.is_compressed(), config.max_section_size) {
            Ok(logical) => write_frame(&mut out, &logical),
            Err(error) => {
                // Unreadable sections are written back as stored
                log::debug!("{} section kept as stored: {}", kind, error);
                write_frame(&mut out, frame.physical);
            }
        }
    }
    out.write_bytes(reader.read_rest());
    Ok(out.into_inner())
}
