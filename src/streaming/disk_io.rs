//! Stone serialization and disk I/O
//!
//! Binary layout (little-endian):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | magic `b"STON"`                         |
//! | 4      | 2    | format version (1)                      |
//! | 6      | 1    | encoding: 0 = raw words, 1 = LZ4 block  |
//! | 7      | 1    | reserved, 0                             |
//! | 8      | 12   | `dim_x`, `dim_y`, `dim_z` as u32        |
//! | 20     | ..   | payload: `dim_x * dim_y * dim_z` words  |
//!
//! The LZ4 payload is the raw word payload compressed with a prepended
//! uncompressed size. Only persistent flag bits are stored.
//!
//! Anything not starting with the magic is read as the text format: a
//! `x,y,z` header line followed by one `1`/`0` line per cell in index order.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::UVec3;
use crate::voxel::cell::CellFlags;
use crate::voxel::chunk::VoxelChunk;

/// File magic
pub const MAGIC: [u8; 4] = *b"STON";
/// Current binary format version
pub const FORMAT_VERSION: u16 = 1;
/// Bytes before the payload
pub const HEADER_LEN: usize = 20;

const ENCODING_RAW: u8 = 0;
const ENCODING_LZ4: u8 = 1;
/// Upper bound on LZ4 block expansion per compressed byte
const LZ4_MAX_RATIO: usize = 255;

/// Malformed stone data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("input truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown payload encoding {0}")]
    UnknownEncoding(u8),

    #[error("invalid dimensions {x}x{y}x{z}")]
    InvalidDimensions { x: u32, y: u32, z: u32 },

    #[error("LZ4 decompression failed: {0}")]
    Decompress(String),

    #[error("line {line}: {message}")]
    Text { line: usize, message: String },

    #[error("{0} unexpected trailing bytes")]
    TrailingData(usize),
}

/// On-disk representation chosen for saves
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveFormat {
    /// Binary header + raw words
    Raw,
    /// Binary header + LZ4 compressed words
    #[default]
    Lz4,
    /// One `1`/`0` line per cell
    Text,
}

impl SaveFormat {
    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Raw | SaveFormat::Lz4 => "ston",
            SaveFormat::Text => "txt",
        }
    }
}

/// Validate dimensions and return the cell count
fn cell_count(x: u32, y: u32, z: u32) -> Result<usize, CodecError> {
    let invalid = CodecError::InvalidDimensions { x, y, z };
    if x == 0 || y == 0 || z == 0 {
        return Err(invalid);
    }
    let len = (x as u64) * (y as u64) * (z as u64);
    if len > u32::MAX as u64 {
        return Err(invalid);
    }
    Ok(len as usize)
}

fn persistent_words(chunk: &VoxelChunk) -> Vec<u32> {
    let mask = CellFlags::PERSISTENT.bits();
    chunk.as_words().iter().map(|w| w & mask).collect()
}

fn chunk_from_words(dims: UVec3, words: &[u32]) -> Result<VoxelChunk, CodecError> {
    let mask = CellFlags::PERSISTENT.bits();
    let cells = words.iter().map(|w| CellFlags::from_bits(w & mask)).collect();
    VoxelChunk::from_cells(dims, cells).map_err(|_| CodecError::InvalidDimensions {
        x: dims.x,
        y: dims.y,
        z: dims.z,
    })
}

/// Encode a chunk in the given format
pub fn save_as(chunk: &VoxelChunk, format: SaveFormat) -> Vec<u8> {
    match format {
        SaveFormat::Raw => encode_binary(chunk, ENCODING_RAW),
        SaveFormat::Lz4 => encode_binary(chunk, ENCODING_LZ4),
        SaveFormat::Text => encode_text(chunk).into_bytes(),
    }
}

/// Encode a chunk in the default (LZ4) format
pub fn save(chunk: &VoxelChunk) -> Vec<u8> {
    save_as(chunk, SaveFormat::default())
}

fn encode_binary(chunk: &VoxelChunk, encoding: u8) -> Vec<u8> {
    let words = persistent_words(chunk);
    let raw: &[u8] = bytemuck::cast_slice(&words);
    let payload = match encoding {
        ENCODING_LZ4 => lz4_flex::compress_prepend_size(raw),
        _ => raw.to_vec(),
    };

    let dims = chunk.dims();
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(encoding);
    out.push(0);
    for d in dims.to_array() {
        out.extend_from_slice(&d.to_le_bytes());
    }
    out.extend_from_slice(&payload);
    out
}

/// Encode the filled bits as text
pub fn encode_text(chunk: &VoxelChunk) -> String {
    let dims = chunk.dims();
    // Header plus two bytes per cell
    let mut out = String::with_capacity(32 + chunk.len() * 2);
    let _ = writeln!(out, "{},{},{}", dims.x, dims.y, dims.z);
    for cell in chunk.cells() {
        out.push(if cell.is_filled() { '1' } else { '0' });
        out.push('\n');
    }
    out
}

/// Decode either format
pub fn load(data: &[u8]) -> Result<VoxelChunk, CodecError> {
    if data.starts_with(&MAGIC) {
        decode_binary(data)
    } else {
        decode_text(data)
    }
}

/// Decode into an existing chunk, reallocating when dimensions differ
///
/// Returns `true` when the chunk was replaced with one of a new size. On
/// error the target is left untouched.
pub fn load_into(data: &[u8], chunk: &mut VoxelChunk) -> Result<bool, CodecError> {
    let loaded = load(data)?;
    let resized = loaded.dims() != chunk.dims();
    *chunk = loaded;
    Ok(resized)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Decode the binary format only
pub fn decode_binary(data: &[u8]) -> Result<VoxelChunk, CodecError> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::Truncated { expected: HEADER_LEN, found: data.len() });
    }
    let magic = [data[0], data[1], data[2], data[3]];
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let encoding = data[6];
    let (x, y, z) = (read_u32(data, 8), read_u32(data, 12), read_u32(data, 16));
    let len = cell_count(x, y, z)?;
    let raw_len = len * 4;
    let payload = &data[HEADER_LEN..];

    let raw = match encoding {
        ENCODING_RAW => {
            if payload.len() < raw_len {
                return Err(CodecError::Truncated {
                    expected: HEADER_LEN + raw_len,
                    found: data.len(),
                });
            }
            if payload.len() > raw_len {
                return Err(CodecError::TrailingData(payload.len() - raw_len));
            }
            payload.to_vec()
        }
        ENCODING_LZ4 => {
            if payload.len() < 4 {
                return Err(CodecError::Truncated { expected: HEADER_LEN + 4, found: data.len() });
            }
            // Check the prepended size before lz4_flex allocates for it
            let declared = read_u32(payload, 0) as usize;
            if declared != raw_len {
                return Err(CodecError::Decompress(format!(
                    "declared size {declared} does not match {raw_len} for {x}x{y}x{z}"
                )));
            }
            let compressed = payload.len() - 4;
            if declared > compressed.saturating_mul(LZ4_MAX_RATIO).saturating_add(64) {
                return Err(CodecError::Decompress(format!(
                    "declared size {declared} cannot come from {compressed} compressed bytes"
                )));
            }
            lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| CodecError::Decompress(e.to_string()))?
        }
        other => return Err(CodecError::UnknownEncoding(other)),
    };

    let words: Vec<u32> = bytemuck::pod_collect_to_vec(&raw[..]);
    chunk_from_words(UVec3::new(x, y, z), &words)
}

/// Decode the text format only
pub fn decode_text(data: &[u8]) -> Result<VoxelChunk, CodecError> {
    let text = std::str::from_utf8(data).map_err(|e| CodecError::Text {
        line: 1,
        message: format!("not UTF-8: {e}"),
    })?;
    let mut lines = text.lines().map(str::trim).enumerate();

    let Some((_, header)) = lines.next() else {
        return Err(CodecError::Truncated { expected: 1, found: 0 });
    };
    let body_len = text.split_once('\n').map_or(0, |(_, body)| body.len());
    let dims: Vec<u32> = header
        .split(',')
        .map(|s| s.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| CodecError::Text { line: 1, message: format!("bad header {header:?}: {e}") })?;
    let [x, y, z] = dims[..] else {
        return Err(CodecError::Text {
            line: 1,
            message: format!("expected 3 dimensions, found {}", dims.len()),
        });
    };
    let len = cell_count(x, y, z)?;
    // Every cell takes at least one digit and a newline, the last one maybe without
    let min_body = 2 * len - 1;
    if body_len < min_body {
        return Err(CodecError::Truncated { expected: min_body, found: body_len });
    }

    let mut words = Vec::with_capacity(len);
    for (i, line) in lines.by_ref().take(len) {
        let value: i64 = line.parse().map_err(|e| CodecError::Text {
            line: i + 1,
            message: format!("bad cell value {line:?}: {e}"),
        })?;
        let word = match value {
            1 => CellFlags::FILLED.bits(),
            0 => 0,
            other => {
                return Err(CodecError::Text {
                    line: i + 1,
                    message: format!("cell value {other} is not 0 or 1"),
                })
            }
        };
        words.push(word);
    }
    if words.len() < len {
        return Err(CodecError::Truncated { expected: len, found: words.len() });
    }
    let trailing = lines.filter(|(_, l)| !l.is_empty()).count();
    if trailing > 0 {
        return Err(CodecError::TrailingData(trailing));
    }

    chunk_from_words(UVec3::new(x, y, z), &words)
}

/// Write encoded bytes, creating parent directories
pub async fn save_stone(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, bytes).await
}

/// Read a stone file, `None` if it does not exist
pub async fn load_stone(path: &Path) -> Result<Option<Vec<u8>>, io::Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if a stone file exists
pub async fn stone_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
