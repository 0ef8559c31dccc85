//! Binary codec for the embedding matrix
//!
//! Layout before compression (little endian):
//! `DQEM` | u32 format version | u64 rows | u64 cols | rows*cols f32
//! The whole buffer is zstd-compressed.

use super::PersistenceError;

const MAGIC: &[u8; 4] = b"DQEM";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;
const COMPRESSION_LEVEL: i32 = 3;

/// Encode equally sized rows into a compressed matrix artifact
pub fn encode(rows: &[Vec<f32>], cols: usize) -> Result<Vec<u8>, PersistenceError> {
    if let Some((row, vector)) = rows.iter().enumerate().find(|(_, v)| v.len() != cols) {
        return Err(PersistenceError::Corrupt(format!(
            "row {} has {} values, expected {}",
            row,
            vector.len(),
            cols
        )));
    }

    let mut raw = Vec::with_capacity(HEADER_LEN + rows.len() * cols * 4);
    raw.extend_from_slice(MAGIC);
    raw.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    raw.extend_from_slice(&(rows.len() as u64).to_le_bytes());
    raw.extend_from_slice(&(cols as u64).to_le_bytes());
    for value in rows.iter().flatten() {
        raw.extend_from_slice(&value.to_le_bytes());
    }

    zstd::encode_all(&raw[..], COMPRESSION_LEVEL).map_err(|e| PersistenceError::Io {
        source: e,
        context: "Failed to compress embedding matrix".to_string(),
    })
}

/// Decode a compressed matrix artifact into rows
pub fn decode(bytes: &[u8]) -> Result<(Vec<Vec<f32>>, usize), PersistenceError> {
    let raw = zstd::decode_all(bytes)
        .map_err(|e| PersistenceError::Corrupt(format!("embedding matrix: {}", e)))?;

    if raw.len() < HEADER_LEN || &raw[..4] != MAGIC {
        return Err(PersistenceError::Corrupt(
            "embedding matrix has no valid header".to_string(),
        ));
    }

    let version = u32::from_le_bytes(read_array(&raw[4..8]));
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Corrupt(format!(
            "unsupported embedding matrix version {}",
            version
        )));
    }

    let rows = u64::from_le_bytes(read_array(&raw[8..16])) as usize;
    let cols = u64::from_le_bytes(read_array(&raw[16..24])) as usize;

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN));
    if expected != Some(raw.len()) {
        return Err(PersistenceError::Corrupt(format!(
            "embedding matrix declares {}x{} but holds {} bytes",
            rows,
            cols,
            raw.len()
        )));
    }

    let values: Vec<f32> = raw[HEADER_LEN..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(read_array(b)))
        .collect();

    let matrix = if cols == 0 {
        vec![Vec::new(); rows]
    } else {
        values.chunks_exact(cols).map(|row| row.to_vec()).collect()
    };

    Ok((matrix, cols))
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
