//! Binary encoding of the vector buffer (`index.bin`).
//!
//! Layout, all integers and floats little-endian:
//!
//! ```text
//! "SRFLATL2"  8 bytes   magic
//! version     u32
//! dimension   u32
//! count       u64
//! vectors     count * dimension * f32
//! ```

/// File magic identifying a flat L2 vector buffer.
pub const MAGIC: &[u8; 8] = b"SRFLATL2";

/// Version of the binary layout.
pub const INDEX_FILE_VERSION: u32 = 1;

const HEADER_LEN: usize = 8 + 4 + 4 + 8;

/// Vectors read back from `index.bin`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVectors {
    pub dimension: usize,
    pub count: usize,
    pub vectors: Vec<f32>,
}

pub fn encode(dimension: usize, vectors: &[f32]) -> Result<Vec<u8>, String> {
    if dimension == 0 || vectors.len() % dimension != 0 {
        return Err(format!(
            "{} values do not form rows of dimension {}",
            vectors.len(),
            dimension
        ));
    }
    let dim = u32::try_from(dimension).map_err(|_| format!("dimension {dimension} too large"))?;
    let count = (vectors.len() / dimension) as u64;

    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&INDEX_FILE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&dim.to_le_bytes());
    bytes.extend_from_slice(&count.to_le_bytes());
    for value in vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<DecodedVectors, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if &header[0..8] != MAGIC {
        return Err("bad magic, not a flat L2 index file".to_string());
    }

    let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if version != INDEX_FILE_VERSION {
        return Err(format!("unsupported index file version {version}"));
    }
    let dimension = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[16..24]);
    let count = usize::try_from(u64::from_le_bytes(count_bytes))
        .map_err(|_| "vector count does not fit in memory".to_string())?;

    if dimension == 0 {
        return Err("dimension is zero".to_string());
    }
    let expected_len = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "vector data size overflows".to_string())?;
    if body.len() != expected_len {
        return Err(format!(
            "expected {} bytes of vector data for {} x {}, found {}",
            expected_len,
            count,
            dimension,
            body.len()
        ));
    }

    let vectors = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(DecodedVectors {
        dimension,
        count,
        vectors,
    })
}
