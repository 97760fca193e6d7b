//! On-disk framing for master products.
//!
//! ```text
//! [4 bytes: magic "SPRM"]
//! [2 bytes: format version (little-endian u16)]
//! [1 byte : product kind tag]
//! [1 byte : reserved, zero]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [4 bytes: payload length (little-endian u32)]
//! [N bytes: payload (bincode-serialized CalibProduct)]
//! ```

use specred_types::{CalibProduct, ProductKind};

use crate::error::{StoreError, StoreResult};
use crate::key::MasterKey;

const MAGIC: &[u8; 4] = b"SPRM";
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Frame a product for persistence.
pub fn encode_master(product: &CalibProduct) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(product).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization(format!("payload too large: {}", payload.len())))?;
    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(product.kind().tag_byte());
    out.push(0);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a framed master, verifying it belongs to `key`.
///
/// Every framing or payload defect is reported as [`StoreError::Corrupt`].
pub fn decode_master(key: &MasterKey, data: &[u8]) -> StoreResult<CalibProduct> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.clone(),
        reason,
    };

    if data.len() < HEADER_SIZE {
        return Err(corrupt(format!(
            "truncated header: {} of {HEADER_SIZE} bytes",
            data.len()
        )));
    }
    if &data[0..4] != MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let kind = ProductKind::from_tag_byte(data[6])
        .ok_or_else(|| corrupt(format!("unknown kind tag {}", data[6])))?;
    if kind != key.kind {
        return Err(corrupt(format!("holds {kind}, expected {}", key.kind)));
    }
    let expected_crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let length = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;

    let payload = &data[HEADER_SIZE..];
    if payload.len() != length {
        return Err(corrupt(format!(
            "payload length {} does not match header {length}",
            payload.len()
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(corrupt(format!(
            "CRC mismatch: expected {expected_crc:#010x}, computed {actual_crc:#010x}"
        )));
    }

    let product: CalibProduct =
        bincode::deserialize(payload).map_err(|e| corrupt(format!("undecodable payload: {e}")))?;
    if product.kind() != key.kind {
        return Err(corrupt(format!(
            "payload holds {}, expected {}",
            product.kind(),
            key.kind
        )));
    }
    Ok(product)
}
