//! Bounded text copies into host-owned buffers.
//!
//! # Invariants
//! - Capacity is checked before the first byte is written; a failed copy
//!   leaves the destination untouched.
//! - Reported lengths are in encoding units (bytes for UTF-8, code units for
//!   UTF-16).

use crate::abi::Encoding;
use crate::error::{ExtError, ExtResult};

/// Copies `src` into the front of `dst` and returns the copied length.
pub fn copy_bounded(src: &[u8], dst: &mut [u8]) -> ExtResult<usize> {
    if dst.len() < src.len() {
        return Err(ExtError::BufferTooSmall {
            required: src.len(),
            capacity: dst.len(),
        });
    }
    dst[..src.len()].copy_from_slice(src);
    Ok(src.len())
}

/// Length of `text` in units of `encoding`.
pub fn encoded_len(text: &str, encoding: Encoding) -> usize {
    match encoding {
        Encoding::Utf8 => text.len(),
        Encoding::Utf16 => text.encode_utf16().count(),
    }
}

/// Writes `text` into `dst` using `encoding` and returns the unit count.
///
/// `dst` is a byte view of the host buffer; its capacity in units is
/// `dst.len() / encoding.unit_size()`.
pub fn write_encoded(text: &str, encoding: Encoding, dst: &mut [u8]) -> ExtResult<usize> {
    match encoding {
        Encoding::Utf8 => copy_bounded(text.as_bytes(), dst),
        Encoding::Utf16 => {
            let units = text.encode_utf16().collect::<Vec<u16>>();
            let capacity = dst.len() / Encoding::Utf16.unit_size();
            if capacity < units.len() {
                return Err(ExtError::BufferTooSmall {
                    required: units.len(),
                    capacity,
                });
            }
            for (chunk, unit) in dst.chunks_exact_mut(2).zip(&units) {
                chunk.copy_from_slice(&unit.to_ne_bytes());
            }
            Ok(units.len())
        }
    }
}

/// Decodes host text held in `src`.
///
/// UTF-16 input is read in native byte order.
pub fn decode_text(src: &[u8], encoding: Encoding) -> ExtResult<String> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(src)
            .map(str::to_string)
            .map_err(|err| ExtError::InvalidText(err.to_string())),
        Encoding::Utf16 => {
            if src.len() % 2 != 0 {
                return Err(ExtError::InvalidText(format!(
                    "utf-16 text has odd byte length {}",
                    src.len()
                )));
            }
            let units = src
                .chunks_exact(2)
                .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                .collect::<Vec<u16>>();
            String::from_utf16(&units).map_err(|err| ExtError::InvalidText(err.to_string()))
        }
    }
}
