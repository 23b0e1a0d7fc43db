//! Document value framing.
//!
//! A document value is the 8-byte big-endian revision tag followed by the
//! opaque payload. The engine owns the revision; the payload belongs to the
//! caller.

use super::KeyError;

/// Encode a document value from its revision tag and payload.
#[must_use]
pub fn encode_document_value(revision: u64, payload: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(8 + payload.len());
    value.extend_from_slice(&revision.to_be_bytes());
    value.extend_from_slice(payload);
    value
}

/// Split a document value into its revision tag and payload.
///
/// # Errors
///
/// Returns [`KeyError::MalformedKey`] if the value is shorter than the
/// revision tag.
pub fn decode_document_value(value: &[u8]) -> Result<(u64, &[u8]), KeyError> {
    if value.len() < 8 {
        return Err(KeyError::MalformedKey("document value shorter than revision tag"));
    }
    let rev: [u8; 8] =
        value[..8].try_into().map_err(|_| KeyError::MalformedKey("truncated revision tag"))?;
    Ok((u64::from_be_bytes(rev), &value[8..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_roundtrip() {
        let value = encode_document_value(42, b"payload bytes");
        let (rev, payload) = decode_document_value(&value).unwrap();
        assert_eq!(rev, 42);
        assert_eq!(payload, b"payload bytes");
    }

    #[test]
    fn empty_payload_is_valid() {
        let value = encode_document_value(7, b"");
        let (rev, payload) = decode_document_value(&value).unwrap();
        assert_eq!(rev, 7);
        assert!(payload.is_empty());
    }

    #[test]
    fn short_value_rejected() {
        assert!(decode_document_value(&[1, 2, 3]).is_err());
    }
}
