//! Signature codec: split a 65-byte `r || s || v` ECDSA signature into the
//! components the settlement contract verifies against.

use alloy_primitives::B256;

/// Length of a serialized recoverable ECDSA signature.
pub const SIGNATURE_LEN: usize = 65;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature must be {SIGNATURE_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// The (r, s, v) decomposition of a recoverable signature.
///
/// `v` always follows the legacy Ethereum convention (27/28) when the signer
/// emitted a compact recovery id (0/1). Other values pass through unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitSignature {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl SplitSignature {
    pub fn from_bytes(signature: &[u8]) -> Result<Self, SignatureError> {
        if signature.len() != SIGNATURE_LEN {
            return Err(SignatureError::InvalidLength(signature.len()));
        }
        let r = B256::from_slice(&signature[0..32]);
        let s = B256::from_slice(&signature[32..64]);
        Ok(Self { r, s, v: normalize_v(signature[64]) })
    }

    /// Reassemble `r || s || v` with the normalized recovery id.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[0..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }
}

/// Compact recovery ids (0/1) become 27/28; anything else is left alone.
pub fn normalize_v(raw: u8) -> u8 {
    if raw <= 1 {
        raw + 27
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature_with_v(v: u8) -> Vec<u8> {
        let mut sig = Vec::with_capacity(SIGNATURE_LEN);
        sig.extend_from_slice(&[0x11u8; 32]);
        sig.extend_from_slice(&[0x22u8; 32]);
        sig.push(v);
        sig
    }

    #[test]
    fn test_split_components() {
        let split = SplitSignature::from_bytes(&signature_with_v(27)).unwrap();
        assert_eq!(split.r, B256::repeat_byte(0x11));
        assert_eq!(split.s, B256::repeat_byte(0x22));
        assert_eq!(split.v, 27);
    }

    #[test]
    fn test_v_normalization() {
        let cases = [(0u8, 27u8), (1, 28), (27, 27), (28, 28)];
        for (raw, expected) in cases {
            let split = SplitSignature::from_bytes(&signature_with_v(raw)).unwrap();
            assert_eq!(split.v, expected, "raw v = {raw}");
        }
    }

    #[test]
    fn test_other_v_passes_through() {
        for raw in [2u8, 26, 29, 37, 255] {
            let split = SplitSignature::from_bytes(&signature_with_v(raw)).unwrap();
            assert_eq!(split.v, raw);
            assert!(split.v != 27 && split.v != 28);
        }
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            SplitSignature::from_bytes(&[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
        assert_eq!(
            SplitSignature::from_bytes(&[0u8; 66]),
            Err(SignatureError::InvalidLength(66))
        );
        assert_eq!(SplitSignature::from_bytes(&[]), Err(SignatureError::InvalidLength(0)));
    }

    #[test]
    fn test_to_bytes_keeps_normalized_v() {
        let raw = signature_with_v(1);
        let split = SplitSignature::from_bytes(&raw).unwrap();
        let bytes = split.to_bytes();
        assert_eq!(&bytes[..64], &raw[..64]);
        assert_eq!(bytes[64], 28);
    }
}
