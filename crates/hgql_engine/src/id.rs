//! `ID` values: base64 encoded byte strings.

use crate::resolver::ResolverError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Encodes raw id bytes as an `ID` string.
pub fn encode_id(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decodes an `ID` string to raw bytes.
pub fn decode_id(id: &str) -> Result<Vec<u8>, ResolverError> {
    STANDARD
        .decode(id)
        .map_err(|e| ResolverError::custom(format!("Invalid ID \"{id}\": {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_ids() {
        assert_eq!(encode_id("fakeAppointmentId"), "ZmFrZUFwcG9pbnRtZW50SWQ=");
        assert_eq!(encode_id("fakeTaskId"), "ZmFrZVRhc2tJZA==");
        assert_eq!(encode_id("fakeFolderId"), "ZmFrZUZvbGRlcklk");
        assert_eq!(decode_id("ZmFrZVRhc2tJZA==").unwrap(), b"fakeTaskId");
    }

    #[test]
    fn test_invalid_id() {
        assert!(decode_id("not base64!").is_err());
    }
}
