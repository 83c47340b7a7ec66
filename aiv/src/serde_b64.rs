//! Base64 helpers for `#[serde(with)]` on binary fields.
//!
//! Blinded messages, signatures and ballot blobs travel through JSON
//! transports as standard (padded) base64.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{de, Deserialize, Deserializer, Serializer};

/// Encode bytes as standard base64
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64
pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s.trim())
}

/// Encode bytes as unpadded base64url, the JWK field encoding
pub fn encode_url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url
pub fn decode_url(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(s.trim_end_matches('='))
}

/// `#[serde(with = "b64")]` for `Vec<u8>`
pub mod b64 {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "b64_option")]` for `Option<Vec<u8>>`, `null` when absent
pub mod b64_option {
    use super::*;

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => decode(&s).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

/// `#[serde(with = "b64_vec")]` for lists of byte vectors (ledger call arguments)
pub mod b64_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let items: Vec<String> = Vec::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| decode(s).map_err(de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapped {
        #[serde(with = "b64")]
        data: Vec<u8>,
        #[serde(with = "b64_option")]
        maybe: Option<Vec<u8>>,
    }

    #[test]
    fn test_wrapped_json() {
        let wrapped = Wrapped {
            data: vec![0, 1, 2, 250],
            maybe: None,
        };
        let json = serde_json::to_string(&wrapped).unwrap();
        assert_eq!(json, r#"{"data":"AAEC+g==","maybe":null}"#);
        let back: Wrapped = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wrapped);
    }

    #[test]
    fn test_url_encoding_has_no_padding() {
        // 65537 is the JWK "e" every RSA key in this crate uses
        assert_eq!(encode_url(&[1, 0, 1]), "AQAB");
        assert_eq!(decode_url("AQAB").unwrap(), vec![1, 0, 1]);
        assert!(decode("not base64!").is_err());
    }
}
