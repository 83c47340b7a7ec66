//! Ballot encryption.
//!
//! A ballot is sealed to the election's X25519 encryption key with a NaCl
//! `box` (X25519, HSalsa20, XSalsa20-Poly1305) from a fresh ephemeral key per
//! ballot, the same construction browser clients use.
//!
//! Wire layout: `ephemeral_public (32) || nonce (24) || tag+ciphertext`.
//! Both leading fields have fixed width, so no length prefixes are needed.

use crate::*;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// Length of the ephemeral public key at the front of a blob
pub const EPHEMERAL_KEY_LENGTH: usize = 32;

/// XSalsa20-Poly1305 nonce length
pub const NONCE_LENGTH: usize = 24;

/// Poly1305 tag length
pub const TAG_LENGTH: usize = 16;

/// Ephemeral key plus nonce; anything shorter cannot be framed
pub const HEADER_LENGTH: usize = EPHEMERAL_KEY_LENGTH + NONCE_LENGTH;

fn salsa_box(public: &PublicKey, secret: &StaticSecret) -> SalsaBox {
    SalsaBox::new(
        &crypto_box::PublicKey::from(*public.as_bytes()),
        &crypto_box::SecretKey::from(secret.to_bytes()),
    )
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s secret can read it.
pub fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, Error> {
    let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = salsa_box(recipient, &ephemeral_secret)
        .encrypt(GenericArray::from_slice(&nonce), plaintext)
        .map_err(|_| Error::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(HEADER_LENGTH + ciphertext.len());
    blob.extend_from_slice(ephemeral_public.as_bytes());
    blob.extend_from_slice(&nonce);
    blob.extend(ciphertext);

    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Fails with `MalformedCiphertext` when the blob is too short to frame, and
/// with `DecryptionFailed` when authentication fails (tampering or wrong key).
pub fn decrypt(blob: &[u8], recipient: &StaticSecret) -> Result<Vec<u8>, Error> {
    if blob.len() < HEADER_LENGTH {
        return Err(Error::MalformedCiphertext);
    }

    let mut ephemeral_bytes = [0u8; EPHEMERAL_KEY_LENGTH];
    ephemeral_bytes.copy_from_slice(&blob[..EPHEMERAL_KEY_LENGTH]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let nonce = GenericArray::from_slice(&blob[EPHEMERAL_KEY_LENGTH..HEADER_LENGTH]);
    let ciphertext = &blob[HEADER_LENGTH..];

    salsa_box(&ephemeral_public, recipient)
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

/// The plaintext record inside an encrypted ballot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BallotPayload {
    #[serde(deserialize_with = "candidate_id_from_string_or_number")]
    pub candidate_id: String,
}

impl BallotPayload {
    pub fn new(candidate_id: impl Into<String>) -> Self {
        BallotPayload {
            candidate_id: candidate_id.into(),
        }
    }

    /// Compact JSON, e.g. `{"candidate_id":"A"}`
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let payload: BallotPayload =
            serde_json::from_slice(bytes).map_err(|e| Error::MalformedPayload(e.to_string()))?;
        if payload.candidate_id.is_empty() {
            return Err(Error::MalformedPayload("empty candidate_id".to_owned()));
        }
        Ok(payload)
    }
}

// Older clients encode numeric candidate ids as JSON numbers.
fn candidate_id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
    }

    Ok(match <RawId as serde::Deserialize>::deserialize(deserializer)? {
        RawId::Str(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

/// Encrypt a vote for `candidate_id` to the election's encryption key.
pub fn encrypt_ballot(candidate_id: &str, encryption_public: &PublicKey) -> Result<Vec<u8>, Error> {
    encrypt(&BallotPayload::new(candidate_id).to_bytes()?, encryption_public)
}

/// Decrypt and parse a ballot blob.
pub fn decrypt_ballot(blob: &[u8], encryption_secret: &StaticSecret) -> Result<BallotPayload, Error> {
    let plaintext = decrypt(blob, encryption_secret)?;
    BallotPayload::from_bytes(&plaintext)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_both_sides_derive_the_same_box() {
        let recipient = EncryptionKeyPair::generate();
        let ephemeral = EncryptionKeyPair::generate();

        let nonce = [3u8; NONCE_LENGTH];
        let sealed = salsa_box(&recipient.public, &ephemeral.secret)
            .encrypt(GenericArray::from_slice(&nonce), &b"A"[..])
            .unwrap();
        let opened = salsa_box(&ephemeral.public, &recipient.secret)
            .decrypt(GenericArray::from_slice(&nonce), &sealed[..])
            .unwrap();
        assert_eq!(opened, b"A");
    }

    #[test]
    fn test_encrypt_decrypt() {
        let recipient = EncryptionKeyPair::generate();

        let plaintexts: [&[u8]; 4] = [b"", b"A", br#"{"candidate_id":"B"}"#, &[0xffu8; 1000]];
        for plaintext in plaintexts {
            let blob = encrypt(plaintext, &recipient.public).unwrap();
            assert_eq!(blob.len(), HEADER_LENGTH + TAG_LENGTH + plaintext.len());
            assert_eq!(decrypt(&blob, &recipient.secret).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_randomness_per_ballot() {
        let recipient = EncryptionKeyPair::generate();
        let a = encrypt(b"same vote", &recipient.public).unwrap();
        let b = encrypt(b"same vote", &recipient.public).unwrap();

        assert_ne!(a[..EPHEMERAL_KEY_LENGTH], b[..EPHEMERAL_KEY_LENGTH]);
        assert_ne!(a[EPHEMERAL_KEY_LENGTH..HEADER_LENGTH], b[EPHEMERAL_KEY_LENGTH..HEADER_LENGTH]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_cleanly() {
        let recipient = EncryptionKeyPair::generate();
        let other = EncryptionKeyPair::generate();

        let blob = encrypt(b"candidate A", &recipient.public).unwrap();
        assert!(matches!(
            decrypt(&blob, &other.secret),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_every_byte_flip_is_detected() {
        let recipient = EncryptionKeyPair::generate();
        let blob = encrypt(br#"{"candidate_id":"A"}"#, &recipient.public).unwrap();

        for i in 0..blob.len() {
            for mask in [0x01u8, 0x80] {
                // X25519 ignores the top bit of a public key
                if i == EPHEMERAL_KEY_LENGTH - 1 && mask == 0x80 {
                    continue;
                }
                let mut tampered = blob.clone();
                tampered[i] ^= mask;
                assert!(
                    matches!(decrypt(&tampered, &recipient.secret), Err(Error::DecryptionFailed)),
                    "flip of byte {} with mask {:#x} went undetected",
                    i,
                    mask
                );
            }
        }
    }

    #[test]
    fn test_short_blob_is_malformed() {
        let recipient = EncryptionKeyPair::generate();
        assert!(matches!(
            decrypt(&[0u8; HEADER_LENGTH - 1], &recipient.secret),
            Err(Error::MalformedCiphertext)
        ));
        // Framed but carrying no tag
        assert!(matches!(
            decrypt(&[0u8; HEADER_LENGTH], &recipient.secret),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_ballot_payload() {
        let recipient = EncryptionKeyPair::generate();

        let blob = encrypt_ballot("candidate-7", &recipient.public).unwrap();
        let payload = decrypt_ballot(&blob, &recipient.secret).unwrap();
        assert_eq!(payload.candidate_id, "candidate-7");

        assert_eq!(
            BallotPayload::from_bytes(br#"{"candidate_id":1}"#).unwrap(),
            BallotPayload::new("1")
        );
        assert!(BallotPayload::from_bytes(b"{}").is_err());
        assert!(BallotPayload::from_bytes(br#"{"candidate_id":""}"#).is_err());
        assert!(BallotPayload::from_bytes(b"\xff\xfe").is_err());
    }
}
