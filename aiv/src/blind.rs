//! RSA blind signatures (RSABSSA-SHA384-PSS-Randomized, RFC 9474).
//!
//! The election authority signs a *blinded* form of the voter's ledger address,
//! never the address itself. After unblinding, the voter holds an ordinary
//! RSASSA-PSS signature over the address that anyone can verify with the
//! election's signing public key, but that the authority cannot link back to
//! the verification request it approved.
//!
//! Voter side: `blind` -> (send blinded message, wait) -> `finalize`.
//! Authority side: `blind_sign`.
//!
//! The blinding inverse returned by `blind` is the only way to turn the blind
//! signature into a usable one. It is not recoverable: losing it means running
//! the whole protocol again from `blind`.

use crate::*;
use num_bigint_dig::ModInverse;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::hazmat::rsa_decrypt_and_check;
use rsa::pss::Pss;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha384};

/// SHA-384 output length
pub const HASH_LENGTH: usize = 48;

/// PSS salt length (equal to the hash length for this suite)
pub const SALT_LENGTH: usize = 48;

/// Length of the random prefix added by randomized message preparation
pub const RANDOMIZER_LENGTH: usize = 32;

// Extra random bytes drawn when sampling the blinding factor, so that the
// reduction modulo n has negligible bias.
const SAMPLING_SLACK: usize = 16;

/// Message preparation applied before blinding (RFC 9474 section 4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// Sign the message as-is. Eligibility credentials use this: the signed
    /// message is exactly the voter's address.
    Identity,
    /// Prefix 32 random bytes; the prepared message must travel with the signature.
    Randomized,
}

/// Prepare a message for blinding
pub fn prepare(message: &[u8], preparation: Preparation) -> Vec<u8> {
    match preparation {
        Preparation::Identity => message.to_vec(),
        Preparation::Randomized => {
            let mut prepared = vec![0u8; RANDOMIZER_LENGTH];
            OsRng.fill_bytes(&mut prepared);
            prepared.extend_from_slice(message);
            prepared
        }
    }
}

/// Secret produced by `blind` and consumed by `finalize`.
///
/// Deliberately not `Clone`, and redacted in `Debug`.
pub struct BlindingInverse(BigUint);

impl BlindingInverse {
    /// Fixed-width big-endian export, for storage on the voter's own device.
    pub fn to_bytes(&self, public_key: &RsaPublicKey) -> Result<Vec<u8>, Error> {
        int_to_bytes(&self.0, public_key.size())
    }

    pub fn from_bytes(public_key: &RsaPublicKey, bytes: &[u8]) -> Result<Self, Error> {
        let k = public_key.size();
        if bytes.len() != k {
            return Err(Error::UnexpectedLength {
                expected: k,
                found: bytes.len(),
            });
        }
        let inverse = BigUint::from_bytes_be(bytes);
        if &inverse >= public_key.n() {
            return Err(Error::MessageRepresentative);
        }
        Ok(BlindingInverse(inverse))
    }
}

impl std::fmt::Debug for BlindingInverse {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("BlindingInverse(..)")
    }
}

/// Output of `blind`
#[derive(Debug)]
pub struct Blinded {
    /// Sent to the signer
    pub blinded_message: Vec<u8>,
    /// Kept by the voter until `finalize`
    pub inverse: BlindingInverse,
}

/// Blind `message` for signing under `public_key`.
///
/// Every call draws a fresh salt and blinding factor, so blinding the same
/// message twice yields unlinkable outputs.
pub fn blind(public_key: &RsaPublicKey, message: &[u8]) -> Result<Blinded, Error> {
    let n = public_key.n();
    let k = public_key.size();

    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    let encoded = emsa_pss_encode(message, n.bits() - 1, &salt)?;

    let m = BigUint::from_bytes_be(&encoded);
    if m.clone().mod_inverse(n).is_none() {
        return Err(Error::MessageRepresentative);
    }

    let (r, inverse) = loop {
        let r = random_below(n);
        if let Some(inverse) = r.clone().mod_inverse(n).and_then(|i| i.to_biguint()) {
            break (r, inverse);
        }
    };

    let x = r.modpow(public_key.e(), n);
    let z = (m * x) % n;

    Ok(Blinded {
        blinded_message: int_to_bytes(&z, k)?,
        inverse: BlindingInverse(inverse),
    })
}

/// Sign a blinded message. Run only by the holder of the signing key, which
/// never sees the unblinded message.
pub fn blind_sign(secret_key: &RsaPrivateKey, blinded_message: &[u8]) -> Result<Vec<u8>, Error> {
    let n = secret_key.n();
    let k = secret_key.size();
    if blinded_message.len() != k {
        return Err(Error::UnexpectedLength {
            expected: k,
            found: blinded_message.len(),
        });
    }

    let m = BigUint::from_bytes_be(blinded_message);
    if &m >= n {
        return Err(Error::MessageRepresentative);
    }

    // CRT with random base blinding; the result is checked against `s^e`
    // because a faulty signature would leak the key's factors.
    let s = rsa_decrypt_and_check(secret_key, Some(&mut OsRng), &m)
        .map_err(|_| Error::SigningFailure)?;

    int_to_bytes(&s, k)
}

/// Unblind a blind signature and check it against `message`.
pub fn finalize(
    public_key: &RsaPublicKey,
    message: &[u8],
    blind_signature: &[u8],
    inverse: &BlindingInverse,
) -> Result<Vec<u8>, Error> {
    let n = public_key.n();
    let k = public_key.size();
    if blind_signature.len() != k {
        return Err(Error::UnexpectedLength {
            expected: k,
            found: blind_signature.len(),
        });
    }

    let z = BigUint::from_bytes_be(blind_signature);
    let s = (z * &inverse.0) % n;
    let signature = int_to_bytes(&s, k)?;

    if !verify(public_key, &signature, message) {
        return Err(Error::InvalidSignature);
    }

    Ok(signature)
}

/// RSASSA-PSS (SHA-384, MGF1-SHA-384, 48 byte salt) verification.
pub fn verify(public_key: &RsaPublicKey, signature: &[u8], message: &[u8]) -> bool {
    let hashed = Sha384::digest(message);
    public_key
        .verify(Pss::new::<Sha384>(), &hashed, signature)
        .is_ok()
}

/// Voter side of a single issuance run, binding an address to its blinding inverse.
///
/// `finalize` consumes the request: a blinding inverse is used exactly once.
#[derive(Debug)]
pub struct CredentialRequest {
    address: String,
    blinded: Blinded,
}

impl CredentialRequest {
    /// Blind `address` (its canonical string form, as UTF-8 bytes)
    pub fn new(public_key: &RsaPublicKey, address: &str) -> Result<Self, Error> {
        let blinded = blind(public_key, address.as_bytes())?;
        Ok(CredentialRequest {
            address: address.to_owned(),
            blinded,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// What the voter submits with their verification request
    pub fn blinded_message(&self) -> &[u8] {
        &self.blinded.blinded_message
    }

    /// Turn the authority's blind signature into the eligibility proof
    pub fn finalize(self, public_key: &RsaPublicKey, blind_signature: &[u8]) -> Result<Vec<u8>, Error> {
        finalize(
            public_key,
            self.address.as_bytes(),
            blind_signature,
            &self.blinded.inverse,
        )
    }

    /// Export for the voter's local storage between request and approval
    pub fn to_stored(&self, public_key: &RsaPublicKey) -> Result<StoredCredentialRequest, Error> {
        Ok(StoredCredentialRequest {
            address: self.address.clone(),
            blinded_message: self.blinded.blinded_message.clone(),
            inverse: self.blinded.inverse.to_bytes(public_key)?,
        })
    }

    pub fn from_stored(
        public_key: &RsaPublicKey,
        stored: &StoredCredentialRequest,
    ) -> Result<Self, Error> {
        Ok(CredentialRequest {
            address: stored.address.clone(),
            blinded: Blinded {
                blinded_message: stored.blinded_message.clone(),
                inverse: BlindingInverse::from_bytes(public_key, &stored.inverse)?,
            },
        })
    }
}

/// Text form of a `CredentialRequest`
#[derive(Serialize, Deserialize, Clone)]
pub struct StoredCredentialRequest {
    pub address: String,
    #[serde(with = "b64")]
    pub blinded_message: Vec<u8>,
    #[serde(with = "b64")]
    pub inverse: Vec<u8>,
}

// EMSA-PSS-ENCODE (RFC 8017 section 9.1.1) with SHA-384 and MGF1-SHA-384
fn emsa_pss_encode(message: &[u8], em_bits: usize, salt: &[u8]) -> Result<Vec<u8>, Error> {
    let em_len = (em_bits + 7) / 8;
    if em_len < HASH_LENGTH + salt.len() + 2 {
        return Err(Error::MalformedKey(
            "modulus too small for SHA-384 PSS encoding".to_owned(),
        ));
    }

    let m_hash = Sha384::digest(message);

    let mut hasher = Sha384::new();
    hasher.update([0u8; 8]);
    hasher.update(m_hash);
    hasher.update(salt);
    let h = hasher.finalize();

    let db_len = em_len - HASH_LENGTH - 1;
    let mut db = vec![0u8; db_len];
    db[db_len - salt.len() - 1] = 0x01;
    db[db_len - salt.len()..].copy_from_slice(salt);

    let mask = mgf1(&h, db_len);
    for (byte, mask) in db.iter_mut().zip(mask) {
        *byte ^= mask;
    }
    db[0] &= 0xffu8 >> (8 * em_len - em_bits);

    let mut em = db;
    em.extend_from_slice(&h);
    em.push(0xbc);
    Ok(em)
}

fn mgf1(seed: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + HASH_LENGTH);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha384::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn random_below(n: &BigUint) -> BigUint {
    let mut bytes = vec![0u8; (n.bits() + 7) / 8 + SAMPLING_SLACK];
    OsRng.fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes) % n
}

fn int_to_bytes(x: &BigUint, len: usize) -> Result<Vec<u8>, Error> {
    let bytes = x.to_bytes_be();
    if bytes.len() > len {
        return Err(Error::UnexpectedLength {
            expected: len,
            found: bytes.len(),
        });
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend(bytes);
    Ok(out)
}
