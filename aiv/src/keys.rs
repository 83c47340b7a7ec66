//! Per-election key material.
//!
//! Every election owns two independent key pairs:
//!   - an X25519 *encryption* pair, whose secret stays with the election
//!     authority until tally time and is published once the election ends;
//!   - an RSA-2048 *signing* pair used only for blind eligibility signatures.
//!     Its secret is never disclosed.

use crate::*;
use num_bigint_dig::ModInverse;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use x25519_dalek::{PublicKey, StaticSecret};

/// RSA modulus size for eligibility signing keys
pub const SIGNING_KEY_BITS: usize = 2048;

/// RSA public exponent (65537)
pub const SIGNING_KEY_EXPONENT: u32 = 65537;

/// Length of X25519 public and secret keys
pub const ENCRYPTION_KEY_LENGTH: usize = 32;

/// X25519 key pair used to encrypt ballots to the election authority
#[derive(Clone)]
pub struct EncryptionKeyPair {
    pub public: PublicKey,
    pub secret: StaticSecret,
}

impl EncryptionKeyPair {
    /// Generate a fresh key pair from the OS CSPRNG
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        EncryptionKeyPair { public, secret }
    }

    /// Rebuild a key pair from its secret half
    pub fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        EncryptionKeyPair { public, secret }
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Parse a base64 X25519 public key
pub fn encryption_public_from_base64(s: &str) -> Result<PublicKey, Error> {
    let bytes = key_bytes(s)?;
    Ok(PublicKey::from(bytes))
}

/// Parse a base64 X25519 secret key
pub fn encryption_secret_from_base64(s: &str) -> Result<StaticSecret, Error> {
    let bytes = key_bytes(s)?;
    Ok(StaticSecret::from(bytes))
}

fn key_bytes(s: &str) -> Result<[u8; ENCRYPTION_KEY_LENGTH], Error> {
    let bytes = serde_b64::decode(s).map_err(|e| Error::MalformedKey(e.to_string()))?;
    let found = bytes.len();
    bytes.try_into().map_err(|_| {
        Error::MalformedKey(format!(
            "X25519 key must be {} bytes, found {}",
            ENCRYPTION_KEY_LENGTH, found
        ))
    })
}

/// RSA key pair used for blind eligibility signatures
#[derive(Clone)]
pub struct SigningKeyPair {
    pub public: RsaPublicKey,
    pub secret: RsaPrivateKey,
}

impl SigningKeyPair {
    /// Generate an RSA-2048 key pair with exponent 65537
    pub fn generate() -> Result<Self, Error> {
        let mut rng = OsRng;
        let secret = RsaPrivateKey::new(&mut rng, SIGNING_KEY_BITS)?;
        let public = secret.to_public_key();
        Ok(SigningKeyPair { public, secret })
    }

    /// Rebuild a key pair from a private JWK
    pub fn from_jwk(jwk: &RsaJwk) -> Result<Self, Error> {
        let secret = jwk.to_private_key()?;
        let public = secret.to_public_key();
        Ok(SigningKeyPair { public, secret })
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("modulus_bits", &self.public.n().bits())
            .finish_non_exhaustive()
    }
}

/// An RSA key in JSON Web Key form, restricted to RSA-PSS / SHA-384.
///
/// Field values are unpadded base64url big-endian integers. The private
/// members are absent on public keys.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RsaJwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

const JWK_ALG: &str = "PS384";

fn jwk_int(n: &BigUint) -> String {
    serde_b64::encode_url(&n.to_bytes_be())
}

fn jwk_field(name: &str, value: Option<&String>) -> Result<BigUint, Error> {
    let value = value.ok_or_else(|| Error::MalformedKey(format!("JWK is missing '{}'", name)))?;
    let bytes = serde_b64::decode_url(value)
        .map_err(|e| Error::MalformedKey(format!("JWK field '{}': {}", name, e)))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

impl RsaJwk {
    /// Export a public key
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        RsaJwk {
            kty: "RSA".to_owned(),
            alg: Some(JWK_ALG.to_owned()),
            n: jwk_int(key.n()),
            e: jwk_int(key.e()),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
        }
    }

    /// Export a private key, including CRT parameters
    pub fn from_private_key(key: &RsaPrivateKey) -> Result<Self, Error> {
        let primes = key.primes();
        if primes.len() != 2 {
            return Err(Error::MalformedKey(
                "multi-prime RSA keys cannot be exported".to_owned(),
            ));
        }
        let (p, q) = (&primes[0], &primes[1]);
        let one = BigUint::from(1u32);
        let dp = key.d() % (p - &one);
        let dq = key.d() % (q - &one);
        let qi = q
            .clone()
            .mod_inverse(p)
            .and_then(|qi| qi.to_biguint())
            .ok_or_else(|| Error::MalformedKey("q is not invertible modulo p".to_owned()))?;

        let mut jwk = RsaJwk::from_public_key(&key.to_public_key());
        jwk.d = Some(jwk_int(key.d()));
        jwk.p = Some(jwk_int(p));
        jwk.q = Some(jwk_int(q));
        jwk.dp = Some(jwk_int(&dp));
        jwk.dq = Some(jwk_int(&dq));
        jwk.qi = Some(jwk_int(&qi));
        Ok(jwk)
    }

    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    fn check_kty(&self) -> Result<(), Error> {
        if self.kty != "RSA" {
            return Err(Error::MalformedKey(format!(
                "expected JWK kty 'RSA', found '{}'",
                self.kty
            )));
        }
        match self.alg.as_deref() {
            None | Some(JWK_ALG) => Ok(()),
            Some(other) => Err(Error::MalformedKey(format!(
                "expected JWK alg '{}', found '{}'",
                JWK_ALG, other
            ))),
        }
    }

    /// Import as a public key
    pub fn to_public_key(&self) -> Result<RsaPublicKey, Error> {
        self.check_kty()?;
        let n = jwk_field("n", Some(&self.n))?;
        let e = jwk_field("e", Some(&self.e))?;
        Ok(RsaPublicKey::new(n, e)?)
    }

    /// Import as a private key. `dp`, `dq` and `qi` are recomputed rather than trusted.
    pub fn to_private_key(&self) -> Result<RsaPrivateKey, Error> {
        self.check_kty()?;
        let n = jwk_field("n", Some(&self.n))?;
        let e = jwk_field("e", Some(&self.e))?;
        let d = jwk_field("d", self.d.as_ref())?;
        let p = jwk_field("p", self.p.as_ref())?;
        let q = jwk_field("q", self.q.as_ref())?;

        let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q])?;
        key.validate()?;
        key.precompute()?;
        Ok(key)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::MalformedKey(e.to_string()))
    }
}

/// Both key pairs of one election, as held by the election authority
#[derive(Clone, Debug)]
pub struct ElectionKeys {
    pub encryption: EncryptionKeyPair,
    pub signing: SigningKeyPair,
}

impl ElectionKeys {
    /// Generate both key pairs for a new election
    pub fn generate() -> Result<Self, Error> {
        Ok(ElectionKeys {
            encryption: EncryptionKeyPair::generate(),
            signing: SigningKeyPair::generate()?,
        })
    }

    /// The public halves, safe to hand to voters
    pub fn public(&self) -> ElectionPublicKeys {
        ElectionPublicKeys {
            encryption_public: serde_b64::encode(self.encryption.public.as_bytes()),
            signing_public: RsaJwk::from_public_key(&self.signing.public),
        }
    }

    /// Base64 of the encryption secret, for publication after the election has ended
    pub fn disclose_encryption_secret(&self) -> String {
        serde_b64::encode(&self.encryption.secret.to_bytes())
    }

    /// Persistable text form
    pub fn to_stored(&self) -> Result<StoredElectionKeys, Error> {
        Ok(StoredElectionKeys {
            encryption_public: serde_b64::encode(self.encryption.public.as_bytes()),
            encryption_private: self.disclose_encryption_secret(),
            signing_public: RsaJwk::from_public_key(&self.signing.public),
            signing_private: RsaJwk::from_private_key(&self.signing.secret)?,
        })
    }

    /// Re-import from the persisted text form
    pub fn from_stored(stored: &StoredElectionKeys) -> Result<Self, Error> {
        let encryption = EncryptionKeyPair::from_secret(encryption_secret_from_base64(
            &stored.encryption_private,
        )?);
        if encryption.public.as_bytes()
            != encryption_public_from_base64(&stored.encryption_public)?.as_bytes()
        {
            return Err(Error::MalformedKey(
                "encryption public key does not match the secret key".to_owned(),
            ));
        }

        let signing = SigningKeyPair::from_jwk(&stored.signing_private)?;
        if signing.public != stored.signing_public.to_public_key()? {
            return Err(Error::MalformedKey(
                "signing public key does not match the private key".to_owned(),
            ));
        }

        Ok(ElectionKeys {
            encryption,
            signing,
        })
    }
}

/// The public keys of an election, in text form
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElectionPublicKeys {
    /// Base64 X25519 public key
    pub encryption_public: String,
    pub signing_public: RsaJwk,
}

impl ElectionPublicKeys {
    pub fn encryption_key(&self) -> Result<PublicKey, Error> {
        encryption_public_from_base64(&self.encryption_public)
    }

    pub fn signing_key(&self) -> Result<RsaPublicKey, Error> {
        self.signing_public.to_public_key()
    }
}

/// Both key pairs in text form, as written to a key file or document store
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredElectionKeys {
    pub encryption_public: String,
    pub encryption_private: String,
    pub signing_public: RsaJwk,
    pub signing_private: RsaJwk,
}
