use crate::bitcoin::hash160::Hash160;
use crate::Result;
use secp256k1::Secp256k1;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A signing key. Key management belongs to the wallet, this type only exists so that inputs can
/// be signed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKey {
    pub inner: secp256k1::SecretKey,
}

impl PrivateKey {
    /// A new random key from the thread-local secure generator.
    pub fn generate() -> PrivateKey {
        PrivateKey {
            inner: secp256k1::SecretKey::new(&mut rand::thread_rng()),
        }
    }

    pub fn from_slice(data: &[u8]) -> Result<PrivateKey> {
        Ok(PrivateKey {
            inner: secp256k1::SecretKey::from_slice(data)?,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self)
    }
}

/// A compressed secp256k1 public key.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PublicKey {
    pub inner: secp256k1::PublicKey,
}

impl PublicKey {
    /// HASH160 of the compressed serialization.
    pub fn pubkey_hash(&self) -> Hash160 {
        Hash160::generate(&self.inner.serialize())
    }

    /// The 33 byte compressed encoding pushed by scripts.
    pub fn to_bytes(self) -> Vec<u8> {
        self.inner.serialize().to_vec()
    }

    pub fn from_slice(data: &[u8]) -> Result<PublicKey> {
        Ok(PublicKey {
            inner: secp256k1::PublicKey::from_slice(data)?,
        })
    }
}

impl From<&PrivateKey> for PublicKey {
    fn from(value: &PrivateKey) -> Self {
        let secp = Secp256k1::signing_only();
        PublicKey {
            inner: secp256k1::PublicKey::from_secret_key(&secp, &value.inner),
        }
    }
}

impl FromStr for PublicKey {
    type Err = crate::Error;

    /// Decode a public key from its hex form as found in scripts.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(PublicKey {
            inner: secp256k1::PublicKey::from_str(s)?,
        })
    }
}
