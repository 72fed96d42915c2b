//! Key material for the crypto adapter (spec.md §4.3).

use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A symmetric key triple derived for one direction of traffic: a signing
/// key, an encrypting key, and an initialization vector.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKeys {
    /// HMAC key.
    pub signing_key: Vec<u8>,
    /// AES-CBC key.
    pub encrypting_key: Vec<u8>,
    /// AES-CBC initialization vector.
    pub iv: Vec<u8>,
}

impl std::fmt::Debug for SymmetricKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKeys").finish_non_exhaustive()
    }
}

/// An RSA key pair used for asymmetric signing/encryption during channel
/// establishment. `RsaPrivateKey` zeroizes itself on drop.
pub struct AsymmetricKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl AsymmetricKeyPair {
    /// Wrap an existing private key, deriving the matching public key.
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    /// The private key, for signing and decryption.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// The public key, for verification and encryption.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }
}
