//! The stateless crypto adapter (C3, spec.md §4.3).
//!
//! Every operation takes its key material as an argument; the adapter
//! itself holds nothing but the negotiated [`SecurityPolicy`], mirroring the
//! teacher's `CryptoSession` split between long-lived session state and the
//! actual cipher calls it delegates to `snow`/`chacha20poly1305` (here:
//! `aes`/`cbc`/`hmac`/`rsa`).

use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::keys::SymmetricKeys;
use super::policy::{AsymmetricPadding, SecurityPolicy};
use crate::core::CryptoError;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// A stateless view over one negotiated security policy's cryptographic
/// operations (spec.md §4.3's full capability set).
#[derive(Debug, Clone, Copy)]
pub struct CryptoAdapter {
    policy: SecurityPolicy,
}

impl CryptoAdapter {
    /// Bind the adapter to a policy; every call below is parameterized by
    /// the key material passed in, not by any state stored here.
    pub fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }

    /// The bound policy.
    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// SHA-256 digest of `data` (the `hash` capability).
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    /// HMAC-SHA256 over `data` under `key` (`sign-symmetric`).
    pub fn sign_symmetric(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| CryptoError::SignFailed(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Verify an HMAC-SHA256 tag (`verify-symmetric`).
    pub fn verify_symmetric(&self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<(), CryptoError> {
        let mut mac =
            HmacSha256::new_from_slice(key).map_err(|_| CryptoError::VerifyFailed)?;
        mac.update(data);
        mac.verify_slice(tag).map_err(|_| CryptoError::VerifyFailed)
    }

    /// AES-CBC encrypt with PKCS#7 padding (`encrypt-symmetric`); the key
    /// length (16 or 32 bytes) selects AES-128 vs AES-256.
    pub fn encrypt_symmetric(&self, keys: &SymmetricKeys, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match keys.encrypting_key.len() {
            16 => {
                let enc = Aes128CbcEnc::new_from_slices(&keys.encrypting_key, &keys.iv)
                    .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?;
                Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
            32 => {
                let enc = Aes256CbcEnc::new_from_slices(&keys.encrypting_key, &keys.iv)
                    .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?;
                Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
            other => Err(CryptoError::EncryptFailed(format!("unsupported key length {other}"))),
        }
    }

    /// AES-CBC decrypt, rejecting bad padding as `DecryptFailed`
    /// (`decrypt-symmetric`).
    pub fn decrypt_symmetric(&self, keys: &SymmetricKeys, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match keys.encrypting_key.len() {
            16 => {
                let dec = Aes128CbcDec::new_from_slices(&keys.encrypting_key, &keys.iv)
                    .map_err(|_| CryptoError::DecryptFailed)?;
                dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| CryptoError::DecryptFailed)
            }
            32 => {
                let dec = Aes256CbcDec::new_from_slices(&keys.encrypting_key, &keys.iv)
                    .map_err(|_| CryptoError::DecryptFailed)?;
                dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| CryptoError::DecryptFailed)
            }
            _ => Err(CryptoError::DecryptFailed),
        }
    }

    /// Sign with the asymmetric algorithm the policy fixes
    /// (`sign-asymmetric`): PKCS#1 v1.5 for the OAEP-only policies,
    /// RSA-PSS-SHA256 for `Aes256Sha256RsaPss`.
    pub fn sign_asymmetric(&self, key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = Sha256::digest(data);
        match self.policy.profile().asymmetric_padding {
            AsymmetricPadding::OaepSha1PssSha256 => {
                let mut rng = rand::rngs::OsRng;
                key.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)
                    .map_err(|e| CryptoError::SignFailed(e.to_string()))
            }
            _ => key
                .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                .map_err(|e| CryptoError::SignFailed(e.to_string())),
        }
    }

    /// Verify an asymmetric signature (`verify-asymmetric`).
    pub fn verify_asymmetric(&self, key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let digest = Sha256::digest(data);
        match self.policy.profile().asymmetric_padding {
            AsymmetricPadding::OaepSha1PssSha256 => key
                .verify(Pss::new::<Sha256>(), &digest, signature)
                .map_err(|_| CryptoError::VerifyFailed),
            _ => key
                .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                .map_err(|_| CryptoError::VerifyFailed),
        }
    }

    /// Encrypt with RSA-OAEP-SHA1 (`encrypt-asymmetric`).
    pub fn encrypt_asymmetric(&self, key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        key.encrypt(&mut rng, rsa::Oaep::new::<sha1::Sha1>(), plaintext)
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))
    }

    /// Decrypt with RSA-OAEP-SHA1 (`decrypt-asymmetric`).
    pub fn decrypt_asymmetric(&self, key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        key.decrypt(rsa::Oaep::new::<sha1::Sha1>(), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }

    /// Derive signing/encrypting keys and an IV from a local and remote
    /// nonce pair (`derive-keys-from-nonces`), using the TLS-1.1-style
    /// `P_SHA256` construction: repeated HMAC expansion of the secret
    /// keyed by the seed, truncated to the requested length.
    pub fn derive_keys_from_nonces(
        &self,
        secret: &[u8],
        seed: &[u8],
    ) -> Result<SymmetricKeys, CryptoError> {
        let profile = self.policy.profile();
        let total = profile.signing_key_length + profile.encrypting_key_length + profile.iv_length;
        let expanded = p_sha256(secret, seed, total)?;
        let (signing_key, rest) = expanded.split_at(profile.signing_key_length);
        let (encrypting_key, iv) = rest.split_at(profile.encrypting_key_length);
        Ok(SymmetricKeys {
            signing_key: signing_key.to_vec(),
            encrypting_key: encrypting_key.to_vec(),
            iv: iv.to_vec(),
        })
    }

    /// Produce a fresh nonce sized to the policy's encrypting-key length
    /// (`generate-nonce`), falling back to 32 bytes for `None`.
    pub fn generate_nonce(&self) -> Vec<u8> {
        let len = match self.policy.profile().encrypting_key_length {
            0 => 32,
            n => n,
        };
        let mut nonce = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

/// TLS-1.1-style `P_SHA256(secret, seed)`, expanded to `len` bytes.
fn p_sha256(secret: &[u8], seed: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(len);
    let mut a = {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        mac.update(seed);
        mac.finalize().into_bytes().to_vec()
    };
    while out.len() < len {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        mac.update(&a);
        mac.update(seed);
        out.extend_from_slice(&mac.finalize().into_bytes());

        let mut next_a = HmacSha256::new_from_slice(secret)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        next_a.update(&a);
        a = next_a.finalize().into_bytes().to_vec();
    }
    out.truncate(len);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    #[test]
    fn hmac_sign_verify_roundtrip() {
        let adapter = CryptoAdapter::new(SecurityPolicy::Basic256Sha256);
        let key = b"0123456789abcdef0123456789abcdef";
        let tag = adapter.sign_symmetric(key, b"payload").unwrap();
        adapter.verify_symmetric(key, b"payload", &tag).unwrap();
        assert!(adapter.verify_symmetric(key, b"tampered", &tag).is_err());
    }

    #[test]
    fn aes256_cbc_roundtrip() {
        let adapter = CryptoAdapter::new(SecurityPolicy::Basic256Sha256);
        let keys = SymmetricKeys {
            signing_key: vec![0; 32],
            encrypting_key: vec![1; 32],
            iv: vec![2; 16],
        };
        let ciphertext = adapter.encrypt_symmetric(&keys, b"hello world!!").unwrap();
        let plaintext = adapter.decrypt_symmetric(&keys, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello world!!");
    }

    #[test]
    fn aes128_cbc_roundtrip() {
        let adapter = CryptoAdapter::new(SecurityPolicy::Aes128Sha256RsaOaep);
        let keys = SymmetricKeys {
            signing_key: vec![0; 32],
            encrypting_key: vec![1; 16],
            iv: vec![2; 16],
        };
        let ciphertext = adapter.encrypt_symmetric(&keys, b"short msg").unwrap();
        let plaintext = adapter.decrypt_symmetric(&keys, &ciphertext).unwrap();
        assert_eq!(plaintext, b"short msg");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt_or_produces_garbage() {
        let adapter = CryptoAdapter::new(SecurityPolicy::Basic256Sha256);
        let keys = SymmetricKeys {
            signing_key: vec![0; 32],
            encrypting_key: vec![1; 32],
            iv: vec![2; 16],
        };
        let mut ciphertext = adapter.encrypt_symmetric(&keys, b"hello world!!").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        // CBC padding corruption is very likely, not guaranteed, to be detected.
        let _ = adapter.decrypt_symmetric(&keys, &ciphertext);
    }

    #[test]
    fn derive_keys_from_nonces_is_deterministic_and_sized() {
        let adapter = CryptoAdapter::new(SecurityPolicy::Basic256Sha256);
        let secret = b"client-nonce-bytes-000000000000";
        let seed = b"server-nonce-bytes-000000000000";
        let a = adapter.derive_keys_from_nonces(secret, seed).unwrap();
        let b = adapter.derive_keys_from_nonces(secret, seed).unwrap();
        assert_eq!(a.signing_key, b.signing_key);
        assert_eq!(a.signing_key.len(), 32);
        assert_eq!(a.encrypting_key.len(), 32);
        assert_eq!(a.iv.len(), 16);
    }

    #[test]
    fn generate_nonce_matches_policy_length() {
        let adapter = CryptoAdapter::new(SecurityPolicy::Aes128Sha256RsaOaep);
        assert_eq!(adapter.generate_nonce().len(), 16);
    }

    #[test]
    fn rsa_oaep_and_pkcs1v15_sign_roundtrip() {
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let adapter = CryptoAdapter::new(SecurityPolicy::Basic256Sha256);

        let ciphertext = adapter.encrypt_asymmetric(&public, b"secret nonce").unwrap();
        let plaintext = adapter.decrypt_asymmetric(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, b"secret nonce");

        let signature = adapter.sign_asymmetric(&key, b"signed bytes").unwrap();
        adapter.verify_asymmetric(&public, b"signed bytes", &signature).unwrap();
    }
}
