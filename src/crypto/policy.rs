//! Security policy profiles (spec.md §4.3): the fixed algorithm/length
//! constants each named policy pins down.

/// A named OPC UA security policy. Each fixes every cryptographic
/// parameter the adapter needs; nothing is independently negotiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    /// No security: messages are neither signed nor encrypted.
    None,
    /// SHA-256 signatures, AES-256-CBC encryption, RSA-OAEP-SHA1 asymmetric.
    Basic256Sha256,
    /// SHA-256 signatures, AES-128-CBC encryption, RSA-OAEP-SHA1 asymmetric.
    Aes128Sha256RsaOaep,
    /// SHA-256 signatures, AES-256-CBC encryption, RSA-PSS-SHA256 asymmetric.
    Aes256Sha256RsaPss,
}

/// Asymmetric padding scheme used by a policy's public-key operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricPadding {
    /// PKCS#1 v1.5 encryption / signature (only meaningful for `None`,
    /// which never actually invokes asymmetric crypto).
    None,
    /// RSAES-OAEP with SHA-1, PKCS#1 v1.5 signatures.
    OaepSha1,
    /// RSAES-OAEP with SHA-1 encryption, RSASSA-PSS-SHA256 signatures.
    OaepSha1PssSha256,
}

/// The fixed algorithm/length parameters a [`SecurityPolicy`] pins down
/// (spec.md §4.3: "signature algorithm, encryption algorithm, key
/// derivation PRF, signing/encrypting key length, signature length, and
/// minimum asymmetric key size").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyProfile {
    /// Symmetric signing key length in bytes.
    pub signing_key_length: usize,
    /// Symmetric encrypting key length in bytes.
    pub encrypting_key_length: usize,
    /// Symmetric block cipher IV length in bytes.
    pub iv_length: usize,
    /// HMAC output length in bytes (the symmetric signature length).
    pub signature_length: usize,
    /// Minimum accepted RSA modulus size in bits.
    pub min_asymmetric_key_bits: usize,
    /// Asymmetric padding scheme.
    pub asymmetric_padding: AsymmetricPadding,
}

impl SecurityPolicy {
    /// The policy's fixed parameter set.
    pub fn profile(self) -> PolicyProfile {
        match self {
            SecurityPolicy::None => PolicyProfile {
                signing_key_length: 0,
                encrypting_key_length: 0,
                iv_length: 0,
                signature_length: 0,
                min_asymmetric_key_bits: 0,
                asymmetric_padding: AsymmetricPadding::None,
            },
            SecurityPolicy::Basic256Sha256 => PolicyProfile {
                signing_key_length: 32,
                encrypting_key_length: 32,
                iv_length: 16,
                signature_length: 32,
                min_asymmetric_key_bits: 2048,
                asymmetric_padding: AsymmetricPadding::OaepSha1,
            },
            SecurityPolicy::Aes128Sha256RsaOaep => PolicyProfile {
                signing_key_length: 32,
                encrypting_key_length: 16,
                iv_length: 16,
                signature_length: 32,
                min_asymmetric_key_bits: 2048,
                asymmetric_padding: AsymmetricPadding::OaepSha1,
            },
            SecurityPolicy::Aes256Sha256RsaPss => PolicyProfile {
                signing_key_length: 32,
                encrypting_key_length: 32,
                iv_length: 16,
                signature_length: 32,
                min_asymmetric_key_bits: 2048,
                asymmetric_padding: AsymmetricPadding::OaepSha1PssSha256,
            },
        }
    }

    /// True when this policy performs no cryptography at all.
    pub fn is_none(self) -> bool {
        matches!(self, SecurityPolicy::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_policy_has_zero_lengths() {
        assert_eq!(SecurityPolicy::None.profile().signing_key_length, 0);
        assert!(SecurityPolicy::None.is_none());
    }

    #[test]
    fn basic256sha256_matches_documented_lengths() {
        let p = SecurityPolicy::Basic256Sha256.profile();
        assert_eq!(p.encrypting_key_length, 32);
        assert_eq!(p.signature_length, 32);
        assert_eq!(p.min_asymmetric_key_bits, 2048);
    }

    #[test]
    fn aes128_variant_uses_shorter_encrypting_key() {
        let p = SecurityPolicy::Aes128Sha256RsaOaep.profile();
        assert_eq!(p.encrypting_key_length, 16);
        assert_eq!(p.signing_key_length, 32);
    }
}
