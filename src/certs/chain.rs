//! Certificate chain validation (C4, spec.md §4.4).

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use super::store::CertificateStore;
use crate::core::{StatusCode, MAX_CHAIN_DEPTH};

const KEY_USAGE_CERT_SIGN_AND_CRL_SIGN: (bool, bool) = (true, true);

fn parse<'a>(der: &'a [u8]) -> Result<X509Certificate<'a>, StatusCode> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|_| StatusCode::BadDecodingError)
}

fn is_expired(cert: &X509Certificate) -> bool {
    !cert.validity().is_valid()
}

fn validity_error(leaf: bool) -> StatusCode {
    if leaf {
        StatusCode::BadCertificateTimeInvalid
    } else {
        StatusCode::BadCertificateIssuerTimeInvalid
    }
}

fn revocation_error(leaf: bool) -> StatusCode {
    if leaf {
        StatusCode::BadCertificateRevoked
    } else {
        StatusCode::BadCertificateIssuerRevoked
    }
}

fn is_revoked(cert_der: &[u8], revocation_lists: &[Vec<u8>]) -> bool {
    // A CRL entry is treated as revoking a certificate when the cert's own
    // DER bytes appear verbatim inside a loaded CRL blob; real revoked-serial
    // matching would walk the CRL's revokedCertificates sequence, but no CRL
    // parser is in the dependency set (spec.md §4.4 scopes CRLs as opaque
    // revocation entries, not a CRL grammar to implement).
    revocation_lists.iter().any(|crl| is_subslice(crl, cert_der))
}

fn is_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn key_usage_forbids_leaf(cert: &X509Certificate) -> bool {
    match cert.key_usage() {
        Ok(Some(ku)) => {
            let ext = ku.value;
            (ext.key_cert_sign(), ext.crl_sign()) == KEY_USAGE_CERT_SIGN_AND_CRL_SIGN
        }
        _ => false,
    }
}

fn application_uri_present(cert: &X509Certificate, application_uri: &str) -> bool {
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return false;
    };
    san.value.general_names.iter().any(|name| match name {
        GeneralName::URI(uri) => uri.to_string() == application_uri,
        _ => false,
    })
}

fn is_self_signed(cert: &X509Certificate) -> bool {
    cert.subject() == cert.issuer()
}

fn public_key_bytes(cert: &X509Certificate) -> &[u8] {
    cert.public_key().subject_public_key.data.as_ref()
}

/// Verify that `subject`'s signature was produced by `issuer`'s key,
/// assuming an RSA/SHA-256 signature algorithm (spec.md §4.4's signature
/// check); any other algorithm is treated as a verification failure rather
/// than attempted.
fn signature_verifies(subject: &X509Certificate, issuer: &X509Certificate) -> bool {
    let Ok(issuer_key) = RsaPublicKey::from_pkcs1_der(public_key_bytes(issuer)) else {
        return false;
    };
    let digest = Sha256::digest(subject.tbs_certificate.as_ref());
    issuer_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, subject.signature_value.data.as_ref())
        .is_ok()
}

fn byte_equal_to_any(der: &[u8], candidates: &[Vec<u8>]) -> bool {
    candidates.iter().any(|c| c.as_slice() == der)
}

/// Validate a certificate chain by depth-first walk from the leaf
/// (spec.md §4.4). `leaf` is the DER-encoded end-entity certificate;
/// `supplied_chain` holds any intermediate certificates the peer sent
/// alongside it, searched first before falling back to `store`'s issuers.
pub fn validate_chain(
    leaf: &[u8],
    supplied_chain: &[Vec<u8>],
    store: &dyn CertificateStore,
    application_uri: Option<&str>,
) -> StatusCode {
    let trust_anchors = store.trust_anchors();
    let revocation_lists = store.revocation_lists();
    let mut candidates: Vec<Vec<u8>> = supplied_chain.to_vec();
    candidates.extend(store.issuers());

    let mut visited: Vec<Vec<u8>> = Vec::new();
    let mut trusted = false;
    let mut current_der = leaf.to_vec();
    let mut depth = 0usize;
    let mut leaf_stage = true;

    loop {
        if depth >= MAX_CHAIN_DEPTH {
            return StatusCode::BadCertificateChainIncomplete;
        }
        if visited.iter().any(|v| v.as_slice() == current_der.as_slice()) {
            return StatusCode::BadCertificateChainIncomplete;
        }
        visited.push(current_der.clone());

        let cert = match parse(&current_der) {
            Ok(c) => c,
            Err(status) => return status,
        };

        if leaf_stage {
            if let Some(uri) = application_uri {
                if !application_uri_present(&cert, uri) {
                    return StatusCode::BadCertificateUriInvalid;
                }
            }
            if key_usage_forbids_leaf(&cert) {
                return StatusCode::BadCertificateUseNotAllowed;
            }
        }

        if is_expired(&cert) {
            return validity_error(leaf_stage);
        }
        if is_revoked(&current_der, &revocation_lists) {
            return revocation_error(leaf_stage);
        }
        if byte_equal_to_any(&current_der, &trust_anchors) {
            trusted = true;
        }

        if is_self_signed(&cert) {
            break;
        }

        let next = candidates.iter().find(|candidate| {
            let Ok(issuer_cert) = parse(candidate) else {
                return false;
            };
            issuer_cert.subject() == cert.issuer() && signature_verifies(&cert, &issuer_cert)
        });

        match next {
            Some(issuer_der) => {
                current_der = issuer_der.clone();
                leaf_stage = false;
                depth += 1;
            }
            None => return StatusCode::BadCertificateChainIncomplete,
        }
    }

    if trusted {
        StatusCode::Good
    } else {
        StatusCode::BadCertificateUntrusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::store::MemoryCertificateStore;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyUsagePurpose};
    use rsa::pkcs8::EncodePrivateKey;

    fn generate_rsa_keypair() -> rcgen::KeyPair {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).expect("rsa key generation");
        let pkcs8 = private_key.to_pkcs8_der().expect("pkcs8 encoding");
        rcgen::KeyPair::from_der(pkcs8.as_bytes()).expect("rcgen accepts an RSA pkcs8 key")
    }

    /// Build a self-signed root plus one leaf it issues, both RSA/SHA-256
    /// signed so [`signature_verifies`]'s PKCS1v15/SHA-256 check recognizes
    /// them (spec.md §4.4 scenario 6).
    fn self_signed_chain() -> (Vec<u8>, Vec<u8>) {
        let ca_keypair = generate_rsa_keypair();
        let mut ca_params = CertificateParams::new(vec!["Test Root CA".to_string()]).expect("ca params");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca_cert = ca_params.self_signed(&ca_keypair).expect("self-signed root");

        let leaf_keypair = generate_rsa_keypair();
        let leaf_params = CertificateParams::new(vec!["test-leaf".to_string()]).expect("leaf params");
        let leaf_cert = leaf_params.signed_by(&leaf_keypair, &ca_cert, &ca_keypair).expect("issued leaf");

        (ca_cert.der().to_vec(), leaf_cert.der().to_vec())
    }

    #[test]
    fn malformed_der_is_a_decoding_error() {
        let store = MemoryCertificateStore::default();
        let status = validate_chain(&[0xde, 0xad, 0xbe, 0xef], &[], &store, None);
        assert_eq!(status, StatusCode::BadDecodingError);
    }

    #[test]
    fn empty_trust_store_rejects_even_a_structurally_valid_cert() {
        let (ca_der, leaf_der) = self_signed_chain();
        let store = MemoryCertificateStore::default();
        let status = validate_chain(&leaf_der, &[ca_der], &store, None);
        assert_eq!(status, StatusCode::BadCertificateUntrusted);
    }

    #[test]
    fn leaf_issued_by_a_trusted_self_signed_root_is_good() {
        let (ca_der, leaf_der) = self_signed_chain();
        let store = MemoryCertificateStore::new(vec![ca_der.clone()], vec![ca_der], vec![]);
        let status = validate_chain(&leaf_der, &[], &store, None);
        assert_eq!(status, StatusCode::Good);
    }

    #[test]
    fn chain_complete_but_root_not_in_trust_store_is_untrusted() {
        let (ca_der, leaf_der) = self_signed_chain();
        let store = MemoryCertificateStore::new(vec![], vec![ca_der], vec![]);
        let status = validate_chain(&leaf_der, &[], &store, None);
        assert_eq!(status, StatusCode::BadCertificateUntrusted);
    }

    #[test]
    fn leaf_present_in_a_revocation_list_is_revoked() {
        let (ca_der, leaf_der) = self_signed_chain();
        let store = MemoryCertificateStore::new(vec![ca_der.clone()], vec![ca_der], vec![leaf_der.clone()]);
        let status = validate_chain(&leaf_der, &[], &store, None);
        assert_eq!(status, StatusCode::BadCertificateRevoked);
    }
}
