//! User identity tokens presented to ActivateSession (spec.md §4.6).

/// The identity a client asserts when activating a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// No credentials; permitted only if the endpoint's policy allows it.
    Anonymous,
    /// A username and an encrypted password, decrypted against the
    /// endpoint-bound security policy before the user backend sees it.
    UserName {
        /// The asserted user name.
        user_name: String,
        /// Password ciphertext as received on the wire.
        encrypted_password: Vec<u8>,
    },
    /// An X.509 certificate plus a signature over (server cert || server
    /// nonce) proving possession of the matching private key.
    X509 {
        /// DER-encoded user certificate.
        certificate_der: Vec<u8>,
        /// Signature over the server certificate and nonce.
        signature: Vec<u8>,
    },
}

impl IdentityToken {
    /// A short tag for logging, never the credential material itself.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityToken::Anonymous => "anonymous",
            IdentityToken::UserName { .. } => "username",
            IdentityToken::X509 { .. } => "x509",
        }
    }
}

/// Which identity token kinds an endpoint accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPolicy {
    /// Anonymous identities accepted.
    pub allow_anonymous: bool,
    /// Username/password identities accepted.
    pub allow_user_name: bool,
    /// X.509 identities accepted.
    pub allow_x509: bool,
}

impl IdentityPolicy {
    /// True when `token`'s kind is permitted by this policy.
    pub fn permits(&self, token: &IdentityToken) -> bool {
        match token {
            IdentityToken::Anonymous => self.allow_anonymous,
            IdentityToken::UserName { .. } => self.allow_user_name,
            IdentityToken::X509 { .. } => self.allow_x509,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_disallowed_kinds() {
        let policy = IdentityPolicy {
            allow_anonymous: true,
            allow_user_name: false,
            allow_x509: false,
        };
        assert!(policy.permits(&IdentityToken::Anonymous));
        assert!(!policy.permits(&IdentityToken::UserName {
            user_name: "a".into(),
            encrypted_password: vec![],
        }));
    }
}
