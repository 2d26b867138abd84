use crate::utils::Redact;
use std::fmt::{Debug, Formatter};

/// Credential that holds the access key and secret key.
///
/// Immutable after construction and owned by one [`crate::Client`]; rotating
/// credentials means building a new client (which also discards the derived
/// signing key cache).
#[derive(Clone)]
pub struct Credential {
    /// Access key id for aws services.
    pub access_key_id: String,
    /// Secret access key for aws services.
    pub secret_access_key: String,
    /// Session token for aws services.
    pub session_token: Option<String>,
}

impl Credential {
    /// Create a new credential without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Check that both key halves are present.
    pub fn is_valid(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_secret() {
        let cred = Credential::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .with_session_token("short");
        let out = format!("{cred:?}");
        assert!(!out.contains("wJalrXUtnFEMI"));
        assert!(!out.contains("short"));
    }

    #[test]
    fn test_is_valid() {
        assert!(Credential::new("ak", "sk").is_valid());
        assert!(!Credential::new("", "sk").is_valid());
        assert!(!Credential::new("ak", "").is_valid());
    }
}
