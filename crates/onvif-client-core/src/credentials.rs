use std::path::PathBuf;

/// How requests prove who the caller is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// WS-Security `UsernameToken` with a password digest in every envelope.
    #[default]
    UsernameToken,
    HttpBasic,
    /// Answers the device's `WWW-Authenticate: Digest` challenge.
    HttpDigest,
    None,
}

/// A PKCS#12 bundle used for mutual TLS.
#[derive(Clone)]
pub struct ClientCertificate {
    pub pkcs12_path: PathBuf,
    passphrase: String,
}

impl ClientCertificate {
    pub fn new(pkcs12_path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        ClientCertificate {
            pkcs12_path: pkcs12_path.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("pkcs12_path", &self.pkcs12_path)
            .finish_non_exhaustive()
    }
}

/// Account used for every call of a session. Security headers are derived from it per call.
#[derive(Clone, typed_builder::TypedBuilder)]
pub struct Credential {
    #[builder(setter(into))]
    username: String,
    #[builder(setter(into))]
    password: String,
    #[builder(default)]
    mode: AuthMode,
    /// When set, the TLS client certificate authenticates and no `UsernameToken` is sent.
    #[builder(default, setter(strip_option))]
    certificate: Option<ClientCertificate>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::builder().username(username).password(password).build()
    }

    /// No credentials at all, for devices in their factory state or for pre-auth calls.
    pub fn anonymous() -> Self {
        Credential::builder()
            .username("")
            .password("")
            .mode(AuthMode::None)
            .build()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn certificate(&self) -> Option<&ClientCertificate> {
        self.certificate.as_ref()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("mode", &self.mode)
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}
