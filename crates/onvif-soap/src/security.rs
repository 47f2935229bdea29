use base64::Engine;
use onvif_xml::builder::{Attribute, Element};
use sha1::{Digest, Sha1};

use crate::ns;

/// A WS-Security `UsernameToken` carrying a password digest.
///
/// The token is single-use: build a new one (new nonce, new `Created`) for every request.
#[derive(Clone)]
pub struct UsernameToken {
    username: String,
    password_digest: String,
    nonce: String,
    created: String,
}

impl std::fmt::Debug for UsernameToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameToken")
            .field("username", &self.username)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl UsernameToken {
    /// `created` must already be formatted as an `xs:dateTime` in UTC.
    pub fn new(username: &str, password: &str, nonce: &[u8], created: &str) -> Self {
        UsernameToken {
            username: username.to_owned(),
            password_digest: password_digest(nonce, created, password),
            nonce: base64::engine::general_purpose::STANDARD.encode(nonce),
            created: created.to_owned(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn created(&self) -> &str {
        &self.created
    }

    pub fn password_digest(&self) -> &str {
        &self.password_digest
    }

    /// The `wsse:Security` header block. `s:mustUnderstand` needs the envelope prefix in scope.
    pub fn into_header(self, envelope_namespace: &str) -> Element<'static> {
        let username = Element::new("Username")
            .set_namespace(ns::WSSE)
            .set_text(self.username);

        let password = Element::new("Password")
            .set_namespace(ns::WSSE)
            .add_attribute(Attribute::new("Type", ns::PASSWORD_DIGEST))
            .set_text(self.password_digest);

        let nonce = Element::new("Nonce")
            .set_namespace(ns::WSSE)
            .add_attribute(Attribute::new("EncodingType", ns::BASE64_BINARY))
            .set_text(self.nonce);

        let created = Element::new("Created")
            .set_namespace(ns::WSU)
            .set_text(self.created);

        let token = Element::new("UsernameToken")
            .set_namespace(ns::WSSE)
            .add_children([username, password, nonce, created]);

        Element::new("Security")
            .set_namespace(ns::WSSE)
            .add_namespace_declaration(ns::WSSE, Some("wsse"))
            .add_namespace_declaration(ns::WSU, Some("wsu"))
            .add_attribute(
                Attribute::new("mustUnderstand", "1")
                    .set_namespace(envelope_namespace.to_owned()),
            )
            .add_child(token)
    }
}

/// `Base64(SHA1(nonce + created + password))`, per the UsernameToken profile.
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}
