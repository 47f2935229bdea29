use std::sync::{Mutex, PoisonError};

use base64::Engine;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use digest_auth::{AuthContext, WwwAuthenticateHeader};
use onvif_soap::{SoapVersion, UsernameToken};
use onvif_xml::builder::Element;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::credentials::{AuthMode, Credential};
use crate::http::{HttpRequest, HttpResponse};
use crate::value::Structure;

/// Per-session authentication state: the credential, the device clock offset used for
/// `UsernameToken` timestamps and the last HTTP Digest challenge.
pub struct Authenticator {
    credential: Credential,
    clock_offset: Mutex<TimeDelta>,
    challenge: Mutex<Option<WwwAuthenticateHeader>>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("credential", &self.credential)
            .field("clock_offset", &self.clock_offset())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(credential: Credential) -> Self {
        Authenticator {
            credential,
            clock_offset: Mutex::new(TimeDelta::zero()),
            challenge: Mutex::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Device time minus local time.
    pub fn clock_offset(&self) -> TimeDelta {
        *self.clock_offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_clock_offset(&self, offset: TimeDelta) {
        *self.clock_offset.lock().unwrap_or_else(PoisonError::into_inner) = offset;
    }

    /// Records the device clock as read from `GetSystemDateAndTime`.
    pub fn synchronize(&self, device_now: DateTime<Utc>) {
        let offset = device_now.signed_duration_since(Utc::now());
        info!(offset_ms = offset.num_milliseconds(), "device clock offset updated");
        self.set_clock_offset(offset);
    }

    pub fn uses_username_token(&self) -> bool {
        self.credential.mode() == AuthMode::UsernameToken
            && self.credential.certificate().is_none()
            && !self.credential.username().is_empty()
    }

    /// Header blocks for one request. Each call yields a new nonce and timestamp.
    pub fn security_headers(&self, version: SoapVersion) -> Vec<Element<'static>> {
        if !self.uses_username_token() {
            return Vec::new();
        }

        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let created = (Utc::now() + self.clock_offset())
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let token = UsernameToken::new(
            self.credential.username(),
            self.credential.password(),
            &nonce,
            &created,
        );
        vec![token.into_header(version.envelope_namespace())]
    }

    /// Adds an `Authorization` header when the mode calls for one. Digest needs a
    /// challenge from an earlier 401 first.
    pub fn authorize(&self, request: HttpRequest) -> HttpRequest {
        if self.credential.certificate().is_some() {
            return request;
        }

        match self.credential.mode() {
            AuthMode::HttpBasic => {
                let token = base64::engine::general_purpose::STANDARD.encode(format!(
                    "{}:{}",
                    self.credential.username(),
                    self.credential.password()
                ));
                request.with_header("Authorization", format!("Basic {token}"))
            }
            AuthMode::HttpDigest => match self.digest_header(&request) {
                Some(header) => request.with_header("Authorization", header),
                None => request,
            },
            AuthMode::UsernameToken | AuthMode::None => request,
        }
    }

    /// Takes note of a `WWW-Authenticate: Digest` challenge. Returns `true` when the
    /// request should be sent again with the new challenge.
    pub fn on_challenge(&self, response: &HttpResponse) -> bool {
        if response.status != 401 || self.credential.mode() != AuthMode::HttpDigest {
            return false;
        }
        let Some(header) = response.header("WWW-Authenticate") else {
            debug!("401 without a challenge");
            return false;
        };

        match digest_auth::parse(header) {
            Ok(prompt) => {
                debug!(realm = %prompt.realm, "caching digest challenge");
                *self.challenge.lock().unwrap_or_else(PoisonError::into_inner) = Some(prompt);
                true
            }
            Err(error) => {
                warn!(%error, "unusable WWW-Authenticate header");
                false
            }
        }
    }

    fn digest_header(&self, request: &HttpRequest) -> Option<String> {
        let mut challenge = self.challenge.lock().unwrap_or_else(PoisonError::into_inner);
        let prompt = challenge.as_mut()?;

        let uri = url::Url::parse(&request.url).map_or_else(
            |_| "/".to_owned(),
            |url| match url.query() {
                Some(query) => format!("{}?{query}", url.path()),
                None => url.path().to_owned(),
            },
        );
        let context = AuthContext::new_post(
            self.credential.username(),
            self.credential.password(),
            uri,
            Some(request.body.as_bytes().to_vec()),
        );

        match prompt.respond(&context) {
            Ok(answer) => Some(answer.to_header_string()),
            Err(error) => {
                warn!(%error, "dropping digest challenge");
                *challenge = None;
                None
            }
        }
    }
}

/// The device clock from a `GetSystemDateAndTime` response, `None` when the device
/// left out `UTCDateTime` or sent impossible values.
pub fn device_time(response: &Structure) -> Option<DateTime<Utc>> {
    let utc = response.path("systemDateAndTime.utcDateTime")?.as_struct()?;
    let field = |path: &str| utc.path(path).and_then(crate::Value::as_i64);

    let date = NaiveDate::from_ymd_opt(
        i32::try_from(field("date.year")?).ok()?,
        u32::try_from(field("date.month")?).ok()?,
        u32::try_from(field("date.day")?).ok()?,
    )?;
    let time = date.and_hms_opt(
        u32::try_from(field("time.hour")?).ok()?,
        u32::try_from(field("time.minute")?).ok()?,
        u32::try_from(field("time.second")?).ok()?,
    )?;
    Some(time.and_utc())
}
