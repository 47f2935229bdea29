pub mod config;
pub mod http_client;

use std::sync::Arc;

use onvif_client_core::{Credential, OnvifCoreError, Registry, SessionConfig, TransportError, TransportErrorKind};
use tracing::{info, instrument};

pub use config::{ClientConfig, init_logging};
pub use http_client::ReqwestHttpClient;
pub use onvif_async::{AbortHandle, CallOptions, Session};

pub type TokioSession = Session<ReqwestHttpClient>;

/// A session for the device at `base_url` using the built-in service catalogue and
/// default HTTP settings.
pub async fn connect(
    base_url: &str,
    credential: Credential,
    config: SessionConfig,
) -> Result<TokioSession, OnvifCoreError> {
    connect_with(base_url, credential, config, &ClientConfig::default()).await
}

#[instrument(skip(credential, config, client_config))]
pub async fn connect_with(
    base_url: &str,
    credential: Credential,
    config: SessionConfig,
    client_config: &ClientConfig,
) -> Result<TokioSession, OnvifCoreError> {
    let registry = Arc::new(Registry::builtin()?);

    let pkcs12 = match credential.certificate() {
        Some(certificate) => {
            info!(path = %certificate.pkcs12_path.display(), "loading client certificate");
            let der = tokio::fs::read(&certificate.pkcs12_path).await.map_err(|error| {
                TransportError::with_source(
                    TransportErrorKind::Tls,
                    format!("cannot read {}", certificate.pkcs12_path.display()),
                    error,
                )
            })?;
            Some((der, certificate.passphrase().to_owned()))
        }
        None => None,
    };

    let identity = pkcs12
        .as_ref()
        .map(|(der, passphrase)| (der.as_slice(), passphrase.as_str()));
    let client = ReqwestHttpClient::new(client_config, identity)?;

    Session::create(base_url, credential, client, registry, config)
}
