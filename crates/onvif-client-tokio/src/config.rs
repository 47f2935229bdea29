use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry::Registry};

/// HTTP client settings. Per-call timeouts live in `SessionConfig`.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct ClientConfig {
    #[builder(default = Duration::from_secs(10))]
    pub connect_timeout: Duration,
    /// Accept self-signed and otherwise invalid server certificates. Most cameras
    /// ship with one.
    #[builder(default = false)]
    pub accept_invalid_certs: bool,
    #[builder(default = concat!("onvif-client-tokio/", env!("CARGO_PKG_VERSION")).to_owned(), setter(into))]
    pub user_agent: String,
    #[builder(default = 2)]
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Installs a global subscriber writing compact lines to stderr. `RUST_LOG` wins over
/// `verbose_level` when set.
pub fn init_logging(verbose_level: u8) -> anyhow::Result<()> {
    let log_level = match verbose_level {
        0 => "info,reqwest=warn,hyper=warn,native_tls=warn",
        1 => "debug,reqwest=info,hyper=warn",
        2 => "trace,hyper=info",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = Registry::default().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
