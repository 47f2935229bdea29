use std::future::Future;
use std::time::Duration;

use futures::future::AbortRegistration;
use onvif_client_core::{HttpRequest, HttpResponse, TransportError};

mod cache;
mod session;

pub use futures::future::AbortHandle;
pub use session::{Session, Timeout, with_timeout};

/// Sends one HTTP request. Implementations classify failures into [`TransportError`]
/// kinds so the session can decide about retries.
pub trait HttpClient: Send + Sync + 'static {
    fn send_request(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Per-call overrides.
#[derive(Debug, Default, typed_builder::TypedBuilder)]
pub struct CallOptions {
    /// Replaces the session's default timeout for each attempt.
    #[builder(default, setter(strip_option))]
    pub timeout: Option<Duration>,
    /// Abort with the paired [`AbortHandle`]. A request already on the wire is not
    /// recalled; the call just stops waiting for it.
    #[builder(default, setter(strip_option))]
    pub abort: Option<AbortRegistration>,
}
