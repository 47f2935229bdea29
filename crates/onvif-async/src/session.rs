use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{Abortable, Either};
use onvif_client_core::auth::{self, Authenticator};
use onvif_client_core::dispatcher::{self, OnvifErrorKind};
use onvif_client_core::endpoint::Directory;
use onvif_client_core::{
    Credential, DeviceEndpoint, OnvifCoreError, OperationHandle, Registry, ServiceEndpoint, SessionConfig,
    Structure, TransportError,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::cache::{DirectoryResult, EndpointCache, Lookup};
use crate::{CallOptions, HttpClient};

const DEVICE_SERVICE: &str = "device";

/// One ONVIF device. Cheap to clone; clones share the connection, the credential and
/// the service directory, and may call concurrently.
pub struct Session<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Session<C> {
    fn clone(&self) -> Self {
        Session {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.inner.device)
            .field("authenticator", &self.inner.authenticator)
            .finish_non_exhaustive()
    }
}

struct Inner<C> {
    client: C,
    registry: Arc<Registry>,
    authenticator: Authenticator,
    config: SessionConfig,
    device: DeviceEndpoint,
    cache: EndpointCache,
}

impl<C: HttpClient> Session<C> {
    /// Nothing is sent until the first call.
    pub fn create(
        base_url: &str,
        credential: Credential,
        client: C,
        registry: Arc<Registry>,
        config: SessionConfig,
    ) -> Result<Self, OnvifCoreError> {
        let device = DeviceEndpoint::new(base_url, &config.device_service_path)?;
        info!(device_xaddr = %device.device_xaddr(), "created ONVIF session");

        Ok(Session {
            inner: Arc::new(Inner {
                client,
                registry,
                authenticator: Authenticator::new(credential),
                config,
                device,
                cache: EndpointCache::new(),
            }),
        })
    }

    pub fn device_endpoint(&self) -> &DeviceEndpoint {
        &self.inner.device
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.inner.authenticator
    }

    pub async fn call(&self, service: &str, operation: &str, args: &Structure) -> Result<Structure, OnvifCoreError> {
        self.call_with(service, operation, args, CallOptions::default()).await
    }

    #[instrument(skip(self, args, options), fields(device = %self.inner.device.device_xaddr()))]
    pub async fn call_with(
        &self,
        service: &str,
        operation: &str,
        args: &Structure,
        options: CallOptions,
    ) -> Result<Structure, OnvifCoreError> {
        let op = self.inner.registry.lookup(service, operation)?;
        let timeout = options.timeout.unwrap_or(self.inner.config.timeout);
        let work = self.inner.dispatch(op, args, timeout);

        match options.abort {
            Some(registration) => Abortable::new(work, registration).await.unwrap_or_else(|_| {
                debug!("call aborted by caller");
                Err(OnvifCoreError::Cancelled)
            }),
            None => work.await,
        }
    }

    /// The XAddr calls to `service` go to.
    pub async fn resolve(&self, service: &str) -> Result<String, OnvifCoreError> {
        Ok(self.inner.service_endpoint(service).await?.xaddr)
    }

    /// The directory entry for `service`, including its advertised capabilities.
    pub async fn service_endpoint(&self, service: &str) -> Result<ServiceEndpoint, OnvifCoreError> {
        self.inner.service_endpoint(service).await
    }

    /// Forgets the XAddr of one service, or of all of them.
    pub fn invalidate(&self, service: Option<&str>) {
        info!(service = service.unwrap_or("*"), "invalidating service endpoints");
        self.inner.cache.invalidate(service);
    }

    /// Reads the device clock with an unauthenticated `GetSystemDateAndTime` at the
    /// device service address and uses it for `UsernameToken` timestamps from then on.
    #[instrument(skip(self))]
    pub async fn synchronize_clock(&self) -> Result<(), OnvifCoreError> {
        let inner = &self.inner;
        let op = inner.registry.lookup(DEVICE_SERVICE, "GetSystemDateAndTime")?;
        let anonymous = Authenticator::new(Credential::anonymous());

        let response = inner
            .send(&op, &Structure::new(), inner.device.device_xaddr(), &anonymous, inner.config.timeout)
            .await?;

        let device_now = auth::device_time(&response).ok_or_else(|| OnvifCoreError::MalformedResponse {
            operation: op.name().to_owned(),
            reason: "no usable UTCDateTime".to_owned(),
        })?;
        inner.authenticator.synchronize(device_now);
        Ok(())
    }
}

impl<C: HttpClient> Inner<C> {
    async fn dispatch(self: &Arc<Self>, op: OperationHandle, args: &Structure, timeout: Duration) -> Result<Structure, OnvifCoreError> {
        let endpoint = self.service_endpoint(op.service()).await?;
        debug!(operation = %op.name(), xaddr = %endpoint.xaddr, "dispatching");

        let result = self.send(&op, args, &endpoint.xaddr, &self.authenticator, timeout).await;
        if let Err(error) = &result
            && dispatcher::is_relocation(error)
        {
            warn!(service = %op.service(), %error, "service endpoint looks stale, invalidating");
            self.cache.invalidate(Some(op.service()));
        }
        result
    }

    async fn service_endpoint(self: &Arc<Self>, service: &str) -> Result<ServiceEndpoint, OnvifCoreError> {
        let service = service.to_lowercase();
        if self.registry.service(&service).is_none() {
            return Err(OnvifCoreError::ServiceUnavailable { service });
        }

        let directory = self.directory(&service).await?;
        if let Some(endpoint) = directory.get(&service) {
            return Ok(endpoint.clone());
        }

        if service == DEVICE_SERVICE {
            return Ok(ServiceEndpoint {
                service,
                namespace: self
                    .registry
                    .service(DEVICE_SERVICE)
                    .map(|schema| schema.namespace().to_owned())
                    .unwrap_or_default(),
                xaddr: self.device.device_xaddr().to_owned(),
                version: None,
                capabilities: None,
            });
        }

        Err(OnvifCoreError::ServiceUnavailable { service })
    }

    async fn directory(self: &Arc<Self>, service: &str) -> DirectoryResult {
        let lookup = self.cache.lookup(service, || {
            let inner = Arc::clone(self);
            async move { inner.bootstrap().await.map(Arc::new) }.boxed()
        });

        match lookup {
            Lookup::Ready(directory) => Ok(directory),
            Lookup::Pending { generation, bootstrap } => {
                let result = bootstrap.await;
                self.cache.complete(generation, &result);
                result
            }
        }
    }

    /// Fetches the service directory from the device service, with `GetCapabilities`
    /// for devices that do not implement `GetServices`.
    #[instrument(skip(self), fields(device = %self.device.device_xaddr()))]
    async fn bootstrap(&self) -> Result<Directory, OnvifCoreError> {
        let xaddr = self.device.device_xaddr();
        let timeout = self.config.timeout;

        let get_services = self.registry.lookup(DEVICE_SERVICE, "GetServices")?;
        let args = Structure::new().with("includeCapability", true);

        let directory = match self.send(&get_services, &args, xaddr, &self.authenticator, timeout).await {
            Ok(response) => Directory::from_services(&response, &self.registry),
            Err(error) if error.is_onvif(OnvifErrorKind::ActionNotSupported) => {
                info!("GetServices not supported, falling back to GetCapabilities");
                let get_capabilities = self.registry.lookup(DEVICE_SERVICE, "GetCapabilities")?;
                let args = Structure::new().with("category", "All");
                let response = self
                    .send(&get_capabilities, &args, xaddr, &self.authenticator, timeout)
                    .await?;
                Directory::from_capabilities(&response, &self.registry)
            }
            Err(error) => return Err(error),
        };

        let directory = if self.config.rewrite_xaddr_host {
            directory.rewrite_hosts(&self.device)
        } else {
            directory
        };

        info!(services = ?directory.service_names(), "service directory ready");
        Ok(directory)
    }

    /// Sends one operation with timeout, retries for idempotent calls and one extra
    /// round when an HTTP Digest challenge arrives.
    async fn send(
        &self,
        op: &OperationHandle,
        args: &Structure,
        xaddr: &str,
        authenticator: &Authenticator,
        timeout: Duration,
    ) -> Result<Structure, OnvifCoreError> {
        let retry = self.config.retry;
        let mut attempt = 0;
        let mut challenged = false;

        loop {
            let request = dispatcher::prepare(op, args, xaddr, authenticator, self.config.soap_version, timeout)?;
            trace!(operation = %op.name(), attempt, bytes = request.body.len(), "sending request");

            let outcome = match with_timeout(self.client.send_request(request), timeout).await {
                Ok(outcome) => outcome,
                Err(Timeout) => Err(TransportError::timeout(timeout)),
            };

            match outcome {
                Ok(response) => {
                    if !challenged && authenticator.on_challenge(&response) {
                        debug!(operation = %op.name(), "answering digest challenge");
                        challenged = true;
                        continue;
                    }
                    return dispatcher::accept(op, &response);
                }
                Err(error) if retry.should_retry(op.descriptor.idempotent, &error.kind, attempt) => {
                    let delay = retry.delay(attempt);
                    warn!(operation = %op.name(), %error, ?delay, "retrying");
                    futures_timer::Delay::new(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    debug!(operation = %op.name(), %error, "request failed");
                    return Err(error.into());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

pub async fn with_timeout<F, T>(fut: F, dur: Duration) -> Result<T, Timeout>
where
    F: Future<Output = T>,
{
    let timeout = futures_timer::Delay::new(dur);

    futures::pin_mut!(timeout);
    futures::pin_mut!(fut);

    match futures::future::select(fut, timeout).await {
        Either::Left((val, _sleep)) => Ok(val),
        Either::Right((_unit, _fut)) => Err(Timeout),
    }
}
