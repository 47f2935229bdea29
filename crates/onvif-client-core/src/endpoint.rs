use std::collections::HashMap;

use onvif_xml::parser;
use tracing::debug;
use url::Url;

use crate::OnvifCoreError;
use crate::registry::Registry;
use crate::value::{Structure, Value, XmlFragment};

pub const DEFAULT_DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

/// GetCapabilities categories and the service namespace each one stands for.
const CAPABILITY_NAMESPACES: &[(&str, &str)] = &[
    ("analytics", "http://www.onvif.org/ver20/analytics/wsdl"),
    ("device", "http://www.onvif.org/ver10/device/wsdl"),
    ("events", "http://www.onvif.org/ver10/events/wsdl"),
    ("imaging", "http://www.onvif.org/ver20/imaging/wsdl"),
    ("media", "http://www.onvif.org/ver10/media/wsdl"),
    ("ptz", "http://www.onvif.org/ver20/ptz/wsdl"),
    ("extension.deviceIO", "http://www.onvif.org/ver10/deviceIO/wsdl"),
    ("extension.recording", "http://www.onvif.org/ver10/recording/wsdl"),
    ("extension.search", "http://www.onvif.org/ver10/search/wsdl"),
    ("extension.replay", "http://www.onvif.org/ver10/replay/wsdl"),
];

/// Where a device lives: the URL the session was created with and the well-known
/// device service address derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    base_url: Url,
    device_xaddr: String,
}

impl DeviceEndpoint {
    /// Accepts `http://host[:port]`, a bare `host[:port]`, or a full device service URL.
    /// A URL without a path gets `device_service_path`.
    pub fn new(base_url: &str, device_service_path: &str) -> Result<Self, OnvifCoreError> {
        let invalid = |reason: String| OnvifCoreError::InvalidUrl {
            url: base_url.to_owned(),
            reason,
        };

        let trimmed = base_url.trim();
        let url = if trimmed.contains("://") {
            Url::parse(trimmed)
        } else {
            Url::parse(&format!("http://{trimmed}"))
        }
        .map_err(|e| invalid(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_owned()));
        }

        let device_xaddr = if url.path().is_empty() || url.path() == "/" {
            url.join(device_service_path)
                .map_err(|e| invalid(e.to_string()))?
                .to_string()
        } else {
            url.to_string()
        };

        let mut base_url = url;
        base_url.set_path("/");
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(DeviceEndpoint {
            base_url,
            device_xaddr,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn device_xaddr(&self) -> &str {
        &self.device_xaddr
    }

    /// `xaddr` with its scheme, host and port replaced by those of the base URL.
    pub fn rewrite_host(&self, xaddr: &str) -> String {
        let Ok(mut url) = Url::parse(xaddr) else {
            return xaddr.to_owned();
        };

        let rewritten = url.set_scheme(self.base_url.scheme()).is_ok()
            && url.set_host(self.base_url.host_str()).is_ok()
            && url.set_port(self.base_url.port()).is_ok();

        if rewritten {
            url.to_string()
        } else {
            xaddr.to_owned()
        }
    }
}

/// A service as advertised by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEndpoint {
    /// Registry name, e.g. `ptz`.
    pub service: String,
    pub namespace: String,
    pub xaddr: String,
    /// `(major, minor)` when the device reported it.
    pub version: Option<(u32, u32)>,
    /// The service's `Capabilities` element, from `GetServices` with `IncludeCapability`.
    pub capabilities: Option<XmlFragment>,
}

impl ServiceEndpoint {
    /// An attribute of the capabilities element, such as `MoveStatus` for PTZ.
    pub fn capability(&self, name: &str) -> Option<String> {
        let fragment = self.capabilities.as_ref()?;
        let document = fragment.to_document();
        let document = parser::parse(&document).ok()?;
        let capabilities = parser::child_elements(document.root_element()).next()?;
        parser::attribute_local(capabilities, name).map(str::to_owned)
    }

    pub fn capability_flag(&self, name: &str) -> Option<bool> {
        match self.capability(name)?.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

/// Service endpoints of one device keyed by registry service name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    services: HashMap<String, ServiceEndpoint>,
}

impl Directory {
    /// Builds the directory from a decoded `GetServices` response. Services the
    /// registry has no schema for are skipped.
    pub fn from_services(response: &Structure, registry: &Registry) -> Self {
        let mut directory = Directory::default();

        for entry in response.get_list("service").iter().filter_map(Value::as_struct) {
            let (Some(namespace), Some(xaddr)) = (entry.get_str("namespace"), entry.get_str("xAddr")) else {
                continue;
            };
            let namespace = namespace.trim();
            let Some(service) = registry.service_for_namespace(namespace) else {
                debug!(%namespace, "device offers a service without schema");
                continue;
            };

            let version = entry.get_struct("version").and_then(|version| {
                let part = |key: &str| u32::try_from(version.get(key)?.as_i64()?).ok();
                Some((part("major")?, part("minor")?))
            });
            let capabilities = match entry.get("capabilities") {
                Some(Value::Opaque(fragment)) => Some(fragment.clone()),
                _ => None,
            };

            directory.services.entry(service.clone()).or_insert(ServiceEndpoint {
                service,
                namespace: namespace.to_owned(),
                xaddr: xaddr.trim().to_owned(),
                version,
                capabilities,
            });
        }

        directory
    }

    /// Builds the directory from a decoded `GetCapabilities` response, for devices that
    /// predate `GetServices`.
    pub fn from_capabilities(response: &Structure, registry: &Registry) -> Self {
        let mut directory = Directory::default();
        let Some(capabilities) = response.get_struct("capabilities") else {
            return directory;
        };

        for (category, namespace) in CAPABILITY_NAMESPACES {
            let Some(xaddr) = capabilities
                .path(category)
                .and_then(Value::as_struct)
                .and_then(|category| category.get_str("xAddr"))
            else {
                continue;
            };
            let Some(service) = registry.service_for_namespace(namespace) else {
                continue;
            };

            directory.services.insert(
                service.clone(),
                ServiceEndpoint {
                    service,
                    namespace: (*namespace).to_owned(),
                    xaddr: xaddr.trim().to_owned(),
                    version: None,
                    capabilities: None,
                },
            );
        }

        directory
    }

    /// Points every XAddr at the host the session was created with.
    pub fn rewrite_hosts(mut self, device: &DeviceEndpoint) -> Self {
        for endpoint in self.services.values_mut() {
            let rewritten = device.rewrite_host(&endpoint.xaddr);
            if rewritten != endpoint.xaddr {
                debug!(service = %endpoint.service, from = %endpoint.xaddr, to = %rewritten, "rewrote XAddr host");
                endpoint.xaddr = rewritten;
            }
        }
        self
    }

    pub fn get(&self, service: &str) -> Option<&ServiceEndpoint> {
        self.services.get(&service.to_lowercase())
    }

    pub fn insert(&mut self, endpoint: ServiceEndpoint) {
        self.services.insert(endpoint.service.to_lowercase(), endpoint);
    }

    pub fn remove(&mut self, service: &str) -> Option<ServiceEndpoint> {
        self.services.remove(&service.to_lowercase())
    }

    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
