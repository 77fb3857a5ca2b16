//! Proxy image selection.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::PortExposure;

/// Environment variable that forces (or forbids) the OpenShift image.
pub const OCP_IMAGE_ENV: &str = "KUBETUNNEL_USE_OCP_IMAGE";

/// User override for picking the OpenShift proxy image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageOverride {
    /// Always use the OpenShift image.
    Always,
    /// Never use the OpenShift image, even on OpenShift.
    Never,
    /// Use the OpenShift image when the cluster is OpenShift.
    #[default]
    Auto,
}

impl ImageOverride {
    /// Parse an override value. Unknown values fall back to `Auto` with a warning.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" | "always" => ImageOverride::Always,
            "false" | "off" | "no" | "0" | "never" => ImageOverride::Never,
            "auto" | "automatic" | "default" => ImageOverride::Auto,
            _ => {
                warn!(
                    variable = OCP_IMAGE_ENV,
                    value = value,
                    "Ignoring unrecognized value; accepted values are YES, NO or AUTO. Using AUTO."
                );
                ImageOverride::Auto
            }
        }
    }

    /// Read the override from the process environment.
    pub fn from_env() -> Self {
        match std::env::var(OCP_IMAGE_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => ImageOverride::Auto,
        }
    }
}

/// The three proxy images the cluster side can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyImages {
    pub default: String,
    pub privileged: String,
    pub openshift: String,
}

impl ProxyImages {
    pub fn new(registry: &str, version: &str) -> Self {
        let registry = registry.trim_end_matches('/');
        Self {
            default: format!("{}/proxy-k8s:{}", registry, version),
            privileged: format!("{}/proxy-k8s-priv:{}", registry, version),
            openshift: format!("{}/proxy-ocp:{}", registry, version),
        }
    }
}

/// Everything the image decision depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePolicy {
    pub images: ProxyImages,
    pub ocp_override: ImageOverride,
    pub cluster_is_openshift: bool,
}

impl ImagePolicy {
    /// Pick the proxy image for the given exposure.
    ///
    /// The OpenShift decision is made before privileged ports are considered.
    pub fn select(&self, exposure: &PortExposure) -> &str {
        if self.ocp_override == ImageOverride::Always {
            return &self.images.openshift;
        }
        if self.ocp_override != ImageOverride::Never && self.cluster_is_openshift {
            return &self.images.openshift;
        }
        if exposure.has_privileged_ports() {
            return &self.images.privileged;
        }
        &self.images.default
    }
}
