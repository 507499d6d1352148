//! Component images: naming, build context, engine log decoding and the
//! build-if-missing pipeline.

mod builder;
pub mod context;
pub mod log;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use builder::{BuildOptions, ImageBuilder, RegistryTarget};

/// Fully qualified component image reference.
///
/// Rendered as `<registry>/<app>/<component>:<content hash>`; never stored,
/// always derived from the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry_address: String,
    pub app_name: String,
    pub component_name: String,
    pub content_hash: String,
}

impl ImageRef {
    pub fn new(
        registry_address: impl Into<String>,
        app_name: impl Into<String>,
        component_name: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            registry_address: registry_address.into().trim_end_matches('/').to_string(),
            app_name: app_name.into(),
            component_name: component_name.into(),
            content_hash: content_hash.into(),
        }
    }

    pub fn repository(&self) -> String {
        format!(
            "{}/{}/{}",
            self.registry_address, self.app_name, self.component_name
        )
    }

    pub fn tag(&self) -> &str {
        &self.content_hash
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository(), self.content_hash)
    }
}
