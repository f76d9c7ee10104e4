//! Where launches land inside the application.

use serde_json::{Map, Value};
use url::Url;

use lti_shared::{LtiError, Result};

/// Maps a launch to the application URL the browser is redirected to.
pub trait ResourceResolver: Send + Sync {
    /// Target of a resource launch carrying `custom` parameters.
    fn resource_url(&self, custom: &Map<String, Value>) -> Result<String>;

    /// The resource selection UI shown for deep-linking requests.
    fn selection_url(&self) -> String;
}

/// Resolves to fixed application paths, passing custom parameters along
/// as query string.
pub struct PathResolver {
    resource: Url,
    selection: String,
}

impl PathResolver {
    pub fn new(base_url: &str, resource_path: &str, selection_path: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| LtiError::Malformed(format!("bad tool base url: {e}")))?;
        let resource = base
            .join(resource_path)
            .map_err(|e| LtiError::Malformed(format!("bad resource path: {e}")))?;
        let selection = base
            .join(selection_path)
            .map_err(|e| LtiError::Malformed(format!("bad selection path: {e}")))?;

        Ok(Self {
            resource,
            selection: selection.to_string(),
        })
    }
}

impl ResourceResolver for PathResolver {
    fn resource_url(&self, custom: &Map<String, Value>) -> Result<String> {
        let mut url = self.resource.clone();
        if !custom.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in custom {
                match value {
                    Value::String(s) => query.append_pair(name, s),
                    other => query.append_pair(name, &other.to_string()),
                };
            }
        }
        Ok(url.to_string())
    }

    fn selection_url(&self) -> String {
        self.selection.clone()
    }
}
