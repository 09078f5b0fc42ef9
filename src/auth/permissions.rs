use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// Static role -> resource -> allowed-methods table, read once at startup.
///
/// Source document shape: `{"editor": {"resource1": ["POST", "GET"]}}`.
/// Lookups are exact, case-sensitive string matches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable {
    roles: HashMap<String, HashMap<String, HashSet<String>>>,
}

impl PermissionTable {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidPermissions(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    /// True iff some role grants `method` on `resource`. Unknown keys are simply not granted.
    pub fn has_permission<S: AsRef<str>>(&self, roles: &[S], resource: &str, method: &str) -> bool {
        roles.iter().any(|role| {
            self.roles
                .get(role.as_ref())
                .and_then(|resources| resources.get(resource))
                .is_some_and(|methods| methods.contains(method))
        })
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }
}
