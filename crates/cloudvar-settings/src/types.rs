//! Settings schema.

use cloudvar_core::{ProjectId, SessionConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Everything needed to open a cloud session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudSettings {
    /// Project whose variables to read and write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Username sent in the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Connection options.
    pub session: SessionConfig,
}

impl CloudSettings {
    /// Project id and username, or an error naming the one that is missing.
    pub fn identity(&self) -> Result<(ProjectId, String)> {
        let project_id = self
            .project_id
            .clone()
            .ok_or_else(|| SettingsError::MissingIdentity { field: "projectId" })?;
        let username = self
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SettingsError::MissingIdentity { field: "username" })?;
        Ok((project_id, username))
    }
}
