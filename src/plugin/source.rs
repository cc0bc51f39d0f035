//! Remote catalog addressing.

use crate::plugin::error::{PluginError, PluginResult};

const DEFAULT_API_HOST: &str = "https://api.github.com";
const DEFAULT_RAW_HOST: &str = "https://raw.githubusercontent.com";

/// A remote plugin catalog root: one branch of one hosted repository.
///
/// URLs are produced deterministically from the (owner, repository, branch)
/// triple. A source with any field unset is invalid and produces no URL.
#[derive(Debug, Clone)]
pub struct PluginSource {
    owner: Option<String>,
    repository: Option<String>,
    branch: Option<String>,
    api_host: String,
    raw_host: String,
}

impl PluginSource {
    pub fn new(
        owner: Option<String>,
        repository: Option<String>,
        branch: Option<String>,
    ) -> Self {
        Self {
            owner,
            repository,
            branch,
            api_host: DEFAULT_API_HOST.to_string(),
            raw_host: DEFAULT_RAW_HOST.to_string(),
        }
    }

    /// Point the source at different hosts. Test seam; production uses the
    /// defaults.
    #[must_use]
    pub fn with_hosts(mut self, api_host: impl Into<String>, raw_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self.raw_host = raw_host.into();
        self
    }

    /// Content-API URL listing `path` within the repository.
    pub fn contents_url(&self, path: &str) -> PluginResult<String> {
        let (owner, repository, branch) = self.triple()?;
        Ok(format!(
            "{}/repos/{owner}/{repository}/contents/{path}?ref={branch}",
            self.api_host
        ))
    }

    /// Directly-fetchable raw-content URL for `path`.
    pub fn raw_url(&self, path: &str) -> PluginResult<String> {
        let (owner, repository, branch) = self.triple()?;
        Ok(format!(
            "{}/{owner}/{repository}/{branch}/{path}",
            self.raw_host
        ))
    }

    /// The authoritative quota endpoint of the content API.
    pub fn quota_url(&self) -> String {
        format!("{}/rate_limit", self.api_host)
    }

    fn triple(&self) -> PluginResult<(&str, &str, &str)> {
        let owner = self
            .owner
            .as_deref()
            .ok_or(PluginError::SourceIncomplete("owner"))?;
        let repository = self
            .repository
            .as_deref()
            .ok_or(PluginError::SourceIncomplete("repository"))?;
        let branch = self
            .branch
            .as_deref()
            .ok_or(PluginError::SourceIncomplete("branch"))?;
        Ok((owner, repository, branch))
    }
}
