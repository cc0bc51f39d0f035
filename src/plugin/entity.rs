//! The plugin entity: metadata, persistence, and execution routing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::executor::ExecutionBoundary;
use crate::plugin::keys::normalize_keys;

/// Script language, derived strictly from a file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Javascript,
    Python,
    Shell,
    /// Recognized as a script file but no execution mechanism is routed.
    Unsupported,
    /// No script at all. A valid, execution-incapable state.
    #[default]
    None,
}

impl ScriptType {
    pub fn from_file_name(name: &str) -> Self {
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("js") => Self::Javascript,
            Some("py") => Self::Python,
            Some("sh") => Self::Shell,
            _ => Self::Unsupported,
        }
    }

    /// The file extension used when synthesizing a script path. `None` for
    /// types that cannot name a file.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::Javascript => Some("js"),
            Self::Python => Some("py"),
            Self::Shell => Some("sh"),
            Self::Unsupported | Self::None => None,
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::Shell => "shell",
            Self::Unsupported => "unsupported",
            Self::None => "none",
        };
        f.write_str(label)
    }
}

/// A named startup or function script carried by a plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRef {
    pub name: String,
    /// Lookup key for dispatch: a filesystem path for local plugins, a
    /// repository-relative path for remote ones.
    pub path: Option<String>,
    pub content: Option<String>,
    pub script_type: ScriptType,
}

/// The `info.json` metadata document, as written by plugin authors.
///
/// Everything is optional; discovery fills the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: Option<String>,
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_source: Option<String>,
}

impl PluginInfo {
    /// Parse an info document, folding third-party snake_case keys to the
    /// canonical camelCase form first.
    pub fn parse(raw: &str) -> PluginResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Ok(serde_json::from_value(normalize_keys(value))?)
    }
}

/// Opaque handle to an in-flight external run. Dropping it detaches the run
/// rather than cancelling it; cancellation is not supported.
#[derive(Debug)]
pub struct RunHandle(JoinHandle<()>);

impl RunHandle {
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}

/// What a dispatch attempt did. Failures never escape as errors; they land
/// in the log and the plugin stays cataloged and re-invocable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The run finished before returning (the inline JavaScript path).
    Completed,
    /// The run was handed to the execution boundary; a handle is in flight.
    Pending,
    /// Nothing was dispatched.
    Skipped,
}

/// A cataloged unit of third-party behavior.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
    /// Where the main script lives on disk, once it does.
    pub local_path: Option<PathBuf>,
    /// Directly-fetchable raw-content URL for the main script.
    pub remote_source: Option<String>,
    pub script_type: ScriptType,
    pub content: Option<String>,
    pub startup_script: Option<ScriptRef>,
    pub function_scripts: Vec<ScriptRef>,
    /// Present only while an externally-delegated run is in flight.
    #[serde(skip)]
    pub process: Option<RunHandle>,
}

impl Plugin {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Write the script content and its sibling info document under
    /// `plugins_root`. Both writes are idempotent full overwrites; this is
    /// the subsystem's only local write path.
    pub async fn persist(&mut self, plugins_root: &Path) -> PluginResult<()> {
        let dir = plugins_root.join(&self.id);
        tokio::fs::create_dir_all(&dir).await?;

        if let (Some(content), Some(ext)) = (self.content.as_deref(), self.script_type.extension())
        {
            let script_path = match &self.local_path {
                Some(path) => path.clone(),
                None => dir.join(format!("script.{ext}")),
            };
            tokio::fs::write(&script_path, content).await?;
            self.local_path = Some(script_path);
        }

        let info = PluginInfo {
            name: Some(self.name.clone()),
            id: Some(self.id.clone()),
            version: self.version.clone(),
            remote_source: self.remote_source.clone(),
        };
        tokio::fs::write(dir.join("info.json"), serde_json::to_vec_pretty(&info)?).await?;

        Ok(())
    }

    /// Materialize a remote-origin plugin locally: read `remote_source` into
    /// `content`, then persist.
    pub async fn fetch_from_remote(
        &mut self,
        http: &reqwest::Client,
        plugins_root: &Path,
    ) -> PluginResult<()> {
        let Some(url) = self.remote_source.clone() else {
            return Err(PluginError::Metadata {
                path: self.id.clone(),
                message: "no remote source to fetch".into(),
            });
        };

        let response = http.get(&url).send().await?.error_for_status()?;
        self.content = Some(response.text().await?);
        self.persist(plugins_root).await
    }

    /// Dispatch the plugin's main script.
    pub async fn execute(
        &mut self,
        boundary: &Arc<dyn ExecutionBoundary>,
        args: &[String],
    ) -> ExecOutcome {
        let script_type = self.script_type;
        let content = self.content.clone();
        self.route(script_type, content, boundary, args).await
    }

    /// Route script content to its execution mechanism.
    ///
    /// Externally-delegated runs (Python, shell) come back immediately as
    /// `Pending` with the handle stored on the plugin; inline JavaScript
    /// completes before returning. Every failure is trapped here — callers
    /// never see a fault.
    pub(crate) async fn route(
        &mut self,
        script_type: ScriptType,
        content: Option<String>,
        boundary: &Arc<dyn ExecutionBoundary>,
        args: &[String],
    ) -> ExecOutcome {
        let Some(content) = content else {
            tracing::info!(id = %self.id, "no script content to execute");
            return ExecOutcome::Skipped;
        };

        match script_type {
            ScriptType::Javascript => {
                match boundary.run_javascript_inline(&content).await {
                    Ok(output) => {
                        tracing::debug!(id = %self.id, output = %output.trim_end(), "javascript finished");
                    }
                    Err(err) => {
                        tracing::error!(id = %self.id, "javascript failed: {err}");
                    }
                }
                ExecOutcome::Completed
            }
            ScriptType::Python => {
                if !boundary.probe_interpreter(ScriptType::Python).await {
                    let err = PluginError::CapabilityMissing("python3".into());
                    tracing::error!(id = %self.id, "{err}");
                    return ExecOutcome::Skipped;
                }
                self.dispatch_external(ScriptType::Python, content, boundary, args)
            }
            ScriptType::Shell => self.dispatch_external(ScriptType::Shell, content, boundary, args),
            ScriptType::Unsupported | ScriptType::None => {
                tracing::warn!(id = %self.id, script_type = %script_type, "script type cannot be executed");
                ExecOutcome::Skipped
            }
        }
    }

    fn dispatch_external(
        &mut self,
        language: ScriptType,
        content: String,
        boundary: &Arc<dyn ExecutionBoundary>,
        args: &[String],
    ) -> ExecOutcome {
        let boundary = Arc::clone(boundary);
        let args = args.to_vec();
        let id = self.id.clone();

        let handle = tokio::spawn(async move {
            match boundary.run_script(language, &content, &args).await {
                Ok(output) => {
                    tracing::debug!(id = %id, output = %output.trim_end(), "{language} script finished");
                }
                Err(err) => {
                    tracing::error!(id = %id, "{language} script failed: {err}");
                }
            }
        });

        self.process = Some(RunHandle(handle));
        ExecOutcome::Pending
    }
}

/// Pick the single `script*`-prefixed entry from a directory scan.
///
/// More than one match is ambiguous: the caller gets a metadata error and
/// catalogs the plugin without content instead of picking arbitrarily.
pub(crate) fn select_single_script(
    origin: &str,
    mut candidates: Vec<String>,
) -> PluginResult<Option<String>> {
    candidates.retain(|name| name.starts_with("script"));

    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        n => Err(PluginError::Metadata {
            path: origin.to_string(),
            message: format!("{n} script files found, expected one"),
        }),
    }
}
