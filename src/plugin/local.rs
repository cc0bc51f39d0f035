//! Local plugin discovery: one catalog entry per subdirectory of the
//! application-private plugins root.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::plugin::entity::{Plugin, PluginInfo, ScriptRef, ScriptType, select_single_script};
use crate::plugin::error::{PluginError, PluginResult};

pub struct LocalDiscovery {
    root: PathBuf,
}

impl LocalDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scan the plugins root in filesystem order.
    ///
    /// A root that does not exist yet is created and reported as an empty
    /// result. Failures inside one plugin directory are logged and skipped;
    /// only an unreadable root aborts the phase.
    pub async fn discover(&self) -> PluginResult<Vec<Plugin>> {
        if !self.root.is_dir() {
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|err| discovery_err(&self.root, err))?;
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|err| discovery_err(&self.root, err))?;

        let mut plugins = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => return Err(discovery_err(&self.root, err)),
            };

            // Platform bookkeeping entries (.DS_Store and friends).
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                _ => continue,
            }

            let dir = entry.path();
            match self.discover_one(&dir).await {
                Ok(plugin) => plugins.push(plugin),
                Err(err) => {
                    tracing::warn!("skipping local plugin {}: {err}", dir.display());
                }
            }
        }

        Ok(plugins)
    }

    async fn discover_one(&self, dir: &Path) -> PluginResult<Plugin> {
        let dir_name = dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let info_path = dir.join("info.json");
        let info = match tokio::fs::read_to_string(&info_path).await {
            Ok(raw) => match PluginInfo::parse(&raw) {
                Ok(info) => Some(info),
                Err(err) => {
                    tracing::warn!("malformed {}: {err}", info_path.display());
                    None
                }
            },
            Err(err) => {
                tracing::info!("no readable info.json in {}: {err}", dir.display());
                None
            }
        };

        let mut plugin = match info {
            Some(info) => {
                let mut plugin = Plugin::new(
                    info.name.unwrap_or_else(|| dir_name.clone()),
                    info.id.unwrap_or_else(|| dir_name.clone()),
                );
                plugin.version = info.version;
                plugin.remote_source = info.remote_source;
                plugin
            }
            // Absent or malformed metadata: the directory itself is the identity.
            None => Plugin::new(dir_name.clone(), dir_name),
        };

        match select_single_script(&dir.display().to_string(), file_names(dir).await?) {
            Ok(Some(script_name)) => {
                let script_path = dir.join(&script_name);
                let content = tokio::fs::read_to_string(&script_path)
                    .await
                    .map_err(|err| discovery_err(&script_path, err))?;

                plugin.script_type = ScriptType::from_file_name(&script_name);
                plugin.content = Some(content);
                plugin.local_path = Some(script_path);
            }
            Ok(None) => {}
            // Ambiguous selection: catalog the plugin without content.
            Err(err) => tracing::warn!("{err}"),
        }

        load_script_refs(dir, &mut plugin).await;

        Ok(plugin)
    }
}

/// Populate startup/function scripts from an optional `scripts/` directory:
/// `start*` entries are the startup script, everything else is a function
/// script, in scan order.
async fn load_script_refs(dir: &Path, plugin: &mut Plugin) {
    let scripts_dir = dir.join("scripts");
    let Ok(mut entries) = tokio::fs::read_dir(&scripts_dir).await else {
        return;
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("reading {}: {err}", scripts_dir.display());
                break;
            }
        };

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("unreadable script {}: {err}", path.display());
                continue;
            }
        };

        let script = ScriptRef {
            name: name.clone(),
            path: Some(path.display().to_string()),
            content: Some(content),
            script_type: ScriptType::from_file_name(&name),
        };

        if name.starts_with("start") {
            if plugin.startup_script.is_none() {
                plugin.startup_script = Some(script);
            }
        } else {
            plugin.function_scripts.push(script);
        }
    }
}

async fn file_names(dir: &Path) -> PluginResult<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|err| discovery_err(dir, err))?;

    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => return Err(discovery_err(dir, err)),
        };

        let is_file = entry
            .file_type()
            .await
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    Ok(names)
}

fn discovery_err(path: &Path, err: impl Display) -> PluginError {
    PluginError::Discovery {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
