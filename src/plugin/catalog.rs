//! The merged plugin catalog and its dispatch surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::model::config::AppConfig;
use crate::plugin::entity::Plugin;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::executor::ExecutionBoundary;
use crate::plugin::keys::normalize_keys;
use crate::plugin::local::LocalDiscovery;
use crate::plugin::rate_limit::RateLimiter;
use crate::plugin::remote::RemoteDiscovery;

/// Owns the plugin list for one session and sequences the two discovery
/// phases. Nothing in here ever throws past the surface: lookups that miss
/// and scripts that fail are logged no-ops.
pub struct PluginCatalog {
    plugins: Vec<Plugin>,
    local: LocalDiscovery,
    remote: Option<RemoteDiscovery>,
    limiter: RateLimiter,
    boundary: Arc<dyn ExecutionBoundary>,
    plugins_root: PathBuf,
}

impl PluginCatalog {
    pub fn new(config: &AppConfig, boundary: Arc<dyn ExecutionBoundary>) -> Self {
        let plugins_root = config.plugins_root();

        let remote = if config.plugins.remote_enabled {
            match RemoteDiscovery::new(config.plugin_source()) {
                Ok(remote) => Some(remote),
                Err(err) => {
                    tracing::error!("remote discovery unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            plugins: Vec::new(),
            local: LocalDiscovery::new(&plugins_root),
            remote,
            limiter: RateLimiter::new(),
            boundary,
            plugins_root,
        }
    }

    /// Run both discovery phases, strictly sequential: local completes before
    /// remote starts. Each phase appends what it found; a failed phase is
    /// logged and the other still runs. A partial catalog is an accepted
    /// terminal state.
    pub async fn initialize(&mut self) {
        match self.local.discover().await {
            Ok(found) => {
                tracing::info!(count = found.len(), "local discovery complete");
                self.append(found);
            }
            Err(err) => tracing::error!("local discovery failed: {err}"),
        }

        if let Some(remote) = &self.remote {
            match remote.discover(&mut self.limiter).await {
                Ok(found) => {
                    tracing::info!(count = found.len(), "remote discovery complete");
                    self.append(found);
                }
                Err(PluginError::RateLimitExceeded) => {
                    tracing::warn!("remote discovery skipped: rate limited, catalog is partial");
                }
                Err(err) => tracing::error!("remote discovery failed: {err}"),
            }
        }

        tracing::info!(total = self.plugins.len(), "catalog ready");
    }

    fn append(&mut self, found: Vec<Plugin>) {
        for plugin in found {
            if self.plugins.iter().any(|existing| existing.id == plugin.id) {
                tracing::warn!(id = %plugin.id, "duplicate plugin id, keeping the first entry");
                continue;
            }
            self.plugins.push(plugin);
        }
    }

    /// Snapshot in discovery order: local entries first, then remote.
    pub fn list_plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// The catalog for the presentation layer, camelCase keys throughout.
    pub fn snapshot_json(&self) -> serde_json::Value {
        match serde_json::to_value(&self.plugins) {
            Ok(value) => normalize_keys(value),
            Err(err) => {
                tracing::error!("catalog snapshot failed: {err}");
                serde_json::Value::Array(Vec::new())
            }
        }
    }

    /// Drop every entry. `initialize` is additive; callers that want a true
    /// refresh clear first.
    #[allow(dead_code)] // Catalog surface for the shell front end.
    pub fn clear(&mut self) {
        self.plugins.clear();
    }

    /// Dispatch a plugin's main script.
    pub async fn execute_plugin(&mut self, id: &str, args: &[String]) {
        let boundary = Arc::clone(&self.boundary);
        let Some(plugin) = self.plugins.iter_mut().find(|plugin| plugin.id == id) else {
            tracing::error!(id = %id, "plugin not found");
            return;
        };
        plugin.execute(&boundary, args).await;
    }

    /// Fire a plugin's startup script. No startup script configured is a
    /// silent no-op; an unknown id is a logged one.
    pub async fn execute_startup_script(&mut self, id: &str) {
        let boundary = Arc::clone(&self.boundary);
        let Some(plugin) = self.plugins.iter_mut().find(|plugin| plugin.id == id) else {
            tracing::error!(id = %id, "plugin not found");
            return;
        };
        let Some(script) = plugin.startup_script.clone() else {
            return;
        };
        plugin
            .route(script.script_type, script.content, &boundary, &[])
            .await;
    }

    /// Fire the function script registered at `path`. An absent or empty
    /// path is a no-op.
    pub async fn execute_function_script(&mut self, id: &str, path: Option<&str>, args: &[String]) {
        let Some(path) = path.filter(|path| !path.is_empty()) else {
            return;
        };

        let boundary = Arc::clone(&self.boundary);
        let Some(plugin) = self.plugins.iter_mut().find(|plugin| plugin.id == id) else {
            tracing::error!(id = %id, "plugin not found");
            return;
        };
        let Some(script) = plugin
            .function_scripts
            .iter()
            .find(|script| script.path.as_deref() == Some(path))
            .cloned()
        else {
            tracing::error!(id = %id, path = %path, "no function script at that path");
            return;
        };

        plugin
            .route(script.script_type, script.content, &boundary, args)
            .await;
    }

    /// Fire every cataloged startup script, in catalog order.
    pub async fn run_startup_scripts(&mut self) {
        let ids: Vec<String> = self.plugins.iter().map(|plugin| plugin.id.clone()).collect();
        for id in ids {
            self.execute_startup_script(&id).await;
        }
    }

    /// Join every in-flight run. Dispatch itself never blocks; the shell
    /// calls this when it is about to exit.
    pub async fn wait_for_pending(&mut self) {
        for plugin in &mut self.plugins {
            if let Some(handle) = plugin.process.take() {
                handle.wait().await;
            }
        }
    }

    /// Materialize a remote-origin plugin into the local plugins directory.
    pub async fn install(&mut self, id: &str) -> PluginResult<()> {
        let plugins_root = self.plugins_root.clone();
        let Some(plugin) = self.plugins.iter_mut().find(|plugin| plugin.id == id) else {
            return Err(PluginError::Metadata {
                path: id.to_string(),
                message: "plugin not found".into(),
            });
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        plugin.fetch_from_remote(&http, &plugins_root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::entity::ScriptType;
    use crate::plugin::executor::testing::RecordingBoundary;
    use crate::plugin::source::PluginSource;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn catalog_at(root: &Path, remote: Option<RemoteDiscovery>) -> (PluginCatalog, Arc<RecordingBoundary>) {
        let recording = Arc::new(RecordingBoundary::default());
        let catalog = PluginCatalog {
            plugins: Vec::new(),
            local: LocalDiscovery::new(root),
            remote,
            limiter: RateLimiter::new(),
            boundary: recording.clone(),
            plugins_root: root.to_path_buf(),
        };
        (catalog, recording)
    }

    #[tokio::test]
    async fn catalogs_a_local_plugin_and_no_ops_without_scripts() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "myplugin/info.json",
            r#"{"name":"Echo","id":"p1"}"#,
        );
        write(root.path(), "myplugin/script.js", "console.log('hi')");

        let (mut catalog, recording) = catalog_at(root.path(), None);
        catalog.initialize().await;

        let plugins = catalog.list_plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].id, "p1");
        assert_eq!(plugins[0].name, "Echo");
        assert_eq!(plugins[0].script_type, ScriptType::Javascript);

        // No path given: no-op. No startup script configured: no-op.
        catalog.execute_function_script("p1", None, &[]).await;
        catalog.execute_startup_script("p1").await;

        assert!(recording.javascript_runs.lock().unwrap().is_empty());
        assert!(recording.script_runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_a_logged_no_op_never_a_fault() {
        let root = TempDir::new().unwrap();
        let (mut catalog, recording) = catalog_at(root.path(), None);
        catalog.initialize().await;

        catalog.execute_startup_script("ghost").await;
        catalog
            .execute_function_script("ghost", Some("anywhere"), &[])
            .await;
        catalog.execute_plugin("ghost", &[]).await;

        assert!(recording.javascript_runs.lock().unwrap().is_empty());
        assert!(recording.script_runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_keep_the_first_entry() {
        let root = TempDir::new().unwrap();
        write(root.path(), "one/info.json", r#"{"name":"One","id":"dup"}"#);
        write(root.path(), "two/info.json", r#"{"name":"Two","id":"dup"}"#);

        let (mut catalog, _) = catalog_at(root.path(), None);
        catalog.initialize().await;

        assert_eq!(catalog.list_plugins().len(), 1);
    }

    #[tokio::test]
    async fn local_entries_precede_remote_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resources": {"core": {"remaining": 100, "reset": 4_102_444_800_u64}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/repos/acme/acme-plugins/contents/plugins"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "remote-echo", "path": "plugins/remote-echo", "type": "dir"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/repos/acme/acme-plugins/contents/plugins/remote-echo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "info.json", "path": "plugins/remote-echo/info.json", "type": "file"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/acme/acme-plugins/main/plugins/remote-echo/info.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"name":"Remote","id":"r1"}"#),
            )
            .mount(&server)
            .await;

        let source = PluginSource::new(
            Some("acme".into()),
            Some("acme-plugins".into()),
            Some("main".into()),
        )
        .with_hosts(server.uri(), server.uri());

        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "local-echo/info.json",
            r#"{"name":"Local","id":"l1"}"#,
        );

        let (mut catalog, _) =
            catalog_at(root.path(), Some(RemoteDiscovery::new(source).unwrap()));
        catalog.initialize().await;

        let ids: Vec<&str> = catalog
            .list_plugins()
            .iter()
            .map(|plugin| plugin.id.as_str())
            .collect();
        assert_eq!(ids, ["l1", "r1"]);
    }

    #[tokio::test]
    async fn function_scripts_dispatch_with_args() {
        let root = TempDir::new().unwrap();
        write(root.path(), "tool/info.json", r#"{"name":"Tool","id":"t1"}"#);
        write(root.path(), "tool/scripts/greet.sh", "echo hello");

        let (mut catalog, recording) = catalog_at(root.path(), None);
        catalog.initialize().await;

        let script_path = catalog.list_plugins()[0].function_scripts[0]
            .path
            .clone()
            .unwrap();
        catalog
            .execute_function_script("t1", Some(&script_path), &["world".to_string()])
            .await;
        catalog.wait_for_pending().await;

        let runs = recording.script_runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, ScriptType::Shell);
        assert_eq!(runs[0].1, "echo hello");
        assert_eq!(runs[0].2, vec!["world".to_string()]);
    }

    #[tokio::test]
    async fn run_startup_scripts_fires_each_configured_startup() {
        let root = TempDir::new().unwrap();
        write(root.path(), "boot/info.json", r#"{"name":"Boot","id":"b1"}"#);
        write(root.path(), "boot/scripts/start.js", "console.log('boot')");
        write(root.path(), "quiet/info.json", r#"{"name":"Quiet","id":"q1"}"#);

        let (mut catalog, recording) = catalog_at(root.path(), None);
        catalog.initialize().await;
        catalog.run_startup_scripts().await;
        catalog.wait_for_pending().await;

        let runs = recording.javascript_runs.lock().unwrap();
        assert_eq!(runs.as_slice(), ["console.log('boot')"]);
    }

    #[tokio::test]
    async fn snapshot_uses_camel_case_keys_and_clear_empties() {
        let root = TempDir::new().unwrap();
        write(root.path(), "echo/info.json", r#"{"name":"Echo","id":"p1"}"#);
        write(root.path(), "echo/script.js", "console.log('hi')");

        let (mut catalog, _) = catalog_at(root.path(), None);
        catalog.initialize().await;

        let snapshot = catalog.snapshot_json();
        let first = &snapshot.as_array().unwrap()[0];
        assert_eq!(first["scriptType"], "javascript");
        assert!(first.get("localPath").is_some());

        catalog.clear();
        assert!(catalog.list_plugins().is_empty());
        assert_eq!(catalog.snapshot_json(), serde_json::json!([]));
    }

    #[tokio::test]
    async fn install_materializes_a_remote_plugin_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/echo.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("console.log('hi')"))
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let (mut catalog, _) = catalog_at(root.path(), None);

        let mut plugin = Plugin::new("Echo", "p1");
        plugin.script_type = ScriptType::Javascript;
        plugin.remote_source = Some(format!("{}/echo.js", server.uri()));
        catalog.append(vec![plugin]);

        catalog.install("p1").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(root.path().join("p1/script.js")).unwrap(),
            "console.log('hi')"
        );
        assert!(root.path().join("p1/info.json").is_file());
        assert!(catalog.install("ghost").await.is_err());
    }
}
