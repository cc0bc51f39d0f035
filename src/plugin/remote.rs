//! Remote plugin discovery over the hosted content API.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::plugin::entity::{Plugin, PluginInfo, ScriptRef, ScriptType, select_single_script};
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::rate_limit::{QuotaProbe, QuotaSample, RateLimiter};
use crate::plugin::source::PluginSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("famulus/", env!("CARGO_PKG_VERSION"));

/// One entry of a content-API directory listing.
#[derive(Debug, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Thin client for the hosted content API.
///
/// Every response it sees feeds the shared rate limiter from the quota
/// headers, latest sample wins — including error responses, which still
/// carry authoritative counters.
pub struct ContentClient {
    http: reqwest::Client,
}

impl ContentClient {
    pub fn new() -> PluginResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    async fn get(&self, url: &str, limiter: &mut RateLimiter) -> PluginResult<reqwest::Response> {
        let response = self.http.get(url).send().await?;
        if let Some(sample) = quota_from_headers(response.headers()) {
            limiter.apply_sample(sample.remaining, sample.reset_at);
        }
        Ok(response.error_for_status()?)
    }

    pub async fn list_directory(
        &self,
        url: &str,
        limiter: &mut RateLimiter,
    ) -> PluginResult<Vec<ContentEntry>> {
        Ok(self.get(url, limiter).await?.json().await?)
    }

    pub async fn fetch_raw(&self, url: &str, limiter: &mut RateLimiter) -> PluginResult<String> {
        Ok(self.get(url, limiter).await?.text().await?)
    }
}

fn quota_from_headers(headers: &reqwest::header::HeaderMap) -> Option<QuotaSample> {
    let remaining: i64 = headers
        .get("x-ratelimit-remaining")?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    let reset: u64 = headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .parse()
        .ok()?;

    Some(QuotaSample {
        remaining,
        reset_at: SystemTime::UNIX_EPOCH + Duration::from_secs(reset),
    })
}

// Quota endpoint shape: `resources.core` carries the authoritative counters.
#[derive(Debug, Deserialize)]
struct QuotaDocument {
    resources: QuotaResources,
}

#[derive(Debug, Deserialize)]
struct QuotaResources {
    core: QuotaCore,
}

#[derive(Debug, Deserialize)]
struct QuotaCore {
    remaining: i64,
    reset: u64,
}

struct EndpointProbe<'a> {
    client: &'a ContentClient,
    url: String,
}

#[async_trait]
impl QuotaProbe for EndpointProbe<'_> {
    async fn fetch_quota(&self) -> PluginResult<QuotaSample> {
        let response = self
            .client
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;
        let doc: QuotaDocument = response.json().await?;

        Ok(QuotaSample {
            remaining: doc.resources.core.remaining,
            reset_at: SystemTime::UNIX_EPOCH + Duration::from_secs(doc.resources.core.reset),
        })
    }
}

pub struct RemoteDiscovery {
    client: ContentClient,
    source: PluginSource,
}

impl RemoteDiscovery {
    pub fn new(source: PluginSource) -> PluginResult<Self> {
        Ok(Self {
            client: ContentClient::new()?,
            source,
        })
    }

    /// Scan the remote catalog in API listing order.
    ///
    /// One rate-limit pre-check guards the whole session, not each call. A
    /// blocked quota or an unreachable API aborts this phase only; failures
    /// under one plugin directory are logged and that entry skipped.
    pub async fn discover(&self, limiter: &mut RateLimiter) -> PluginResult<Vec<Plugin>> {
        let probe = EndpointProbe {
            client: &self.client,
            url: self.source.quota_url(),
        };
        if limiter.is_blocked(&probe).await {
            return Err(PluginError::RateLimitExceeded);
        }

        let listing_url = self.source.contents_url("plugins")?;
        let entries = self.client.list_directory(&listing_url, limiter).await?;

        let mut plugins = Vec::new();
        for entry in entries.iter().filter(|entry| entry.kind == "dir") {
            match self.discover_one(entry, limiter).await {
                Ok(plugin) => plugins.push(plugin),
                Err(err) => {
                    tracing::warn!("skipping remote plugin {}: {err}", entry.name);
                }
            }
        }

        Ok(plugins)
    }

    async fn discover_one(
        &self,
        dir: &ContentEntry,
        limiter: &mut RateLimiter,
    ) -> PluginResult<Plugin> {
        let children_url = self.source.contents_url(&dir.path)?;
        let children = self.client.list_directory(&children_url, limiter).await?;

        let info_entry = children
            .iter()
            .find(|child| child.kind == "file" && child.name == "info.json");

        let mut plugin = match info_entry {
            Some(info_entry) => {
                let info_url = self.source.raw_url(&info_entry.path)?;
                let parsed = self
                    .client
                    .fetch_raw(&info_url, limiter)
                    .await
                    .and_then(|raw| PluginInfo::parse(&raw));

                match parsed {
                    Ok(info) => {
                        let mut plugin = Plugin::new(
                            info.name.unwrap_or_else(|| dir.name.clone()),
                            info.id.unwrap_or_else(|| dir.name.clone()),
                        );
                        plugin.version = info.version;
                        plugin.remote_source = info.remote_source;
                        plugin
                    }
                    Err(err) => {
                        tracing::warn!("unusable info.json for {}: {err}", dir.name);
                        Plugin::new("Unknown", Uuid::new_v4().to_string())
                    }
                }
            }
            None => Plugin::new("Unknown", Uuid::new_v4().to_string()),
        };

        let file_names: Vec<String> = children
            .iter()
            .filter(|child| child.kind == "file")
            .map(|child| child.name.clone())
            .collect();

        match select_single_script(&dir.path, file_names) {
            Ok(Some(script_name)) => {
                let raw_url = self.source.raw_url(&format!("{}/{script_name}", dir.path))?;
                plugin.script_type = ScriptType::from_file_name(&script_name);
                // The script's raw URL is the canonical remote source: it can
                // be re-fetched later without the listing API.
                plugin.remote_source = Some(raw_url.clone());

                match self.client.fetch_raw(&raw_url, limiter).await {
                    Ok(content) => plugin.content = Some(content),
                    Err(err) => {
                        tracing::warn!("script fetch failed for {}: {err}", dir.name);
                    }
                }
            }
            // Metadata-only entry: content absent, script type none.
            Ok(None) => {}
            Err(err) => tracing::warn!("{err}"),
        }

        self.load_script_refs(&children, &mut plugin, limiter).await;

        Ok(plugin)
    }

    /// Populate startup/function scripts from a `scripts/` child directory,
    /// mirroring the local layout: `start*` entries are the startup script,
    /// everything else is a function script, in listing order.
    async fn load_script_refs(
        &self,
        children: &[ContentEntry],
        plugin: &mut Plugin,
        limiter: &mut RateLimiter,
    ) {
        let Some(scripts_dir) = children
            .iter()
            .find(|child| child.kind == "dir" && child.name == "scripts")
        else {
            return;
        };

        let listing_url = match self.source.contents_url(&scripts_dir.path) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!("listing {} failed: {err}", scripts_dir.path);
                return;
            }
        };
        let entries = match self.client.list_directory(&listing_url, limiter).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("listing {} failed: {err}", scripts_dir.path);
                return;
            }
        };

        for entry in entries.iter().filter(|entry| entry.kind == "file") {
            let raw_url = match self.source.raw_url(&entry.path) {
                Ok(url) => url,
                Err(err) => {
                    tracing::warn!("script fetch failed for {}: {err}", entry.path);
                    continue;
                }
            };
            let content = match self.client.fetch_raw(&raw_url, limiter).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!("script fetch failed for {}: {err}", entry.path);
                    continue;
                }
            };

            let script = ScriptRef {
                name: entry.name.clone(),
                path: Some(entry.path.clone()),
                content: Some(content),
                script_type: ScriptType::from_file_name(&entry.name),
            };

            if entry.name.starts_with("start") {
                if plugin.startup_script.is_none() {
                    plugin.startup_script = Some(script);
                }
            } else {
                plugin.function_scripts.push(script);
            }
        }
    }
}
