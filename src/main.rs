mod model;
mod plugin;

use std::sync::Arc;

use anyhow::Result;

use model::config::AppConfig;
use plugin::{HostBoundary, PluginCatalog};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to file (never stdout — that belongs to the shell)
    let log_dir = directories::ProjectDirs::from("", "", "famulus")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "famulus.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter("famulus=info")
        .init();

    tracing::info!("famulus starting");

    let config = AppConfig::load()?;
    let mut catalog = PluginCatalog::new(&config, Arc::new(HostBoundary));
    catalog.initialize().await;
    tracing::info!(plugins = catalog.list_plugins().len(), "catalog initialized");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.split_first().map(|(cmd, rest)| (cmd.as_str(), rest)) {
        // Headless bootstrap: fire startup scripts, hand the catalog to
        // whatever shell surface is reading stdout.
        None => {
            catalog.run_startup_scripts().await;
            catalog.wait_for_pending().await;
            println!("{}", catalog.snapshot_json());
        }
        Some(("list", _)) => println!("{}", catalog.snapshot_json()),
        Some(("install", [id])) => {
            if let Err(err) = catalog.install(id).await {
                eprintln!("famulus: install {id}: {err}");
            }
        }
        Some(("run", [id])) => {
            catalog.execute_plugin(id, &[]).await;
            catalog.wait_for_pending().await;
        }
        Some(("run", [id, script_path, script_args @ ..])) => {
            catalog
                .execute_function_script(id, Some(script_path.as_str()), script_args)
                .await;
            catalog.wait_for_pending().await;
        }
        _ => eprintln!("usage: famulus [list | install <id> | run <id> [script-path] [args...]]"),
    }

    Ok(())
}
