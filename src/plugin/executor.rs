//! The external execution boundary.
//!
//! Plugin script content is untrusted third-party code. The core never
//! evaluates it in-process; every language crosses this trait, and the
//! production implementation runs interpreters as separate host processes.
//! Timeout and cancellation policy live on the far side of this boundary.

use async_trait::async_trait;
use tokio::process::Command;

use crate::plugin::entity::ScriptType;
use crate::plugin::error::{PluginError, PluginResult};

#[async_trait]
pub trait ExecutionBoundary: Send + Sync {
    /// Run JavaScript content and return its output once it finishes.
    async fn run_javascript_inline(&self, content: &str) -> PluginResult<String>;

    /// Check whether the interpreter for `language` is present on the host.
    async fn probe_interpreter(&self, language: ScriptType) -> bool;

    /// Run script content with the interpreter for `language`.
    async fn run_script(
        &self,
        language: ScriptType,
        content: &str,
        args: &[String],
    ) -> PluginResult<String>;
}

/// Process-backed boundary: one interpreter process per run.
#[derive(Debug, Default)]
pub struct HostBoundary;

impl HostBoundary {
    fn interpreter(language: ScriptType) -> Option<(&'static str, &'static str)> {
        match language {
            ScriptType::Javascript => Some(("node", "-e")),
            ScriptType::Python => Some(("python3", "-c")),
            ScriptType::Shell => Some(("sh", "-c")),
            ScriptType::Unsupported | ScriptType::None => None,
        }
    }
}

#[async_trait]
impl ExecutionBoundary for HostBoundary {
    async fn run_javascript_inline(&self, content: &str) -> PluginResult<String> {
        self.run_script(ScriptType::Javascript, content, &[]).await
    }

    async fn probe_interpreter(&self, language: ScriptType) -> bool {
        let Some((program, _)) = Self::interpreter(language) else {
            return false;
        };

        match Command::new(program).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn run_script(
        &self,
        language: ScriptType,
        content: &str,
        args: &[String],
    ) -> PluginResult<String> {
        let (program, eval_flag) = Self::interpreter(language)
            .ok_or_else(|| PluginError::Execution(format!("no interpreter for {language}")))?;

        let output = Command::new(program)
            .arg(eval_flag)
            .arg(content)
            .args(args)
            .output()
            .await
            .map_err(|err| PluginError::Execution(format!("{program}: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::Execution(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim_end()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Boundary double that records every call instead of running anything.
    pub(crate) struct RecordingBoundary {
        pub python_available: bool,
        pub fail_javascript: bool,
        pub javascript_runs: Mutex<Vec<String>>,
        pub script_runs: Mutex<Vec<(ScriptType, String, Vec<String>)>>,
    }

    impl Default for RecordingBoundary {
        fn default() -> Self {
            Self {
                python_available: true,
                fail_javascript: false,
                javascript_runs: Mutex::new(Vec::new()),
                script_runs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExecutionBoundary for RecordingBoundary {
        async fn run_javascript_inline(&self, content: &str) -> PluginResult<String> {
            self.javascript_runs
                .lock()
                .expect("lock poisoned")
                .push(content.to_string());

            if self.fail_javascript {
                Err(PluginError::Execution("boom".into()))
            } else {
                Ok(String::new())
            }
        }

        async fn probe_interpreter(&self, language: ScriptType) -> bool {
            match language {
                ScriptType::Python => self.python_available,
                ScriptType::Javascript | ScriptType::Shell => true,
                ScriptType::Unsupported | ScriptType::None => false,
            }
        }

        async fn run_script(
            &self,
            language: ScriptType,
            content: &str,
            args: &[String],
        ) -> PluginResult<String> {
            self.script_runs.lock().expect("lock poisoned").push((
                language,
                content.to_string(),
                args.to_vec(),
            ));
            Ok(String::new())
        }
    }
}
