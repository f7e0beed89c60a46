//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use console_sdk::prelude::{
    ConsoleClient, ConsoleConfig, FanoutNotifier, Notice, RecordingNotifier, ReqwestTransport,
    ScriptedTransport, TracingNotifier,
};

use crate::output::Output;

const CONFIG_NAMES: [&str; 3] = ["console.toml", ".console.toml", "console.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Loaded configuration, with environment overrides applied.
    pub config: ConsoleConfig,
    /// Where the configuration came from, if a file was found.
    pub config_path: Option<PathBuf>,
    pub output: Output,
    pub cwd: PathBuf,
    replay: Option<PathBuf>,
    notices: Arc<RecordingNotifier>,
}

impl Context {
    /// Load context from an explicit config file or the nearest one found.
    pub fn load(config_path: Option<&str>, replay: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => Some(resolve(&cwd, path)),
            None => find_config(&cwd),
        };
        let config = match &config_path {
            Some(path) => ConsoleConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => ConsoleConfig::default(),
        };

        Ok(Self {
            config: config.apply_env(),
            config_path,
            output,
            replay: replay.map(|path| resolve(&cwd, path)),
            cwd,
            notices: Arc::new(RecordingNotifier::new()),
        })
    }

    /// Build the client for this invocation.
    ///
    /// With `--replay` the client answers from the script and never touches
    /// the network.
    pub fn client(&self) -> Result<ConsoleClient> {
        let builder = match &self.replay {
            Some(path) => {
                let script = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read replay script: {}", path.display()))?;
                let transport = ScriptedTransport::from_json(&script)
                    .with_context(|| format!("Invalid replay script: {}", path.display()))?;
                self.output
                    .debug(&format!("replaying from {}", path.display()));
                ConsoleClient::builder(Arc::new(transport))
            }
            None => {
                self.config.validate()?;
                let transport = ReqwestTransport::from_config(&self.config.api)?;
                self.output
                    .debug(&format!("connecting to {}", transport.base_url()));
                ConsoleClient::builder(Arc::new(transport))
            }
        };

        let notifier = FanoutNotifier::new()
            .with(Arc::new(TracingNotifier))
            .with(self.notices.clone());
        Ok(builder
            .config(&self.config)
            .notifier(Arc::new(notifier))
            .build())
    }

    /// Print the notices raised while the command ran.
    pub fn report_notices(&self) {
        if self.output.is_json() {
            for line in self.notices.to_json_lines() {
                eprintln!("{}", line);
            }
            return;
        }
        for notice in self.notices.take() {
            match notice {
                Notice::ServerUnavailable { path, status, code } => self.output.warn(&format!(
                    "Service unavailable for {} (HTTP {}, {}), try again later",
                    path, status, code
                )),
                Notice::ReauthenticationRequired => {
                    self.output.warn("Session expired, sign in again")
                }
            }
        }
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve(&self.cwd, path)
    }
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Find the nearest config file walking up from `start`.
fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config_walks_up() {
        let root = std::env::temp_dir().join(format!("console-cli-find-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(".console.toml"), "[api]\n").unwrap();

        assert_eq!(find_config(&nested), Some(root.join(".console.toml")));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let cwd = Path::new("/work");
        assert_eq!(resolve(cwd, "/etc/console.toml"), PathBuf::from("/etc/console.toml"));
        assert_eq!(resolve(cwd, "console.toml"), PathBuf::from("/work/console.toml"));
    }
}
