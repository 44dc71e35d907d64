//! [`SettingsActionRunner`] – turns a confirmed settings-menu label into a
//! system command.
//!
//! | Step | Outcome |
//! |---|---|
//! | actions disabled | `false`, info log |
//! | another action still running | `false`, info log |
//! | label still cooling down | `false`, debug log only |
//! | no command resolvable | `false`, warning |
//! | resolved | cooldown stamped, command spawned detached, `true` |
//!
//! Only one command runs at a time: the gate is taken when a command is
//! spawned and released when its worker finishes.
//!
//! Resolution order for a label: the `commands` table, then the named
//! `*_cmd` field, then the built-in default. Completion is reported as an
//! [`ActionOutcome`] on a channel drained by [`log_outcomes`]; nothing flows
//! back into the display.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use dmc_types::monotonic_ms;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const LABEL_CALIB: &str = "CALIB";
pub const LABEL_WIFI: &str = "WIFI";
pub const LABEL_GIT_PULL: &str = "GIT PULL";
pub const LABEL_BRANCH: &str = "BRANCH";
pub const LABEL_SHUTDOWN: &str = "SHUTDOWN";
pub const LABEL_REBOOT: &str = "REBOOT";

const DEFAULT_SUDO: &str = "sudo -n";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// The `[oled_settings]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub enabled: bool,
    pub cooldown_s: f64,
    pub calib_cmd: Option<String>,
    pub wifi_cmd: Option<String>,
    pub git_pull_cmd: Option<String>,
    pub branch_cmd: Option<String>,
    pub shutdown_cmd: Option<String>,
    pub reboot_cmd: Option<String>,
    /// Label → command; wins over the named fields.
    pub commands: BTreeMap<String, String>,
    pub wifi_ssid: Option<String>,
    /// Name of the environment variable holding the Wi-Fi passphrase.
    pub wifi_psk_env: Option<String>,
    pub branch_target: Option<String>,
    /// Privilege prefix used when not running as root. Empty disables it.
    pub sudo_cmd: Option<String>,
    pub scripts_dir: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_s: 3.0,
            calib_cmd: None,
            wifi_cmd: None,
            git_pull_cmd: None,
            branch_cmd: None,
            shutdown_cmd: None,
            reboot_cmd: None,
            commands: BTreeMap::new(),
            wifi_ssid: None,
            wifi_psk_env: None,
            branch_target: None,
            sudo_cmd: None,
            scripts_dir: PathBuf::from("scripts"),
        }
    }
}

impl SettingsConfig {
    fn cooldown_ms(&self) -> u64 {
        if self.cooldown_s.is_finite() && self.cooldown_s > 0.0 {
            (self.cooldown_s * 1000.0).round() as u64
        } else {
            0
        }
    }

    fn named_command(&self, label: &str) -> Option<&String> {
        match label {
            LABEL_CALIB => self.calib_cmd.as_ref(),
            LABEL_WIFI => self.wifi_cmd.as_ref(),
            LABEL_GIT_PULL => self.git_pull_cmd.as_ref(),
            LABEL_BRANCH => self.branch_cmd.as_ref(),
            LABEL_SHUTDOWN => self.shutdown_cmd.as_ref(),
            LABEL_REBOOT => self.reboot_cmd.as_ref(),
            _ => None,
        }
    }

    /// The configured override for `label`, if any.
    fn override_for(&self, label: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|(key, _)| normalize_label(key) == label)
            .map(|(_, cmd)| cmd)
            .or_else(|| self.named_command(label))
            .map(String::as_str)
            .filter(|cmd| !cmd.trim().is_empty())
    }

    fn sudo(&self) -> &str {
        self.sudo_cmd.as_deref().unwrap_or(DEFAULT_SUDO)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors and outcomes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("no command configured for settings item {0:?}")]
    Unknown(String),

    #[error("{label} requires {var} to be set")]
    MissingEnv { label: String, var: &'static str },

    #[error("{label}: command is empty")]
    EmptyCommand { label: String },

    #[error("{label}: {details}")]
    BadQuoting { label: String, details: String },
}

/// How a triggered action ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Succeeded {
        label: String,
        stdout: String,
    },
    Failed {
        label: String,
        code: Option<i32>,
        stderr: String,
    },
    SpawnFailed {
        label: String,
        error: String,
    },
    DryRun {
        label: String,
        command: String,
    },
}

/// A label resolved to an argv plus the environment it adds.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    pub label: String,
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ResolvedCommand {
    /// The argv joined with single spaces.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Trim and upper-case a menu label.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_uppercase()
}

/// Split a command line with POSIX shell quoting.
fn split_words(label: &str, line: &str) -> Result<Vec<String>, ActionError> {
    shlex::split(line).ok_or_else(|| ActionError::BadQuoting {
        label: label.to_string(),
        details: format!("unbalanced quoting in {line:?}"),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Runner
// ────────────────────────────────────────────────────────────────────────────

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SettingsActionRunner {
    config: SettingsConfig,
    dry_run: bool,
    is_root: bool,
    /// Snapshot of the inherited environment used for resolution.
    env: HashMap<String, String>,
    last_triggered: Mutex<HashMap<String, u64>>,
    /// Label of the command currently running, if any.
    running: Arc<Mutex<Option<String>>>,
    outcomes: mpsc::UnboundedSender<ActionOutcome>,
}

/// Holds the one-at-a-time gate; dropping it opens the gate again, also when
/// the worker is aborted.
struct RunningGuard(Arc<Mutex<Option<String>>>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *lock(&self.0) = None;
    }
}

impl SettingsActionRunner {
    pub fn new(
        config: SettingsConfig,
        dry_run: bool,
        outcomes: mpsc::UnboundedSender<ActionOutcome>,
    ) -> Self {
        Self {
            config,
            dry_run,
            is_root: nix::unistd::geteuid().is_root(),
            env: std::env::vars().collect(),
            last_triggered: Mutex::new(HashMap::new()),
            running: Arc::new(Mutex::new(None)),
            outcomes,
        }
    }

    /// Resolve against `env` instead of the process environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Label of the command still running, if any.
    pub fn running(&self) -> Option<String> {
        lock(&self.running).clone()
    }

    /// Trigger `label` now. See [`Self::trigger_at`].
    pub fn trigger(&self, label: &str) -> bool {
        self.trigger_at(label, monotonic_ms())
    }

    /// Trigger `label` at monotonic time `now_ms`. Returns `true` once the
    /// action has been handed to a worker, without waiting for it.
    pub fn trigger_at(&self, label: &str, now_ms: u64) -> bool {
        let label = normalize_label(label);
        if !self.config.enabled {
            info!(label = %label, "settings actions disabled");
            return false;
        }

        let mut running = lock(&self.running);
        if let Some(busy) = running.as_deref() {
            info!(label = %label, running = %busy, "settings action busy");
            return false;
        }

        let resolved = {
            let mut last = lock(&self.last_triggered);
            let cooldown_ms = self.config.cooldown_ms();
            if let Some(at) = last.get(&label) {
                if now_ms.saturating_sub(*at) < cooldown_ms {
                    debug!(label = %label, "settings action cooling down");
                    return false;
                }
            }
            match self.resolve(&label) {
                Ok(resolved) => {
                    last.insert(label.clone(), now_ms);
                    resolved
                }
                Err(e) => {
                    warn!(label = %label, error = %e, "settings action not resolvable");
                    return false;
                }
            }
        };

        if self.dry_run {
            let command = resolved.command_line();
            info!(label = %label, command = %command, argv = ?resolved.argv, "settings action dry-run");
            let _ = self.outcomes.send(ActionOutcome::DryRun { label, command });
            return true;
        }
        *running = Some(label);
        drop(running);
        self.spawn(resolved, RunningGuard(Arc::clone(&self.running)));
        true
    }

    /// Resolve `label` (already normalised) to a command.
    pub fn resolve(&self, label: &str) -> Result<ResolvedCommand, ActionError> {
        let configured = self.config.override_for(label);
        let mut env = BTreeMap::new();
        let mut sudo_prefix = false;

        let line = match label {
            LABEL_CALIB => self.script_or(configured, "motor_calibrate.sh"),
            LABEL_WIFI => {
                let ssid = self
                    .config
                    .wifi_ssid
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| self.env.get("WIFI_SSID").cloned())
                    .ok_or_else(|| ActionError::MissingEnv {
                        label: label.to_string(),
                        var: "WIFI_SSID",
                    })?;
                env.insert("WIFI_SSID".to_string(), ssid);
                let psk = self
                    .config
                    .wifi_psk_env
                    .as_deref()
                    .and_then(|name| self.env.get(name));
                if let Some(psk) = psk {
                    env.insert("WIFI_PSK".to_string(), psk.clone());
                }
                self.script_or(configured, "oled_wifi_connect.sh")
            }
            LABEL_GIT_PULL => {
                self.export_sudo(&mut env);
                self.script_or(configured, "pull_and_restart.sh")
            }
            LABEL_BRANCH => {
                let target = self
                    .config
                    .branch_target
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| self.env.get("TARGET_BRANCH").cloned())
                    .ok_or_else(|| ActionError::MissingEnv {
                        label: label.to_string(),
                        var: "TARGET_BRANCH",
                    })?;
                env.insert("TARGET_BRANCH".to_string(), target);
                self.export_sudo(&mut env);
                self.script_or(configured, "oled_switch_branch.sh")
            }
            LABEL_SHUTDOWN => {
                sudo_prefix = true;
                configured.unwrap_or("systemctl poweroff").to_string()
            }
            LABEL_REBOOT => {
                sudo_prefix = true;
                configured.unwrap_or("systemctl reboot").to_string()
            }
            _ => configured
                .ok_or_else(|| ActionError::Unknown(label.to_string()))?
                .to_string(),
        };

        let mut argv = split_words(label, &line)?;
        if argv.is_empty() {
            return Err(ActionError::EmptyCommand {
                label: label.to_string(),
            });
        }
        if sudo_prefix && !self.is_root {
            let mut prefixed = split_words(label, self.config.sudo())?;
            prefixed.append(&mut argv);
            argv = prefixed;
        }
        Ok(ResolvedCommand {
            label: label.to_string(),
            argv,
            env,
        })
    }

    fn script_or(&self, configured: Option<&str>, script: &str) -> String {
        match configured {
            Some(cmd) => cmd.to_string(),
            None => self
                .config
                .scripts_dir
                .join(script)
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn export_sudo(&self, env: &mut BTreeMap<String, String>) {
        let sudo = self.config.sudo();
        if !self.is_root && !sudo.trim().is_empty() && !self.env.contains_key("SUDO") {
            env.insert("SUDO".to_string(), sudo.to_string());
        }
    }

    fn spawn(&self, resolved: ResolvedCommand, guard: RunningGuard) {
        let outcomes = self.outcomes.clone();
        let label = resolved.label.clone();
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let _ = outcomes.send(ActionOutcome::SpawnFailed {
                    label,
                    error: format!("no async runtime: {e}"),
                });
                return;
            }
        };
        info!(label = %label, command = %resolved.command_line(), "settings action start");
        handle.spawn(async move {
            let outcome = run_command(resolved).await;
            drop(guard);
            let _ = outcomes.send(outcome);
        });
    }
}

async fn run_command(resolved: ResolvedCommand) -> ActionOutcome {
    let ResolvedCommand { label, argv, env } = resolved;
    let Some((program, args)) = argv.split_first() else {
        return ActionOutcome::SpawnFailed {
            label,
            error: "empty argv".to_string(),
        };
    };
    let output = tokio::process::Command::new(program)
        .args(args)
        .envs(&env)
        .stdin(std::process::Stdio::null())
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => ActionOutcome::Succeeded {
            label,
            stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
        },
        Ok(out) => ActionOutcome::Failed {
            label,
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        },
        Err(e) => ActionOutcome::SpawnFailed {
            label,
            error: e.to_string(),
        },
    }
}

/// Log every outcome until all senders are gone.
pub async fn log_outcomes(mut outcomes: mpsc::UnboundedReceiver<ActionOutcome>) {
    while let Some(outcome) = outcomes.recv().await {
        match outcome {
            ActionOutcome::Succeeded { label, stdout } => {
                info!(label = %label, stdout = %stdout, "settings action done");
            }
            ActionOutcome::Failed {
                label,
                code,
                stderr,
            } => {
                warn!(label = %label, code = ?code, stderr = %stderr, "settings action failed");
            }
            ActionOutcome::SpawnFailed { label, error } => {
                warn!(label = %label, error = %error, "settings action could not start");
            }
            ActionOutcome::DryRun { label, command } => {
                debug!(label = %label, command = %command, "settings action skipped (dry-run)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(config: SettingsConfig) -> (SettingsActionRunner, mpsc::UnboundedReceiver<ActionOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = SettingsActionRunner::new(config, true, tx)
            .with_env(HashMap::new())
            .with_root(false);
        (runner, rx)
    }

    fn dry_runs(rx: &mut mpsc::UnboundedReceiver<ActionOutcome>) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            if let ActionOutcome::DryRun { label, command } = outcome {
                out.push((label, command));
            }
        }
        out
    }

    #[test]
    fn configured_commands_honour_shell_quoting() {
        let mut commands = BTreeMap::new();
        commands.insert(
            "JOIN".to_string(),
            r#"nmcli dev wifi connect "My Net" password 'a b\c' x\ y"#.to_string(),
        );
        commands.insert("OPEN".to_string(), "echo 'open".to_string());
        commands.insert("BLANK".to_string(), "   ".to_string());
        let config = SettingsConfig {
            commands,
            ..SettingsConfig::default()
        };
        let (runner, _rx) = runner(config);
        assert_eq!(
            runner.resolve("JOIN").unwrap().argv,
            vec!["nmcli", "dev", "wifi", "connect", "My Net", "password", r"a b\c", "x y"]
        );
        assert!(matches!(runner.resolve("OPEN"), Err(ActionError::BadQuoting { .. })));
        assert_eq!(runner.resolve("BLANK"), Err(ActionError::Unknown("BLANK".into())));
    }

    /// Collects formatted log lines written while it is the default subscriber.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            lock(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&lock(&self.0)).into_owned()
        }
    }

    #[test]
    fn dry_run_shutdown_logs_command_without_running_it() {
        let (runner, mut rx) = runner(SettingsConfig::default());
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        let accepted = tracing::subscriber::with_default(subscriber, || runner.trigger_at("shutdown", 0));
        assert!(accepted);
        let logged = capture.text();
        assert!(logged.contains("settings action dry-run"), "{logged}");
        assert!(logged.contains("sudo -n systemctl poweroff"), "{logged}");
        assert_eq!(
            dry_runs(&mut rx),
            vec![("SHUTDOWN".to_string(), "sudo -n systemctl poweroff".to_string())]
        );
    }

    #[test]
    fn cooldown_is_per_label() {
        let config = SettingsConfig {
            cooldown_s: 2.0,
            ..SettingsConfig::default()
        };
        let (runner, mut rx) = runner(config);
        assert!(runner.trigger_at("REBOOT", 1_000));
        assert!(!runner.trigger_at("REBOOT", 2_999));
        assert!(runner.trigger_at("SHUTDOWN", 2_999));
        assert!(runner.trigger_at("REBOOT", 3_000));
        assert_eq!(dry_runs(&mut rx).len(), 3);
    }

    #[test]
    fn unresolvable_trigger_does_not_start_cooldown() {
        let (runner, mut rx) = runner(SettingsConfig::default());
        assert!(!runner.trigger_at("WIFI", 0));
        assert!(!runner.trigger_at("LASER", 0));
        assert!(dry_runs(&mut rx).is_empty());
    }

    #[test]
    fn disabled_runner_rejects_everything() {
        let config = SettingsConfig {
            enabled: false,
            ..SettingsConfig::default()
        };
        let (runner, mut rx) = runner(config);
        assert!(!runner.trigger_at("REBOOT", 0));
        assert!(dry_runs(&mut rx).is_empty());
    }

    #[test]
    fn commands_table_beats_named_field() {
        let mut commands = BTreeMap::new();
        commands.insert("git pull".to_string(), "git pull --ff-only".to_string());
        let config = SettingsConfig {
            git_pull_cmd: Some("./other.sh".into()),
            calib_cmd: Some("python3 -m calib".into()),
            commands,
            ..SettingsConfig::default()
        };
        let (runner, _rx) = runner(config);
        assert_eq!(runner.resolve(LABEL_GIT_PULL).unwrap().argv, vec!["git", "pull", "--ff-only"]);
        assert_eq!(runner.resolve(LABEL_CALIB).unwrap().argv, vec!["python3", "-m", "calib"]);
    }

    #[test]
    fn builtin_scripts_live_under_scripts_dir() {
        let config = SettingsConfig {
            scripts_dir: PathBuf::from("/opt/dmc/scripts"),
            ..SettingsConfig::default()
        };
        let (runner, _rx) = runner(config);
        let git = runner.resolve(LABEL_GIT_PULL).unwrap();
        assert_eq!(git.argv, vec!["/opt/dmc/scripts/pull_and_restart.sh"]);
        assert_eq!(git.env.get("SUDO").map(String::as_str), Some("sudo -n"));
    }

    #[test]
    fn wifi_requires_ssid_and_reads_psk_from_named_var() {
        let config = SettingsConfig {
            wifi_psk_env: Some("HOME_PSK".into()),
            ..SettingsConfig::default()
        };
        let (runner, _rx) = runner(config.clone());
        assert_eq!(
            runner.resolve(LABEL_WIFI),
            Err(ActionError::MissingEnv {
                label: "WIFI".into(),
                var: "WIFI_SSID"
            })
        );

        let env = HashMap::from([
            ("WIFI_SSID".to_string(), "lab".to_string()),
            ("HOME_PSK".to_string(), "secret".to_string()),
        ]);
        let (runner, _rx) = runner_with_env(config, env);
        let wifi = runner.resolve(LABEL_WIFI).unwrap();
        assert_eq!(wifi.env.get("WIFI_SSID").map(String::as_str), Some("lab"));
        assert_eq!(wifi.env.get("WIFI_PSK").map(String::as_str), Some("secret"));
    }

    fn runner_with_env(
        config: SettingsConfig,
        env: HashMap<String, String>,
    ) -> (SettingsActionRunner, mpsc::UnboundedReceiver<ActionOutcome>) {
        let (runner, rx) = runner(config);
        (runner.with_env(env), rx)
    }

    #[test]
    fn branch_takes_target_from_config() {
        let config = SettingsConfig {
            branch_target: Some("release".into()),
            sudo_cmd: Some(String::new()),
            ..SettingsConfig::default()
        };
        let (runner, _rx) = runner(config);
        let branch = runner.resolve(LABEL_BRANCH).unwrap();
        assert_eq!(branch.env.get("TARGET_BRANCH").map(String::as_str), Some("release"));
        assert!(!branch.env.contains_key("SUDO"));
    }

    #[test]
    fn root_skips_sudo_prefix() {
        let (runner, _rx) = runner(SettingsConfig::default());
        let runner = runner.with_root(true);
        assert_eq!(runner.resolve(LABEL_REBOOT).unwrap().argv, vec!["systemctl", "reboot"]);
    }

    #[test]
    fn custom_labels_need_a_configured_command() {
        let mut commands = BTreeMap::new();
        commands.insert(" lights ".to_string(), "echo on".to_string());
        let config = SettingsConfig {
            commands,
            ..SettingsConfig::default()
        };
        let (runner, mut rx) = runner(config);
        assert!(runner.trigger_at("Lights", 0));
        assert_eq!(dry_runs(&mut rx), vec![("LIGHTS".to_string(), "echo on".to_string())]);
        assert_eq!(runner.resolve("NOPE"), Err(ActionError::Unknown("NOPE".into())));
    }

    #[tokio::test]
    async fn real_run_reports_exit_status() {
        let mut commands = BTreeMap::new();
        commands.insert("OK".to_string(), "true".to_string());
        commands.insert("BAD".to_string(), "false".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = SettingsActionRunner::new(
            SettingsConfig {
                commands,
                ..SettingsConfig::default()
            },
            false,
            tx,
        );
        assert!(runner.trigger_at("OK", 0));
        let ok = rx.recv().await.unwrap();
        assert!(matches!(ok, ActionOutcome::Succeeded { ref label, .. } if label == "OK"));
        assert!(runner.trigger_at("BAD", 0));
        let bad = rx.recv().await.unwrap();
        assert!(matches!(bad, ActionOutcome::Failed { ref label, code: Some(1), .. } if label == "BAD"));
    }

    #[tokio::test]
    async fn running_action_blocks_other_labels_until_done() {
        let mut commands = BTreeMap::new();
        commands.insert("SLOW".to_string(), "sleep 0.3".to_string());
        commands.insert("FAST".to_string(), "true".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = SettingsActionRunner::new(
            SettingsConfig {
                commands,
                cooldown_s: 0.0,
                ..SettingsConfig::default()
            },
            false,
            tx,
        );

        assert!(runner.trigger_at("SLOW", 0));
        assert_eq!(runner.running().as_deref(), Some("SLOW"));
        assert!(!runner.trigger_at("FAST", 10));
        assert!(!runner.trigger_at("REBOOT", 10));

        let done = rx.recv().await.unwrap();
        assert!(matches!(done, ActionOutcome::Succeeded { ref label, .. } if label == "SLOW"));
        assert_eq!(runner.running(), None);
        assert!(runner.trigger_at("FAST", 20));
        assert!(rx.recv().await.is_some());
    }
}
