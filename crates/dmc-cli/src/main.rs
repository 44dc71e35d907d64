//! `dmc-robot` – entry point for the robot control node.
//!
//! ```text
//! dmc-robot robot  [--config PATH] [--robot-id ID] [--dry-run]
//!                  [--no-camera] [--log-all-cmd] [--print-motor-pw]
//! dmc-robot health [--config PATH] [--robot-id ID] [--dry-run]
//! ```
//!
//! 1. Loads `config.toml` (see [`config`]) and applies `--robot-id`; outside
//!    dry-run the calibrated motor trim replaces the configured one.
//! 2. Installs the tracing subscriber; `--log-level` wins over `RUST_LOG`.
//! 3. Starts the node on a multi-threaded Tokio runtime and waits for
//!    Ctrl-C / SIGTERM, then shuts down in order.
//!
//! Fatal errors print one line naming what failed and exit with status 1.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dmc_hal::{HardwareSet, SimHardware};
use dmc_runtime::{HealthNode, NodeConfig, NodeOptions, RobotNode, init_tracing};
use dmc_types::NodeError;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "dmc-robot")]
#[command(about = "Differential-drive robot control node")]
#[command(version, propagate_version = true)]
struct Cli {
    /// Configuration file (default: ./config.toml, optional).
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override `robot_id` from the configuration.
    #[arg(long = "robot-id", global = true, value_name = "ID")]
    robot_id: Option<String>,

    /// Log traffic instead of driving real hardware; settings actions only log.
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,

    /// Log filter, e.g. `debug` or `dmc_kernel=trace` (overrides RUST_LOG).
    #[arg(long = "log-level", global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full node: motor, sensors, display, heartbeat.
    Robot(RobotArgs),
    /// Run only the health heartbeat.
    Health,
}

#[derive(Args, Debug, Default)]
struct RobotArgs {
    /// Do not start the camera loop.
    #[arg(long = "no-camera")]
    no_camera: bool,

    /// Log every motor command instead of a rate-limited sample.
    #[arg(long = "log-all-cmd")]
    log_all_cmd: bool,

    /// Log every actuator pulse-width write.
    #[arg(long = "print-motor-pw")]
    print_motor_pw: bool,
}

#[derive(Error, Debug)]
enum FatalError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("node: {0}")]
    Node(#[from] NodeError),

    #[error("async runtime: {0}")]
    Runtime(std::io::Error),
}

fn main() {
    let cli = Cli::parse();
    let guard = init_tracing("dmc-robot", cli.log_level.as_deref());

    if let Err(e) = run(cli) {
        eprintln!("{} {e}", "dmc-robot:".red().bold());
        drop(guard);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), FatalError> {
    let mut file = config::load(cli.config.as_deref())?;
    if let Some(id) = cli.robot_id.clone() {
        file.robot_id = id;
    }
    if !cli.dry_run {
        config::apply_calibration(&mut file);
    }
    let node_config = file.into_node_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(FatalError::Runtime)?;

    let stop = Arc::new(Notify::new());
    install_ctrlc(Arc::clone(&stop));

    runtime.block_on(async move {
        match cli.command {
            Commands::Robot(args) => {
                let options = NodeOptions {
                    dry_run: cli.dry_run,
                    no_camera: args.no_camera,
                    log_all_cmd: args.log_all_cmd,
                    print_motor_pw: args.print_motor_pw,
                };
                run_robot(node_config, options, stop).await
            }
            Commands::Health => run_health(node_config, cli.dry_run, stop).await,
        }
    })
}

async fn run_robot(
    config: NodeConfig,
    options: NodeOptions,
    stop: Arc<Notify>,
) -> Result<(), FatalError> {
    let hardware = simulated_hardware(&config, options);
    let robot_id = config.robot_id.clone();
    let node = RobotNode::start(config, options, hardware).await?;
    print_ready("robot", &robot_id, node.keys().prefix(), options.dry_run);
    if let Some(addr) = node.bridge_addr() {
        println!("  bridge   ws://{}", addr.to_string().bold());
    }

    stop.notified().await;
    println!("{}", "  Shutting down…".yellow());
    node.shutdown().await;
    Ok(())
}

async fn run_health(config: NodeConfig, dry_run: bool, stop: Arc<Notify>) -> Result<(), FatalError> {
    let node = HealthNode::start(&config, dry_run).await?;
    print_ready("health", &config.robot_id, node.keys().prefix(), dry_run);

    stop.notified().await;
    node.shutdown().await;
    Ok(())
}

/// Devices for this build. Board drivers live outside this workspace, so the
/// node always runs on the simulated set.
fn simulated_hardware(config: &NodeConfig, options: NodeOptions) -> HardwareSet {
    if !options.dry_run {
        warn!("no board drivers linked; running on simulated devices");
    }
    let display = &config.oled.display;
    let mut sim = SimHardware::new().with_display(display.width, display.height);
    if config.imu.enable {
        sim = sim.with_imu();
    }
    if config.camera.enable && !options.no_camera {
        info!(device = config.camera.device, "camera device");
        sim = sim.with_camera(config.camera.width, config.camera.height, config.camera.fps);
    }
    if config.camera_h264.enable {
        sim = sim.with_h264(config.camera_h264.format(), config.camera_h264.chunk_bytes);
    }
    if config.lidar.enable {
        info!(port = %config.lidar.port, "lidar port");
        sim = sim.with_range();
    }
    let (hardware, _probes) = sim.build();
    hardware
}

fn install_ctrlc(stop: Arc<Notify>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Stop requested".yellow().bold());
        stop.notify_one();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process with SIGKILL");
    }
}

fn print_ready(role: &str, robot_id: &str, prefix: &str, dry_run: bool) {
    let mode = if dry_run {
        "dry-run".yellow().to_string()
    } else {
        "live".green().to_string()
    };
    println!(
        "{} {} {} ({mode})",
        "dmc-robot".bold().cyan(),
        role.bold(),
        robot_id.bold()
    );
    println!("  topics   {}/…", prefix.dimmed());
    println!("  Press {} to stop.", "Ctrl-C".bold());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn robot_flags_parse() {
        let cli = Cli::try_parse_from([
            "dmc-robot",
            "robot",
            "--dry-run",
            "--no-camera",
            "--log-all-cmd",
            "--print-motor-pw",
            "--robot-id",
            "rb2",
        ])
        .expect("parse");
        assert!(cli.dry_run);
        assert_eq!(cli.robot_id.as_deref(), Some("rb2"));
        let Commands::Robot(args) = cli.command else {
            panic!("expected robot subcommand");
        };
        assert!(args.no_camera && args.log_all_cmd && args.print_motor_pw);
    }

    #[test]
    fn health_accepts_global_flags() {
        let cli = Cli::try_parse_from(["dmc-robot", "health", "--config", "x.toml"]).expect("parse");
        assert!(matches!(cli.command, Commands::Health));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["dmc-robot"]).is_err());
    }

    #[test]
    fn simulated_hardware_follows_config() {
        let mut config = NodeConfig::default();
        config.imu.enable = false;
        config.lidar.enable = true;
        config.camera_h264.enable = true;
        let options = NodeOptions {
            dry_run: true,
            no_camera: true,
            ..NodeOptions::default()
        };
        let hw = simulated_hardware(&config, options);
        assert!(hw.imu.is_none());
        assert!(hw.camera.is_none());
        assert!(hw.range.is_some());
        assert!(hw.h264.is_some());
        assert!(hw.display.is_some());
    }
}
