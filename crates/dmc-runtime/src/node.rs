//! [`RobotNode`] – wires the session, the motor controller, the display and
//! the sensor loops together, and tears them down again.
//!
//! Start-up order:
//!
//! 1. Build topic keys (an invalid `robot_id` is fatal) and, if a display is
//!    attached, the display controller (an invalid geometry is fatal).
//! 2. Open the session and bind the WebSocket bridge when
//!    `transport.bridge_addr` is set (a bind failure is fatal).
//! 3. Build the motor controller and the settings action runner.
//! 4. Subscribe the inbound topics and spawn one task per loop.
//!
//! [`RobotNode::shutdown`] signals every loop, waits up to
//! [`SHUTDOWN_GRACE`] per task, stops and releases the motor, and closes the
//! session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dmc_display::{DisplayConfig, DisplayController, DisplayError};
use dmc_hal::{H264Format, HardwareSet};
use dmc_kernel::{LogThrottle, MotorConfig, MotorController};
use dmc_middleware::{BusSession, Callback, DryRunSession, Session, Subscription, WsBridge};
use dmc_types::{
    FrontStat, NavCommand, NodeError, OledModeRequest, OledText, TopicKeys, decode_json,
    monotonic_ms,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::loops::{self, FrontWindow, LatestFrame};
use crate::settings_actions::{self, SettingsActionRunner, SettingsConfig};

/// How long each loop gets to notice shutdown before it is aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Motor command echo rate unless `log_all_cmd` is set.
const CMD_LOG_PER_SECOND: u32 = 10;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Serve the session over WebSocket on this address.
    pub bridge_addr: Option<SocketAddr>,
    pub capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bridge_addr: None,
            capacity: dmc_middleware::session::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotorLoopConfig {
    pub kernel: MotorConfig,
    pub watchdog_hz: f64,
    /// `0` disables telemetry.
    pub telemetry_hz: f64,
}

impl Default for MotorLoopConfig {
    fn default() -> Self {
        Self {
            kernel: MotorConfig::default(),
            watchdog_hz: 20.0,
            telemetry_hz: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImuConfig {
    pub enable: bool,
    pub publish_hz: f64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            enable: true,
            publish_hz: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub enable: bool,
    /// Video device index handed to the capture driver.
    pub device: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Capture and publish in separate loops, publishing only the newest frame.
    pub latest_only: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enable: true,
            device: 0,
            width: 640,
            height: 480,
            fps: 10.0,
            latest_only: false,
        }
    }
}

/// The H.264 stream, independent of the JPEG camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraH264Config {
    pub enable: bool,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bitrate: u32,
    /// Largest chunk read from the encoder at once.
    pub chunk_bytes: usize,
}

impl Default for CameraH264Config {
    fn default() -> Self {
        Self {
            enable: false,
            width: 640,
            height: 480,
            fps: 30.0,
            bitrate: 2_000_000,
            chunk_bytes: 65_536,
        }
    }
}

impl CameraH264Config {
    pub fn format(&self) -> H264Format {
        H264Format {
            width: self.width,
            height: self.height,
            fps: self.fps,
            bitrate: self.bitrate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LidarConfig {
    pub enable: bool,
    pub port: String,
    pub publish_hz: f64,
    pub front_window_deg: f64,
    pub front_stat: FrontStat,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            enable: false,
            port: "/dev/ttyUSB0".to_string(),
            publish_hz: 10.0,
            front_window_deg: 10.0,
            front_stat: FrontStat::Mean,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub publish_hz: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { publish_hz: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OledConfig {
    pub display: DisplayConfig,
    pub max_hz: f64,
}

impl Default for OledConfig {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            max_hz: 10.0,
        }
    }
}

/// Everything the node needs to start, already validated and defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub robot_id: String,
    pub namespace: String,
    pub transport: TransportConfig,
    pub motor: MotorLoopConfig,
    pub imu: ImuConfig,
    pub camera: CameraConfig,
    pub camera_h264: CameraH264Config,
    pub lidar: LidarConfig,
    pub health: HealthConfig,
    pub oled: OledConfig,
    pub settings: SettingsConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            robot_id: "rasp-zero-01".to_string(),
            namespace: dmc_types::DEFAULT_NAMESPACE.to_string(),
            transport: TransportConfig::default(),
            motor: MotorLoopConfig::default(),
            imu: ImuConfig::default(),
            camera: CameraConfig::default(),
            camera_h264: CameraH264Config::default(),
            lidar: LidarConfig::default(),
            health: HealthConfig::default(),
            oled: OledConfig::default(),
            settings: SettingsConfig::default(),
        }
    }
}

/// Command-line switches that change how the node behaves at run time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeOptions {
    /// Log traffic instead of acting on it, and never run settings commands.
    pub dry_run: bool,
    pub no_camera: bool,
    /// Echo every motor command instead of a rate-limited sample.
    pub log_all_cmd: bool,
    pub print_motor_pw: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Task bookkeeping
// ────────────────────────────────────────────────────────────────────────────

/// Spawned loops, their inbound subscriptions and the shared stop signal.
struct Tasks {
    stop: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    subscriptions: Vec<Subscription>,
}

impl Tasks {
    fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop,
            handles: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    fn signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "spawning loop");
        self.handles.push((name, tokio::spawn(task)));
    }

    fn subscribe(
        &mut self,
        session: &dyn Session,
        topic: &str,
        callback: Callback,
    ) -> Result<(), NodeError> {
        let sub = session.subscribe(topic, callback)?;
        info!(topic = %topic, "subscribed");
        self.subscriptions.push(sub);
        Ok(())
    }

    async fn stop(self) {
        let _ = self.stop.send(true);
        for sub in &self.subscriptions {
            sub.close();
        }
        for (name, mut handle) in self.handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "loop exited"),
                Ok(Err(e)) => warn!(task = name, error = %e, "loop ended abnormally"),
                Err(_) => {
                    warn!(task = name, "loop did not stop in time; aborting");
                    handle.abort();
                }
            }
        }
    }
}

fn open_session(
    transport: &TransportConfig,
    dry_run: bool,
) -> Result<(Arc<BusSession>, Arc<dyn Session>), NodeError> {
    let bus = Arc::new(BusSession::open(transport.capacity)?);
    let session: Arc<dyn Session> = if dry_run {
        Arc::new(DryRunSession::new(Arc::clone(&bus)))
    } else {
        Arc::clone(&bus) as Arc<dyn Session>
    };
    Ok((bus, session))
}

async fn start_bridge(
    transport: &TransportConfig,
    bus: &Arc<BusSession>,
    tasks: &mut Tasks,
) -> Result<Option<SocketAddr>, NodeError> {
    let Some(addr) = transport.bridge_addr else {
        return Ok(None);
    };
    let bridge = WsBridge::bind(Arc::clone(bus), addr).await?;
    let local = bridge.local_addr()?;
    tasks.spawn("ws_bridge", bridge.run(tasks.signal()));
    Ok(Some(local))
}

// ────────────────────────────────────────────────────────────────────────────
// Robot node
// ────────────────────────────────────────────────────────────────────────────

/// A running robot node. Drop-in handle: call [`RobotNode::shutdown`] to stop.
pub struct RobotNode {
    keys: Arc<TopicKeys>,
    session: Arc<dyn Session>,
    motor: Arc<MotorController>,
    display: Option<Arc<DisplayController>>,
    bridge_addr: Option<SocketAddr>,
    tasks: Tasks,
}

impl RobotNode {
    /// Start every loop the configuration and `hardware` allow.
    ///
    /// # Errors
    ///
    /// - [`NodeError::InvalidRobotId`] for an empty `robot_id` or one
    ///   containing `/`.
    /// - [`NodeError::Transport`] when the session or bridge cannot open.
    /// - [`NodeError::HardwareFault`] when the display geometry is invalid.
    pub async fn start(
        config: NodeConfig,
        options: NodeOptions,
        hardware: HardwareSet,
    ) -> Result<Self, NodeError> {
        let keys = Arc::new(TopicKeys::new(&config.namespace, &config.robot_id)?);
        let HardwareSet {
            motor: actuator,
            imu,
            camera,
            h264,
            range,
            display,
        } = hardware;

        let display_controller = match &display {
            Some(_) => Some(Arc::new(
                DisplayController::from_config(&config.oled.display, &config.robot_id, monotonic_ms())
                    .map_err(display_fault)?,
            )),
            None => None,
        };

        let (bus, session) = open_session(&config.transport, options.dry_run)?;
        let mut tasks = Tasks::new();
        let bridge_addr = match start_bridge(&config.transport, &bus, &mut tasks).await {
            Ok(addr) => addr,
            Err(e) => {
                tasks.stop().await;
                session.close();
                return Err(e);
            }
        };

        let motor = Arc::new(
            MotorController::new(config.motor.kernel.clone(), actuator)
                .with_print_pulsewidths(options.print_motor_pw),
        );
        if options.dry_run {
            // Exercise the deadman path with no input.
            motor.prime(monotonic_ms());
        }

        let mut node = Self {
            keys,
            session,
            motor,
            display: display_controller,
            bridge_addr,
            tasks,
        };
        if let Err(e) = node.subscribe_inputs(&config, options) {
            node.shutdown().await;
            return Err(e);
        }
        node.spawn_loops(&config, options, imu, camera, h264, range, display);
        info!(
            robot_id = %config.robot_id,
            prefix = %node.keys.prefix(),
            dry_run = options.dry_run,
            "robot node started"
        );
        Ok(node)
    }

    pub fn keys(&self) -> &TopicKeys {
        &self.keys
    }

    pub fn session(&self) -> Arc<dyn Session> {
        Arc::clone(&self.session)
    }

    pub fn motor(&self) -> &Arc<MotorController> {
        &self.motor
    }

    pub fn display(&self) -> Option<&Arc<DisplayController>> {
        self.display.as_ref()
    }

    /// Address the WebSocket bridge is listening on.
    pub fn bridge_addr(&self) -> Option<SocketAddr> {
        self.bridge_addr
    }

    fn subscribe_inputs(&mut self, config: &NodeConfig, options: NodeOptions) -> Result<(), NodeError> {
        let session = Arc::clone(&self.session);
        let motor_topic = self.keys.motor_cmd();
        let on_motor = motor_callback(Arc::clone(&self.motor), motor_topic.clone(), options.log_all_cmd);
        self.tasks.subscribe(session.as_ref(), &motor_topic, on_motor)?;

        let Some(display) = self.display.clone() else {
            debug!("no display attached; oled topics not subscribed");
            return Ok(());
        };

        let topic = self.keys.oled_cmd();
        let cb = text_callback(Arc::clone(&display), topic.clone());
        self.tasks.subscribe(session.as_ref(), &topic, cb)?;

        let topic = self.keys.oled_image_mono1();
        let cb = bitmap_callback(Arc::clone(&display), topic.clone());
        self.tasks.subscribe(session.as_ref(), &topic, cb)?;

        let topic = self.keys.oled_mode();
        let cb = mode_callback(Arc::clone(&display), topic.clone());
        self.tasks.subscribe(session.as_ref(), &topic, cb)?;

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let runner = Arc::new(SettingsActionRunner::new(
            config.settings.clone(),
            options.dry_run,
            outcome_tx,
        ));
        self.tasks
            .spawn("settings_outcomes", settings_actions::log_outcomes(outcome_rx));

        let topic = self.keys.oled_nav();
        let cb = nav_callback(display, runner, topic.clone());
        self.tasks.subscribe(session.as_ref(), &topic, cb)?;
        Ok(())
    }

    fn spawn_loops(
        &mut self,
        config: &NodeConfig,
        options: NodeOptions,
        imu: Option<Box<dyn dmc_hal::ImuSensor>>,
        camera: Option<Box<dyn dmc_hal::CameraSensor>>,
        h264: Option<Box<dyn dmc_hal::H264Source>>,
        range: Option<Box<dyn dmc_hal::RangeSensor>>,
        display: Option<Box<dyn dmc_hal::DisplayDevice>>,
    ) {
        let tasks = &mut self.tasks;

        tasks.spawn(
            "motor_watchdog",
            loops::motor_watchdog_loop(Arc::clone(&self.motor), config.motor.watchdog_hz, tasks.signal()),
        );
        if config.motor.telemetry_hz > 0.0 {
            tasks.spawn(
                "motor_telemetry",
                loops::motor_telemetry_loop(
                    Arc::clone(&self.motor),
                    Arc::clone(&self.session),
                    self.keys.motor_telemetry(),
                    config.motor.telemetry_hz,
                    tasks.signal(),
                ),
            );
        }

        match (config.imu.enable, imu) {
            (true, Some(imu)) => tasks.spawn(
                "imu",
                loops::imu_loop(
                    imu,
                    Arc::clone(&self.session),
                    self.keys.imu_state(),
                    config.imu.publish_hz,
                    tasks.signal(),
                ),
            ),
            (true, None) => warn!("imu enabled but no device attached"),
            (false, _) => info!("imu disabled"),
        }

        let camera_wanted = config.camera.enable && !options.no_camera;
        match (camera_wanted, camera) {
            (true, Some(camera)) if config.camera.latest_only => {
                let format = camera.format();
                let latest = Arc::new(LatestFrame::default());
                tasks.spawn(
                    "camera_capture",
                    loops::camera_capture_loop(camera, Arc::clone(&latest), tasks.signal()),
                );
                tasks.spawn(
                    "camera_publish",
                    loops::camera_publish_loop(
                        format,
                        latest,
                        Arc::clone(&self.session),
                        Arc::clone(&self.keys),
                        tasks.signal(),
                    ),
                );
            }
            (true, Some(camera)) => tasks.spawn(
                "camera",
                loops::camera_loop(
                    camera,
                    Arc::clone(&self.session),
                    Arc::clone(&self.keys),
                    tasks.signal(),
                ),
            ),
            (true, None) => warn!("camera enabled but no device attached"),
            (false, _) => info!(no_camera = options.no_camera, "camera disabled"),
        }

        match (config.camera_h264.enable, h264) {
            (true, Some(source)) => tasks.spawn(
                "camera_h264",
                loops::h264_loop(
                    source,
                    Arc::clone(&self.session),
                    Arc::clone(&self.keys),
                    tasks.signal(),
                ),
            ),
            (true, None) => warn!("camera h264 enabled but no encoder attached"),
            (false, _) => debug!("camera h264 disabled"),
        }

        match (config.lidar.enable, range) {
            (true, Some(range)) => {
                let front = FrontWindow {
                    window_deg: config.lidar.front_window_deg,
                    stat: config.lidar.front_stat,
                };
                tasks.spawn(
                    "range",
                    loops::range_loop(
                        range,
                        Arc::clone(&self.session),
                        Arc::clone(&self.keys),
                        config.lidar.publish_hz,
                        front,
                        tasks.signal(),
                    ),
                );
            }
            (true, None) => warn!(port = %config.lidar.port, "lidar enabled but no device attached"),
            (false, _) => debug!("lidar disabled"),
        }

        if let (Some(controller), Some(device)) = (&self.display, display) {
            tasks.spawn(
                "display",
                loops::display_loop(
                    Arc::clone(controller),
                    device,
                    Arc::clone(&self.motor),
                    config.oled.max_hz,
                    tasks.signal(),
                ),
            );
        }

        tasks.spawn(
            "health",
            loops::health_loop(
                Arc::clone(&self.session),
                self.keys.health_state(),
                config.health.publish_hz,
                tasks.signal(),
            ),
        );
    }

    /// Stop every loop, stop and release the motor, close the session.
    pub async fn shutdown(self) {
        info!("robot node shutting down");
        self.tasks.stop().await;
        let motor = Arc::clone(&self.motor);
        match tokio::task::spawn_blocking(move || motor.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "motor shutdown failed"),
            Err(e) => warn!(error = %e, "motor shutdown task failed"),
        }
        self.session.close();
        info!("robot node stopped");
    }
}

fn display_fault(err: DisplayError) -> NodeError {
    NodeError::HardwareFault {
        component: "oled".to_string(),
        details: err.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound callbacks
// ────────────────────────────────────────────────────────────────────────────

fn motor_callback(motor: Arc<MotorController>, topic: String, log_all: bool) -> Callback {
    let echo = if log_all {
        LogThrottle::unlimited()
    } else {
        LogThrottle::per_second(CMD_LOG_PER_SECOND)
    };
    let rejects = LogThrottle::per_second(1);
    Arc::new(move |payload: &[u8]| match motor.on_payload(&topic, payload, monotonic_ms()) {
        Ok(cmd) => {
            if let Some(suppressed) = echo.allow() {
                info!(
                    v_l = cmd.v_left,
                    v_r = cmd.v_right,
                    deadman_ms = cmd.deadman_ms,
                    seq = ?cmd.seq,
                    ts_ms = ?cmd.ts_ms,
                    suppressed,
                    "motor cmd"
                );
            }
        }
        Err(e) => {
            if let Some(suppressed) = rejects.allow() {
                warn!(error = %e, suppressed, "motor cmd rejected");
            }
        }
    })
}

fn text_callback(display: Arc<DisplayController>, topic: String) -> Callback {
    Arc::new(move |payload: &[u8]| match decode_json::<OledText>(&topic, payload) {
        Ok(msg) => display.on_text_override(&msg.text, monotonic_ms()),
        Err(e) => warn!(error = %e, "oled text rejected"),
    })
}

fn bitmap_callback(display: Arc<DisplayController>, topic: String) -> Callback {
    Arc::new(move |payload: &[u8]| {
        if let Err(e) = display.on_bitmap_override(payload, monotonic_ms()) {
            warn!(topic = %topic, error = %e, "oled bitmap rejected");
        }
    })
}

fn mode_callback(display: Arc<DisplayController>, topic: String) -> Callback {
    Arc::new(move |payload: &[u8]| match decode_json::<OledModeRequest>(&topic, payload) {
        Ok(req) => {
            display.request_mode(&req.mode, req.settings_index, monotonic_ms());
        }
        Err(e) => warn!(error = %e, "oled mode request rejected"),
    })
}

fn nav_callback(
    display: Arc<DisplayController>,
    runner: Arc<SettingsActionRunner>,
    topic: String,
) -> Callback {
    Arc::new(move |payload: &[u8]| match decode_json::<NavCommand>(&topic, payload) {
        Ok(nav) => {
            if let Some(label) = display.on_nav(nav, monotonic_ms()) {
                info!(label = %label, "settings item selected");
                runner.trigger(&label);
            }
        }
        Err(e) => warn!(error = %e, "oled nav rejected"),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Health-only node
// ────────────────────────────────────────────────────────────────────────────

/// Runs only the heartbeat, on its own session.
pub struct HealthNode {
    session: Arc<dyn Session>,
    keys: TopicKeys,
    bridge_addr: Option<SocketAddr>,
    tasks: Tasks,
}

impl HealthNode {
    /// # Errors
    ///
    /// Same fatal conditions as [`RobotNode::start`] minus the hardware ones.
    pub async fn start(config: &NodeConfig, dry_run: bool) -> Result<Self, NodeError> {
        let keys = TopicKeys::new(&config.namespace, &config.robot_id)?;
        let (bus, session) = open_session(&config.transport, dry_run)?;
        let mut tasks = Tasks::new();
        let bridge_addr = match start_bridge(&config.transport, &bus, &mut tasks).await {
            Ok(addr) => addr,
            Err(e) => {
                tasks.stop().await;
                session.close();
                return Err(e);
            }
        };
        tasks.spawn(
            "health",
            loops::health_loop(
                Arc::clone(&session),
                keys.health_state(),
                config.health.publish_hz,
                tasks.signal(),
            ),
        );
        info!(robot_id = %config.robot_id, "health node started");
        Ok(Self {
            session,
            keys,
            bridge_addr,
            tasks,
        })
    }

    pub fn keys(&self) -> &TopicKeys {
        &self.keys
    }

    pub fn session(&self) -> Arc<dyn Session> {
        Arc::clone(&self.session)
    }

    pub fn bridge_addr(&self) -> Option<SocketAddr> {
        self.bridge_addr
    }

    pub async fn shutdown(self) {
        self.tasks.stop().await;
        self.session.close();
        info!("health node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmc_hal::sim::{SimHardware, SimScreen};
    use dmc_types::{CameraMeta, H264Meta, HealthState, MotorTelemetry, PulseWidths};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn config() -> NodeConfig {
        let mut config = NodeConfig {
            robot_id: "rb1".to_string(),
            ..NodeConfig::default()
        };
        config.motor.telemetry_hz = 50.0;
        config.health.publish_hz = 20.0;
        config.oled.max_hz = 50.0;
        config.oled.display.bitmap_text = false;
        config.camera.fps = 30.0;
        config
    }

    fn collect(session: &dyn Session, topic: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cb: Callback = Arc::new(move |payload: &[u8]| {
            let _ = tx.send(payload.to_vec());
        });
        // The subscription keeps delivering after its handle is dropped.
        let _ = session.subscribe(topic, cb).unwrap();
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Poll `check` for up to two seconds.
    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn motor_command_reaches_telemetry_and_shutdown_releases() -> TestResult {
        let (hw, probes) = SimHardware::new().build();
        let node = RobotNode::start(config(), NodeOptions::default(), hw).await?;
        let session = node.session();
        let mut telemetry = collect(session.as_ref(), &node.keys().motor_telemetry());

        session.publish(&node.keys().motor_cmd(), br#"{"v_l":0.2,"v_r":0.2,"seq":5}"#)?;
        let mut seen = None;
        for _ in 0..20 {
            let t: MotorTelemetry = serde_json::from_slice(&next(&mut telemetry).await)?;
            if t.cmd_seq == Some(5) {
                seen = Some(t);
                break;
            }
        }
        let t = seen.ok_or("telemetry never reflected seq 5")?;
        assert_eq!(t.cmd_v_l, Some(0.2));

        node.shutdown().await;
        assert!(probes.motor.released());
        assert_eq!(probes.motor.last_write(), Some(PulseWidths::neutral(1500)));
        assert!(session.is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_command_keeps_previous_one() -> TestResult {
        let (hw, _probes) = SimHardware::new().build();
        let node = RobotNode::start(config(), NodeOptions::default(), hw).await?;
        let session = node.session();
        let topic = node.keys().motor_cmd();

        session.publish(&topic, br#"{"v_l":0.1,"v_r":0.1,"seq":1}"#)?;
        let motor = Arc::clone(node.motor());
        assert!(eventually(|| motor.last_command().0.and_then(|c| c.seq) == Some(1)).await);
        let accepted_at = motor.last_command().1;

        session.publish(&topic, br#"{"v_r":0.3}"#)?;
        session.publish(&topic, br#"{"v_l":0.1,"v_r":0.1,"unit":"rpm"}"#)?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (cmd, at) = motor.last_command();
        assert_eq!(cmd.and_then(|c| c.seq), Some(1));
        assert_eq!(at, accepted_at);

        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn display_follows_mode_requests_and_overrides() -> TestResult {
        let (hw, probes) = SimHardware::new().with_display(128, 32).build();
        let screen = probes.display.ok_or("no display probe")?;
        let node = RobotNode::start(config(), NodeOptions::default(), hw).await?;
        let session = node.session();

        assert!(eventually(|| screen.screen() == SimScreen::Text("rb1\nREADY".into())).await);

        session.publish(&node.keys().oled_cmd(), br#"{"text":"HELLO"}"#)?;
        assert!(eventually(|| screen.screen() == SimScreen::Text("HELLO".into())).await);

        session.publish(&node.keys().oled_mode(), br#"{"mode":"drive"}"#)?;
        let display = Arc::clone(node.display().ok_or("no display controller")?);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(screen.screen(), SimScreen::Text("HELLO".into()));
        assert_eq!(display.active_mode(), "legacy");

        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn nav_steps_settings_menu() -> TestResult {
        let (hw, probes) = SimHardware::new().with_display(128, 32).build();
        let screen = probes.display.ok_or("no display probe")?;
        let options = NodeOptions {
            dry_run: true,
            ..NodeOptions::default()
        };
        let node = RobotNode::start(config(), options, hw).await?;
        let session = node.session();

        session.publish(&node.keys().oled_mode(), br#"{"mode":"settings","settings_index":1}"#)?;
        assert!(eventually(|| screen.screen() == SimScreen::Text(" CALIB\n>WIFI".into())).await);

        session.publish(&node.keys().oled_nav(), br#"{"action":"step","delta":1}"#)?;
        assert!(eventually(|| screen.screen() == SimScreen::Text(">GIT PULL\n BRANCH".into())).await);

        session.publish(&node.keys().oled_nav(), br#"{"action":"select"}"#)?;
        let display = Arc::clone(node.display().ok_or("no display controller")?);
        assert_eq!(display.settings_index(), 2);

        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn no_camera_flag_disables_camera() -> TestResult {
        let (hw, _probes) = SimHardware::new().with_camera(160, 120, 30.0).build();
        let options = NodeOptions {
            no_camera: true,
            ..NodeOptions::default()
        };
        let node = RobotNode::start(config(), options, hw).await?;
        let mut metas = collect(node.session().as_ref(), &node.keys().camera_meta());
        let mut health = collect(node.session().as_ref(), &node.keys().health_state());

        let _: HealthState = serde_json::from_slice(&next(&mut health).await)?;
        let _: HealthState = serde_json::from_slice(&next(&mut health).await)?;
        assert!(metas.try_recv().is_err());

        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn latest_only_camera_publishes() -> TestResult {
        let (hw, _probes) = SimHardware::new().with_camera(160, 120, 30.0).build();
        let mut config = config();
        config.camera.latest_only = true;
        let node = RobotNode::start(config, NodeOptions::default(), hw).await?;
        let mut metas = collect(node.session().as_ref(), &node.keys().camera_meta());

        let meta: CameraMeta = serde_json::from_slice(&next(&mut metas).await)?;
        assert_eq!((meta.width, meta.height), (160, 120));

        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn h264_stream_runs_alongside_jpeg_camera() -> TestResult {
        let mut config = config();
        config.camera_h264.enable = true;
        config.camera_h264.fps = 100.0;
        let (hw, _probes) = SimHardware::new()
            .with_camera(160, 120, 30.0)
            .with_h264(config.camera_h264.format(), config.camera_h264.chunk_bytes)
            .build();
        let options = NodeOptions {
            no_camera: true,
            ..NodeOptions::default()
        };
        let node = RobotNode::start(config, options, hw).await?;
        let mut h264 = collect(node.session().as_ref(), &node.keys().camera_video_h264_meta());
        let mut jpeg = collect(node.session().as_ref(), &node.keys().camera_meta());

        let meta: H264Meta = serde_json::from_slice(&next(&mut h264).await)?;
        assert_eq!((meta.width, meta.height, meta.fps), (640, 480, 100.0));
        assert!(jpeg.try_recv().is_err());

        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn dry_run_primes_deadman() -> TestResult {
        let (hw, _probes) = SimHardware::new().build();
        let mut config = config();
        config.motor.kernel.deadman_ms = 50;
        let options = NodeOptions {
            dry_run: true,
            ..NodeOptions::default()
        };
        let node = RobotNode::start(config, options, hw).await?;
        let motor = Arc::clone(node.motor());
        assert!(eventually(|| motor.stopped_by_deadman()).await);
        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn invalid_robot_id_is_fatal() {
        let (hw, _probes) = SimHardware::new().build();
        let config = NodeConfig {
            robot_id: "a/b".to_string(),
            ..NodeConfig::default()
        };
        let result = RobotNode::start(config, NodeOptions::default(), hw).await;
        assert!(matches!(result, Err(NodeError::InvalidRobotId(_))));
    }

    #[tokio::test]
    async fn bad_display_geometry_is_a_hardware_fault() {
        let (hw, _probes) = SimHardware::new().with_display(128, 30).build();
        let mut config = config();
        config.oled.display.height = 30;
        let result = RobotNode::start(config, NodeOptions::default(), hw).await;
        assert!(matches!(
            result,
            Err(NodeError::HardwareFault { component, .. }) if component == "oled"
        ));
    }

    #[tokio::test]
    async fn bridge_binds_ephemeral_port() -> TestResult {
        let (hw, _probes) = SimHardware::new().build();
        let mut config = config();
        config.transport.bridge_addr = Some("127.0.0.1:0".parse()?);
        let node = RobotNode::start(config, NodeOptions::default(), hw).await?;
        let addr = node.bridge_addr().ok_or("bridge not bound")?;
        assert_ne!(addr.port(), 0);
        node.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn health_node_publishes_heartbeat() -> TestResult {
        let mut config = config();
        config.health.publish_hz = 50.0;
        let node = HealthNode::start(&config, false).await?;
        let mut health = collect(node.session().as_ref(), &node.keys().health_state());
        let state: HealthState = serde_json::from_slice(&next(&mut health).await)?;
        assert!(state.ts_ms > 0);
        node.shutdown().await;
        Ok(())
    }
}
