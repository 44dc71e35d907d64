//! The node's periodic loops, one task each.
//!
//! | Loop | Reads | Publishes |
//! |---|---|---|
//! | [`motor_watchdog_loop`] | [`MotorController`] | actuator writes |
//! | [`motor_telemetry_loop`] | [`MotorController`] | `motor/telemetry` |
//! | [`imu_loop`] | [`ImuSensor`] | `imu/state` |
//! | [`camera_loop`] / [`camera_capture_loop`] + [`camera_publish_loop`] | [`CameraSensor`] | `camera/image/jpeg`, `camera/meta` |
//! | [`h264_loop`] | [`H264Source`] | `camera/video/h264`, `camera/video/h264/meta` |
//! | [`range_loop`] | [`RangeSensor`] | `rangesensor/scan`, `rangesensor/front` |
//! | [`health_loop`] | – | `health/state` |
//! | [`display_loop`] | [`DisplayController`] | display writes |
//!
//! Device calls may block, so they run on the blocking pool with the device
//! moved in and handed back. A failing device or publish is logged through a
//! [`LogThrottle`] and the loop carries on with its next tick.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dmc_display::DisplayController;
use dmc_hal::{
    CameraFormat, CameraSensor, CapturedFrame, DisplayDevice, H264Format, H264Source, HalError,
    ImuReading, ImuSensor, RangeSensor,
};
use dmc_kernel::{LogThrottle, MotorController};
use dmc_middleware::Session;
use dmc_types::{
    CameraMeta, FrontStat, H264Meta, HealthState, ImuSample, NodeError, RangePoint, RangeScan, TopicKeys,
    encode_json, monotonic_ms, wall_clock_ms,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::timing::Ticker;

/// How often a persistently failing loop repeats its warning.
const FAILURE_LOG_PERIOD: Duration = Duration::from_secs(5);

/// Pause after a failed read in loops that are not paced by a ticker.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

fn failure_throttle() -> LogThrottle {
    LogThrottle::every(FAILURE_LOG_PERIOD)
}

/// Run `op` against `device` on the blocking pool and get the device back.
/// `None` means the blocking task panicked and the device is lost.
async fn on_blocking_pool<D, T, F>(device: D, op: F) -> Option<(D, T)>
where
    D: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut D) -> T + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let mut device = device;
        let out = op(&mut device);
        (device, out)
    })
    .await;
    match joined {
        Ok(pair) => Some(pair),
        Err(e) => {
            error!(error = %e, "device task failed");
            None
        }
    }
}

fn publish_json<T: Serialize>(
    session: &dyn Session,
    topic: &str,
    value: &T,
    throttle: &LogThrottle,
) -> bool {
    let result = encode_json(value).and_then(|bytes| session.publish(topic, &bytes));
    report_publish(topic, result, throttle)
}

fn publish_raw(session: &dyn Session, topic: &str, payload: &[u8], throttle: &LogThrottle) -> bool {
    report_publish(topic, session.publish(topic, payload), throttle)
}

fn report_publish(topic: &str, result: Result<(), NodeError>, throttle: &LogThrottle) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            if let Some(suppressed) = throttle.allow() {
                warn!(topic = %topic, error = %e, suppressed, "publish failed");
            }
            false
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motor
// ────────────────────────────────────────────────────────────────────────────

/// Enforce the deadman on every tick. Never depends on the transport.
pub async fn motor_watchdog_loop(
    motor: Arc<MotorController>,
    hz: f64,
    shutdown: watch::Receiver<bool>,
) {
    let mut ticker = Ticker::new(hz, shutdown);
    let throttle = failure_throttle();
    while ticker.tick().await {
        let controller = Arc::clone(&motor);
        let written = tokio::task::spawn_blocking(move || controller.tick(monotonic_ms()).1).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if let Some(suppressed) = throttle.allow() {
                    warn!(error = %e, suppressed, "motor write failed");
                }
            }
            // The controller survives a panicking write; keep enforcing.
            Err(e) => error!(error = %e, "motor tick task failed"),
        }
    }
    debug!("motor watchdog stopped");
}

pub async fn motor_telemetry_loop(
    motor: Arc<MotorController>,
    session: Arc<dyn Session>,
    topic: String,
    hz: f64,
    shutdown: watch::Receiver<bool>,
) {
    let mut ticker = Ticker::new(hz, shutdown);
    let throttle = failure_throttle();
    while ticker.tick().await {
        let telemetry = motor.telemetry(wall_clock_ms());
        publish_json(session.as_ref(), &topic, &telemetry, &throttle);
    }
    debug!("motor telemetry stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// IMU
// ────────────────────────────────────────────────────────────────────────────

pub fn imu_sample(reading: ImuReading, ts_ms: u64) -> ImuSample {
    ImuSample {
        gx: reading.gx,
        gy: reading.gy,
        gz: reading.gz,
        ax: reading.ax,
        ay: reading.ay,
        az: reading.az,
        ts_ms,
    }
}

pub async fn imu_loop(
    imu: Box<dyn ImuSensor>,
    session: Arc<dyn Session>,
    topic: String,
    hz: f64,
    shutdown: watch::Receiver<bool>,
) {
    let mut ticker = Ticker::new(hz, shutdown);
    let throttle = failure_throttle();
    let mut device = imu;
    while ticker.tick().await {
        let Some((back, read)) = on_blocking_pool(device, |d| d.read()).await else {
            return;
        };
        device = back;
        match read {
            Ok(Some(reading)) => {
                publish_json(session.as_ref(), &topic, &imu_sample(reading, wall_clock_ms()), &throttle);
            }
            Ok(None) => {}
            Err(e) => {
                if let Some(suppressed) = throttle.allow() {
                    warn!(error = %e, suppressed, "imu read failed");
                }
            }
        }
    }
    debug!("imu loop stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

/// A captured frame with the wall-clock time its capture finished.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedFrame {
    pub frame: CapturedFrame,
    pub capture_wall_ms: u64,
}

impl StampedFrame {
    /// Stamp `frame` by projecting its monotonic capture end onto the wall
    /// clock.
    pub fn stamp(frame: CapturedFrame, now_mono_ms: u64, now_wall_ms: u64) -> Self {
        let age = now_mono_ms.saturating_sub(frame.capture_end_mono_ms);
        Self {
            capture_wall_ms: now_wall_ms.saturating_sub(age),
            frame,
        }
    }
}

/// Latency and identity fields for one published frame.
pub fn camera_meta(
    format: CameraFormat,
    stamped: &StampedFrame,
    seq: u64,
    publish_mono_ms: u64,
    publish_wall_ms: u64,
) -> CameraMeta {
    let frame = &stamped.frame;
    CameraMeta {
        width: format.width,
        height: format.height,
        fps: format.fps,
        seq,
        ts_ms: publish_wall_ms,
        capture_ts_ms: stamped.capture_wall_ms,
        publish_ts_ms: publish_wall_ms,
        pipeline_ms: publish_mono_ms.saturating_sub(frame.capture_start_mono_ms),
        capture_mono_ms: frame.capture_end_mono_ms,
        publish_mono_ms,
        capture_start_mono_ms: frame.capture_start_mono_ms,
        capture_end_mono_ms: frame.capture_end_mono_ms,
        read_ms: frame
            .capture_end_mono_ms
            .saturating_sub(frame.capture_start_mono_ms),
        encode_ms: frame.encode_ms,
    }
}

struct CameraPublisher {
    session: Arc<dyn Session>,
    image_topic: String,
    meta_topic: String,
    format: CameraFormat,
    throttle: LogThrottle,
}

impl CameraPublisher {
    fn new(session: Arc<dyn Session>, keys: &TopicKeys, format: CameraFormat) -> Self {
        Self {
            session,
            image_topic: keys.camera_image_jpeg(),
            meta_topic: keys.camera_meta(),
            format,
            throttle: failure_throttle(),
        }
    }

    fn publish(&self, stamped: &StampedFrame, seq: u64) {
        let session = self.session.as_ref();
        if !publish_raw(session, &self.image_topic, &stamped.frame.jpeg, &self.throttle) {
            return;
        }
        let meta = camera_meta(self.format, stamped, seq, monotonic_ms(), wall_clock_ms());
        publish_json(session, &self.meta_topic, &meta, &self.throttle);
    }
}

fn read_camera(
    result: Result<Option<CapturedFrame>, dmc_hal::HalError>,
    throttle: &LogThrottle,
) -> Option<StampedFrame> {
    match result {
        Ok(Some(frame)) => Some(StampedFrame::stamp(frame, monotonic_ms(), wall_clock_ms())),
        Ok(None) => None,
        Err(e) => {
            if let Some(suppressed) = throttle.allow() {
                warn!(error = %e, suppressed, "camera read failed");
            }
            None
        }
    }
}

/// Capture and publish in one loop.
pub async fn camera_loop(
    camera: Box<dyn CameraSensor>,
    session: Arc<dyn Session>,
    keys: Arc<TopicKeys>,
    shutdown: watch::Receiver<bool>,
) {
    let format = camera.format();
    let publisher = CameraPublisher::new(session, &keys, format);
    let mut ticker = Ticker::new(format.fps, shutdown);
    let throttle = failure_throttle();
    let mut device = camera;
    let mut seq = 0u64;
    while ticker.tick().await {
        let Some((back, read)) = on_blocking_pool(device, |d| d.read_frame()).await else {
            return;
        };
        device = back;
        if let Some(stamped) = read_camera(read, &throttle) {
            publisher.publish(&stamped, seq);
            seq += 1;
        }
    }
    debug!("camera loop stopped");
}

/// Single-slot hand-off between capture and publish; a new frame replaces an
/// unpublished one.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<(u64, StampedFrame)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LatestFrame {
    pub fn put(&self, seq: u64, frame: StampedFrame) {
        *lock(&self.slot) = Some((seq, frame));
    }

    /// The newest frame if its sequence differs from `last_seq`.
    pub fn take_newer(&self, last_seq: Option<u64>) -> Option<(u64, StampedFrame)> {
        let slot = lock(&self.slot);
        match slot.as_ref() {
            Some((seq, frame)) if Some(*seq) != last_seq => Some((*seq, frame.clone())),
            _ => None,
        }
    }
}

/// Capture half of the `latest_only` camera pipeline.
pub async fn camera_capture_loop(
    camera: Box<dyn CameraSensor>,
    latest: Arc<LatestFrame>,
    shutdown: watch::Receiver<bool>,
) {
    let mut ticker = Ticker::new(camera.format().fps, shutdown);
    let throttle = failure_throttle();
    let mut device = camera;
    let mut seq = 0u64;
    while ticker.tick().await {
        let Some((back, read)) = on_blocking_pool(device, |d| d.read_frame()).await else {
            return;
        };
        device = back;
        if let Some(stamped) = read_camera(read, &throttle) {
            latest.put(seq, stamped);
            seq += 1;
        }
    }
    debug!("camera capture stopped");
}

/// Publish half of the `latest_only` camera pipeline.
pub async fn camera_publish_loop(
    format: CameraFormat,
    latest: Arc<LatestFrame>,
    session: Arc<dyn Session>,
    keys: Arc<TopicKeys>,
    shutdown: watch::Receiver<bool>,
) {
    let publisher = CameraPublisher::new(session, &keys, format);
    let mut ticker = Ticker::new(format.fps, shutdown);
    let mut last_seq = None;
    while ticker.tick().await {
        if let Some((seq, stamped)) = latest.take_newer(last_seq) {
            publisher.publish(&stamped, seq);
            last_seq = Some(seq);
        }
    }
    debug!("camera publish stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// H.264 stream
// ────────────────────────────────────────────────────────────────────────────

pub fn h264_meta(format: H264Format, seq: u64, ts_ms: u64, bytes: usize) -> H264Meta {
    H264Meta {
        codec: "h264".to_string(),
        width: format.width,
        height: format.height,
        fps: format.fps,
        bitrate: format.bitrate,
        seq,
        ts_ms,
        bytes,
    }
}

/// `true` once shutdown is signalled or its sender is gone.
fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Forward encoder chunks as they arrive, each followed by its metadata.
/// Ends on shutdown or when the encoder exits.
pub async fn h264_loop(
    source: Box<dyn H264Source>,
    session: Arc<dyn Session>,
    keys: Arc<TopicKeys>,
    mut shutdown: watch::Receiver<bool>,
) {
    let format = source.format();
    info!(
        width = format.width,
        height = format.height,
        fps = format.fps,
        bitrate = format.bitrate,
        "camera h264 started"
    );
    let video_topic = keys.camera_video_h264();
    let meta_topic = keys.camera_video_h264_meta();
    let throttle = failure_throttle();
    let mut device = source;
    let mut seq = 0u64;
    while !stop_requested(&shutdown) {
        let Some((back, read)) = on_blocking_pool(device, |d| d.read_chunk()).await else {
            return;
        };
        device = back;
        match read {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                publish_raw(session.as_ref(), &video_topic, &chunk, &throttle);
                let meta = h264_meta(format, seq, wall_clock_ms(), chunk.len());
                publish_json(session.as_ref(), &meta_topic, &meta, &throttle);
                seq += 1;
            }
            Ok(_) => {}
            Err(HalError::Unavailable(what)) => {
                warn!(source = %what, chunks = seq, "h264 stream ended");
                break;
            }
            Err(e) => {
                if let Some(suppressed) = throttle.allow() {
                    warn!(error = %e, suppressed, "h264 read failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
    let _ = on_blocking_pool(device, |d| d.close()).await;
    debug!("h264 loop stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Range sensor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontWindow {
    pub window_deg: f64,
    pub stat: FrontStat,
}

pub async fn range_loop(
    range: Box<dyn RangeSensor>,
    session: Arc<dyn Session>,
    keys: Arc<TopicKeys>,
    hz: f64,
    front: FrontWindow,
    shutdown: watch::Receiver<bool>,
) {
    let scan_topic = keys.rangesensor_scan();
    let front_topic = keys.rangesensor_front();
    let mut ticker = Ticker::new(hz, shutdown);
    let throttle = failure_throttle();
    let mut device = range;
    let mut seq = 0u64;
    while ticker.tick().await {
        let Some((back, read)) = on_blocking_pool(device, |d| d.read()).await else {
            return;
        };
        device = back;
        let points: Vec<RangePoint> = match read {
            Ok(Some(points)) => points,
            Ok(None) => continue,
            Err(e) => {
                if let Some(suppressed) = throttle.allow() {
                    warn!(error = %e, suppressed, "range sensor read failed");
                }
                continue;
            }
        };
        let scan = RangeScan {
            seq,
            ts_ms: wall_clock_ms(),
            points,
        };
        publish_json(session.as_ref(), &scan_topic, &scan, &throttle);
        if let Some(front) = scan.front(front.window_deg, front.stat) {
            publish_json(session.as_ref(), &front_topic, &front, &throttle);
        }
        seq += 1;
    }
    debug!("range loop stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Health
// ────────────────────────────────────────────────────────────────────────────

pub async fn health_loop(
    session: Arc<dyn Session>,
    topic: String,
    hz: f64,
    shutdown: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let mut ticker = Ticker::new(hz, shutdown);
    let throttle = failure_throttle();
    while ticker.tick().await {
        let state = HealthState {
            uptime_s: started.elapsed().as_secs_f64(),
            ts_ms: wall_clock_ms(),
        };
        publish_json(session.as_ref(), &topic, &state, &throttle);
    }
    debug!("health loop stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Display
// ────────────────────────────────────────────────────────────────────────────

/// Render at `max_hz` and write changed frames to the panel.
pub async fn display_loop(
    display: Arc<DisplayController>,
    device: Box<dyn DisplayDevice>,
    motor: Arc<MotorController>,
    max_hz: f64,
    shutdown: watch::Receiver<bool>,
) {
    let geometry = display.geometry();
    if device.width() != geometry.width || device.height() != geometry.height {
        warn!(
            device_w = device.width(),
            device_h = device.height(),
            config_w = geometry.width,
            config_h = geometry.height,
            "display size differs from configuration"
        );
    }
    let mode = display.active_mode();
    info!(mode = %mode, "display loop started");

    let mut ticker = Ticker::new(max_hz, shutdown);
    let throttle = failure_throttle();
    let mut device = device;
    while ticker.tick().await {
        let now = monotonic_ms();
        let (cmd, cmd_ms) = motor.last_command();
        let deadman_ms = motor.effective_deadman_ms(cmd.as_ref());
        let frame = display.render(now, cmd.as_ref(), cmd_ms, deadman_ms);

        let controller = Arc::clone(&display);
        let Some((back, written)) =
            on_blocking_pool(device, move |d| controller.present(frame, &mut **d)).await
        else {
            return;
        };
        device = back;
        if let Err(e) = written {
            if let Some(suppressed) = throttle.allow() {
                warn!(error = %e, suppressed, "display write failed");
            }
        }
    }
    debug!("display loop stopped");
}
