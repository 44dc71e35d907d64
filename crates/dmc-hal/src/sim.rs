//! In-process simulated devices for dry-run and headless tests.
//!
//! [`SimHardware`] builds a [`HardwareSet`] of stub drivers that log what
//! they are asked to do and return plausible readings. Motor and display
//! stubs keep a shared record that tests can inspect through a probe.
//!
//! ```rust
//! use dmc_hal::MotorActuator;
//! use dmc_hal::sim::SimHardware;
//! use dmc_types::PulseWidths;
//!
//! let (mut hw, probes) = SimHardware::new().with_imu().build();
//! hw.motor.write(PulseWidths::neutral(1500)).unwrap();
//! assert_eq!(probes.motor.last_write(), Some(PulseWidths::neutral(1500)));
//! assert!(hw.imu.is_some());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dmc_types::{PulseWidths, RangePoint, monotonic_ms};
use tracing::debug;

use crate::camera::{CameraFormat, CameraSensor, CapturedFrame};
use crate::display::DisplayDevice;
use crate::h264::{H264Format, H264Source};
use crate::imu::{ImuReading, ImuSensor};
use crate::motor::MotorActuator;
use crate::range::RangeSensor;
use crate::HalError;

/// The devices one node runs against. Sensors and the display are optional.
pub struct HardwareSet {
    pub motor: Box<dyn MotorActuator>,
    pub imu: Option<Box<dyn ImuSensor>>,
    pub camera: Option<Box<dyn CameraSensor>>,
    pub h264: Option<Box<dyn H264Source>>,
    pub range: Option<Box<dyn RangeSensor>>,
    pub display: Option<Box<dyn DisplayDevice>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Motor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MotorRecord {
    writes: Vec<PulseWidths>,
    released: bool,
}

/// Read side of a [`SimMotor`].
#[derive(Debug, Clone, Default)]
pub struct MotorProbe {
    record: Arc<Mutex<MotorRecord>>,
}

impl MotorProbe {
    pub fn last_write(&self) -> Option<PulseWidths> {
        lock(&self.record).writes.last().copied()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.record).writes.len()
    }

    pub fn writes(&self) -> Vec<PulseWidths> {
        lock(&self.record).writes.clone()
    }

    pub fn released(&self) -> bool {
        lock(&self.record).released
    }
}

/// Simulated motor that records every write.
pub struct SimMotor {
    record: Arc<Mutex<MotorRecord>>,
}

impl SimMotor {
    pub fn new() -> (Self, MotorProbe) {
        let record = Arc::new(Mutex::new(MotorRecord::default()));
        (
            Self {
                record: Arc::clone(&record),
            },
            MotorProbe { record },
        )
    }
}

impl MotorActuator for SimMotor {
    fn write(&mut self, pulses: PulseWidths) -> Result<(), HalError> {
        let mut record = lock(&self.record);
        if record.released {
            return Err(HalError::Unavailable("sim motor".to_string()));
        }
        record.writes.push(pulses);
        Ok(())
    }

    fn release(&mut self) -> Result<(), HalError> {
        lock(&self.record).released = true;
        debug!("sim motor released");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// IMU
// ────────────────────────────────────────────────────────────────────────────

/// Simulated IMU at rest: gravity on Z, a slow yaw drift on the gyro.
#[derive(Default)]
pub struct SimImu {
    ticks: u64,
}

impl ImuSensor for SimImu {
    fn read(&mut self) -> Result<Option<ImuReading>, HalError> {
        self.ticks += 1;
        let phase = (self.ticks as f64) * 0.05;
        Ok(Some(ImuReading {
            gz: 0.01 * phase.sin(),
            az: 9.81,
            ..ImuReading::default()
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

/// Simulated camera returning a minimal JPEG-framed payload.
pub struct SimCamera {
    format: CameraFormat,
    frames: u64,
}

impl SimCamera {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            format: CameraFormat { width, height, fps },
            frames: 0,
        }
    }
}

impl CameraSensor for SimCamera {
    fn format(&self) -> CameraFormat {
        self.format
    }

    fn read_frame(&mut self) -> Result<Option<CapturedFrame>, HalError> {
        let start = monotonic_ms();
        self.frames += 1;
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.extend_from_slice(&self.frames.to_be_bytes());
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        Ok(Some(CapturedFrame {
            jpeg,
            capture_start_mono_ms: start,
            capture_end_mono_ms: monotonic_ms(),
            encode_ms: Some(0),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// H.264 encoder
// ────────────────────────────────────────────────────────────────────────────

const SIM_H264_CHUNK: &[u8] = b"\x00\x00\x00\x01MOCKH264";

/// Simulated encoder emitting one fixed chunk per frame interval.
pub struct SimH264 {
    format: H264Format,
    chunk: Vec<u8>,
    interval: Duration,
    remaining: Option<u64>,
}

impl SimH264 {
    /// `chunk_bytes` caps the chunk length, never below the start code plus
    /// four bytes.
    pub fn new(format: H264Format, chunk_bytes: usize) -> Self {
        let len = chunk_bytes.clamp(8, SIM_H264_CHUNK.len());
        let interval = if format.fps.is_finite() && format.fps > 0.0 {
            Duration::from_secs_f64(1.0 / format.fps)
        } else {
            Duration::from_millis(100)
        };
        Self {
            format,
            chunk: SIM_H264_CHUNK[..len].to_vec(),
            interval,
            remaining: None,
        }
    }

    /// Exit after `chunks` chunks, like an encoder process that died.
    pub fn with_limit(mut self, chunks: u64) -> Self {
        self.remaining = Some(chunks);
        self
    }
}

impl H264Source for SimH264 {
    fn format(&self) -> H264Format {
        self.format
    }

    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, HalError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(HalError::Unavailable("sim h264 encoder".to_string()));
            }
            *remaining -= 1;
        }
        std::thread::sleep(self.interval);
        Ok(Some(self.chunk.clone()))
    }

    fn close(&mut self) {
        debug!("sim h264 encoder closed");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Range sensor
// ────────────────────────────────────────────────────────────────────────────

/// Simulated LiDAR inside a round room of radius `room_m`, one point per
/// degree.
pub struct SimRange {
    room_m: f64,
}

impl SimRange {
    pub fn new(room_m: f64) -> Self {
        Self { room_m }
    }
}

impl RangeSensor for SimRange {
    fn read(&mut self) -> Result<Option<Vec<RangePoint>>, HalError> {
        let points = (-180..180)
            .map(|deg| RangePoint {
                angle_rad: f64::from(deg).to_radians(),
                range_m: self.room_m,
                intensity: Some(100.0),
            })
            .collect();
        Ok(Some(points))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Display
// ────────────────────────────────────────────────────────────────────────────

/// What a [`SimDisplay`] is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SimScreen {
    #[default]
    Blank,
    Text(String),
    Bitmap(Vec<u8>),
}

#[derive(Debug, Default)]
struct DisplayRecord {
    screen: SimScreen,
    writes: usize,
}

/// Read side of a [`SimDisplay`].
#[derive(Debug, Clone, Default)]
pub struct DisplayProbe {
    record: Arc<Mutex<DisplayRecord>>,
}

impl DisplayProbe {
    pub fn screen(&self) -> SimScreen {
        lock(&self.record).screen.clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.record).writes
    }
}

/// Simulated display that keeps the last frame written.
pub struct SimDisplay {
    width: u32,
    height: u32,
    record: Arc<Mutex<DisplayRecord>>,
}

impl SimDisplay {
    pub fn new(width: u32, height: u32) -> (Self, DisplayProbe) {
        let record = Arc::new(Mutex::new(DisplayRecord::default()));
        (
            Self {
                width,
                height,
                record: Arc::clone(&record),
            },
            DisplayProbe { record },
        )
    }
}

impl DisplayDevice for SimDisplay {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn show_text(&mut self, text: &str) -> Result<(), HalError> {
        debug!(text = %text.replace('\n', " | "), "sim display text");
        let mut record = lock(&self.record);
        record.screen = if text.is_empty() {
            SimScreen::Blank
        } else {
            SimScreen::Text(text.to_string())
        };
        record.writes += 1;
        Ok(())
    }

    fn show_bitmap(&mut self, buffer: &[u8]) -> Result<(), HalError> {
        let expected = self.buffer_len();
        if buffer.len() != expected {
            return Err(HalError::BitmapSize {
                component: "sim display".to_string(),
                expected,
                got: buffer.len(),
            });
        }
        let mut record = lock(&self.record);
        record.screen = SimScreen::Bitmap(buffer.to_vec());
        record.writes += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Probes returned alongside a simulated [`HardwareSet`].
#[derive(Debug, Clone, Default)]
pub struct SimProbes {
    pub motor: MotorProbe,
    pub display: Option<DisplayProbe>,
}

/// Builder for a [`HardwareSet`] made only of simulated devices.
#[derive(Debug, Default)]
pub struct SimHardware {
    imu: bool,
    camera: Option<CameraFormat>,
    h264: Option<(H264Format, usize)>,
    range: bool,
    display: Option<(u32, u32)>,
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_imu(mut self) -> Self {
        self.imu = true;
        self
    }

    pub fn with_camera(mut self, width: u32, height: u32, fps: f64) -> Self {
        self.camera = Some(CameraFormat { width, height, fps });
        self
    }

    pub fn with_h264(mut self, format: H264Format, chunk_bytes: usize) -> Self {
        self.h264 = Some((format, chunk_bytes));
        self
    }

    pub fn with_range(mut self) -> Self {
        self.range = true;
        self
    }

    pub fn with_display(mut self, width: u32, height: u32) -> Self {
        self.display = Some((width, height));
        self
    }

    pub fn build(self) -> (HardwareSet, SimProbes) {
        let (motor, motor_probe) = SimMotor::new();
        let (display, display_probe) = match self.display {
            Some((w, h)) => {
                let (display, probe) = SimDisplay::new(w, h);
                (Some(Box::new(display) as Box<dyn DisplayDevice>), Some(probe))
            }
            None => (None, None),
        };
        let set = HardwareSet {
            motor: Box::new(motor),
            imu: self
                .imu
                .then(|| Box::new(SimImu::default()) as Box<dyn ImuSensor>),
            camera: self.camera.map(|f| {
                Box::new(SimCamera::new(f.width, f.height, f.fps)) as Box<dyn CameraSensor>
            }),
            h264: self
                .h264
                .map(|(f, chunk)| Box::new(SimH264::new(f, chunk)) as Box<dyn H264Source>),
            range: self
                .range
                .then(|| Box::new(SimRange::new(2.0)) as Box<dyn RangeSensor>),
            display,
        };
        (
            set,
            SimProbes {
                motor: motor_probe,
                display: display_probe,
            },
        )
    }
}
