//! 2-D range sensor (LiDAR).

use dmc_types::RangePoint;

use crate::HalError;

pub trait RangeSensor: Send {
    /// Read one complete revolution, or `Ok(None)` if no full scan is ready.
    fn read(&mut self) -> Result<Option<Vec<RangePoint>>, HalError>;
}
