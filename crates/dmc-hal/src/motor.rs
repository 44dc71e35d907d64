//! Differential-drive motor actuator.

use dmc_types::PulseWidths;

use crate::HalError;

/// A two-channel pulse-width actuator (left and right wheel).
pub trait MotorActuator: Send {
    /// Drive both channels with the given pulse widths.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Device`] if the output cannot be applied.
    fn write(&mut self, pulses: PulseWidths) -> Result<(), HalError>;

    /// Release the underlying device handle. Called once at shutdown after a
    /// final stop write.
    fn release(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockMotor {
        last: Option<PulseWidths>,
    }

    impl MotorActuator for MockMotor {
        fn write(&mut self, pulses: PulseWidths) -> Result<(), HalError> {
            self.last = Some(pulses);
            Ok(())
        }
    }

    #[test]
    fn mock_motor_records_write_and_default_release() {
        let mut motor = MockMotor { last: None };
        motor.write(PulseWidths::new(1600, 1400)).unwrap();
        assert_eq!(motor.last, Some(PulseWidths::new(1600, 1400)));
        assert!(motor.release().is_ok());
    }
}
