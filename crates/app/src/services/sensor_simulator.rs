//! Simulated outside temperature, drifting by a fixed step per tick.

use vehiclelink_domain::vehicle::Temperature;

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSimulator {
    celsius: f32,
    step: f32,
}

impl SensorSimulator {
    #[must_use]
    pub fn new(initial_celsius: f32, step: f32) -> Self {
        Self {
            celsius: initial_celsius,
            step,
        }
    }

    /// Current reading without advancing.
    #[must_use]
    pub fn current(&self) -> Temperature {
        Temperature::from_celsius(self.celsius)
    }

    /// Advance by one step and return the new reading.
    pub fn advance(&mut self) -> Temperature {
        self.celsius += self.step;
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_at_initial_reading() {
        let sensor = SensorSimulator::new(23.4, 1.3);

        assert_eq!(sensor.current().hundredths(), 2340);
    }

    #[test]
    fn should_drift_by_step_each_tick() {
        let mut sensor = SensorSimulator::new(23.4, 1.3);

        assert_eq!(sensor.advance().hundredths(), 2470);
        assert_eq!(sensor.advance().hundredths(), 2600);
    }
}
