//! Vehicle control behaviors for the speed and direction characteristics.

use std::sync::Arc;

use tokio::sync::watch;
use vehiclelink_domain::error::PayloadError;
use vehiclelink_domain::gatt::{CharacteristicBehavior, RejectReason, WriteOutcome};
use vehiclelink_domain::vehicle::{VehicleState, decode_byte};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Speed,
    Direction,
}

/// Shared vehicle state updated by accepted control writes.
///
/// Observers subscribe through [`VehicleControl::watch`].
#[derive(Debug, Clone)]
pub struct VehicleControl {
    state: Arc<watch::Sender<VehicleState>>,
}

impl Default for VehicleControl {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleControl {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(VehicleState::default());
        Self {
            state: Arc::new(state),
        }
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<VehicleState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> VehicleState {
        *self.state.borrow()
    }

    /// Behavior for the speed characteristic.
    #[must_use]
    pub fn speed(&self) -> Arc<dyn CharacteristicBehavior> {
        self.axis(Axis::Speed)
    }

    /// Behavior for the direction characteristic.
    #[must_use]
    pub fn direction(&self) -> Arc<dyn CharacteristicBehavior> {
        self.axis(Axis::Direction)
    }

    fn axis(&self, axis: Axis) -> Arc<dyn CharacteristicBehavior> {
        Arc::new(AxisControl {
            axis,
            state: Arc::clone(&self.state),
        })
    }
}

struct AxisControl {
    axis: Axis,
    state: Arc<watch::Sender<VehicleState>>,
}

impl CharacteristicBehavior for AxisControl {
    fn on_write(&self, payload: &[u8]) -> WriteOutcome {
        let value = match decode_byte(payload) {
            Ok(value) => value,
            Err(PayloadError::InvalidLength { expected, actual }) => {
                tracing::warn!(axis = ?self.axis, expected, actual, "malformed control write");
                return WriteOutcome::Rejected(RejectReason::InvalidLength { expected, actual });
            }
        };

        self.state.send_modify(|state| match self.axis {
            Axis::Speed => state.speed = Some(value),
            Axis::Direction => state.direction = Some(value),
        });
        match self.axis {
            Axis::Speed => tracing::info!(speed = value, "new speed requested"),
            Axis::Direction => tracing::info!(direction = value, "new direction requested"),
        }
        WriteOutcome::Accepted
    }
}
