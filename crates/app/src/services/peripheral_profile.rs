//! The sample peripheral's GATT profile.
//!
//! | Service                  | Characteristic      | Capabilities  |
//! |--------------------------|---------------------|---------------|
//! | sensor (custom)          | static info         | read          |
//! | vehicle control (custom) | speed, direction    | write         |
//! | environmental sensing    | temperature         | read, notify  |
//! | battery                  | battery level       | read, notify  |
//! | device information       | four static strings | read          |
//! | current time             | current time        | read, notify  |

use vehiclelink_domain::advertisement::Timestamp;
use vehiclelink_domain::clock::{self, MANUAL_TIME_UPDATE};
use vehiclelink_domain::error::SetupError;
use vehiclelink_domain::gatt::{
    AdvertisingParameters, AttributeHandle, Capabilities, CharacteristicDefinition,
    ServiceDefinition,
};
use vehiclelink_domain::uuids;
use vehiclelink_domain::vehicle::Temperature;

use crate::ports::PeripheralBackend;
use crate::services::attribute_store::AttributeStore;
use crate::services::vehicle_control::VehicleControl;

/// Values the peripheral exposes, mostly static.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSettings {
    pub device_name: String,
    pub static_info: String,
    pub initial_temperature: Temperature,
    pub battery_level: u8,
    pub manufacturer: String,
    pub model_number: String,
    pub firmware_revision: String,
    pub software_revision: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            device_name: "Sample3".to_string(),
            static_info: "This is Bluetooth sample 3".to_string(),
            initial_temperature: Temperature::from_hundredths(2340),
            battery_level: 94,
            manufacturer: "MyGreatCompany".to_string(),
            model_number: "Model-1".to_string(),
            firmware_revision: "v1.0".to_string(),
            software_revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Handles the running peripheral keeps updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleProfile {
    pub temperature: AttributeHandle,
    pub battery_level: AttributeHandle,
    pub current_time: AttributeHandle,
}

fn read_only(uuid: uuid::Uuid, value: &str) -> CharacteristicDefinition {
    CharacteristicDefinition::new(uuid, Capabilities::READ).with_value(value.as_bytes().to_vec())
}

/// Every service of the sample peripheral, in publication order.
///
/// The current time characteristic starts out at `now`.
#[must_use]
pub fn sample_services(
    settings: &ProfileSettings,
    control: &VehicleControl,
    now: &Timestamp,
) -> [ServiceDefinition; 6] {
    [
        ServiceDefinition {
            uuid: uuids::SENSOR_SERVICE,
            primary: true,
            characteristics: vec![
                read_only(uuids::STATIC_INFO_CHAR, &settings.static_info)
                    .with_description("Static information"),
            ],
        },
        ServiceDefinition {
            uuid: uuids::VEHICLE_CONTROL_SERVICE,
            primary: true,
            characteristics: vec![
                CharacteristicDefinition::new(uuids::SPEED_CHAR, Capabilities::WRITE)
                    .with_description("Speed")
                    .with_behavior(control.speed()),
                CharacteristicDefinition::new(uuids::DIRECTION_CHAR, Capabilities::WRITE)
                    .with_description("Direction")
                    .with_behavior(control.direction()),
            ],
        },
        ServiceDefinition {
            uuid: uuids::ENVIRONMENTAL_SENSING_SERVICE,
            primary: true,
            characteristics: vec![
                CharacteristicDefinition::new(
                    uuids::TEMPERATURE_CHAR,
                    Capabilities::READ | Capabilities::NOTIFY,
                )
                .with_value(settings.initial_temperature.to_le_bytes().to_vec())
                .with_description("Outside temperature"),
            ],
        },
        ServiceDefinition {
            uuid: uuids::BATTERY_SERVICE,
            primary: true,
            characteristics: vec![
                CharacteristicDefinition::new(
                    uuids::BATTERY_LEVEL_CHAR,
                    Capabilities::READ | Capabilities::NOTIFY,
                )
                .with_value(vec![settings.battery_level]),
            ],
        },
        ServiceDefinition {
            uuid: uuids::DEVICE_INFORMATION_SERVICE,
            primary: true,
            characteristics: vec![
                read_only(uuids::MANUFACTURER_NAME_CHAR, &settings.manufacturer),
                read_only(uuids::MODEL_NUMBER_CHAR, &settings.model_number),
                read_only(uuids::FIRMWARE_REVISION_CHAR, &settings.firmware_revision),
                read_only(uuids::SOFTWARE_REVISION_CHAR, &settings.software_revision),
            ],
        },
        ServiceDefinition {
            uuid: uuids::CURRENT_TIME_SERVICE,
            primary: true,
            characteristics: vec![
                CharacteristicDefinition::new(
                    uuids::CURRENT_TIME_CHAR,
                    Capabilities::READ | Capabilities::NOTIFY,
                )
                .with_value(clock::encode_current_time(now, MANUAL_TIME_UPDATE).to_vec()),
            ],
        },
    ]
}

/// Define the whole sample profile in `store`.
///
/// # Errors
///
/// Returns the first [`SetupError`] raised by the store. Services defined
/// before the failing one stay in place, the failing one is not created.
pub fn define_sample_profile<B: PeripheralBackend>(
    store: &mut AttributeStore<B>,
    settings: &ProfileSettings,
    control: &VehicleControl,
) -> Result<SampleProfile, SetupError> {
    let now = chrono::Utc::now();
    for service in sample_services(settings, control, &now) {
        store.define(service)?;
    }
    let handle = |uuid: uuid::Uuid| {
        store
            .handle_of(uuid)
            .ok_or(SetupError::UnknownCharacteristic { uuid })
    };
    Ok(SampleProfile {
        temperature: handle(uuids::TEMPERATURE_CHAR)?,
        battery_level: handle(uuids::BATTERY_LEVEL_CHAR)?,
        current_time: handle(uuids::CURRENT_TIME_CHAR)?,
    })
}

/// Connectable, discoverable advertising carrying the sensor service.
#[must_use]
pub fn advertising_parameters(settings: &ProfileSettings) -> AdvertisingParameters {
    AdvertisingParameters {
        local_name: settings.device_name.clone(),
        service_uuids: vec![uuids::SENSOR_SERVICE],
        connectable: true,
        discoverable: true,
    }
}
