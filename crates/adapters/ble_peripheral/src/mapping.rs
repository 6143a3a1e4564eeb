//! Conversions between domain GATT types and the stack's types.

use ble_peripheral_rust::gatt::characteristic::Characteristic;
use ble_peripheral_rust::gatt::descriptor::Descriptor;
use ble_peripheral_rust::gatt::peripheral_event::{
    ReadRequestResponse, RequestResponse, WriteRequestResponse,
};
use ble_peripheral_rust::gatt::properties::{AttributePermission, CharacteristicProperty};
use ble_peripheral_rust::gatt::service::Service;
use vehiclelink_domain::gatt::{
    Capabilities, CharacteristicDefinition, ReadOutcome, RejectReason, ServiceDefinition,
    WriteOutcome,
};
use vehiclelink_domain::uuids::CHARACTERISTIC_USER_DESCRIPTION;

pub(crate) fn service_of(definition: &ServiceDefinition) -> Service {
    Service {
        uuid: definition.uuid,
        primary: definition.primary,
        characteristics: definition.characteristics.iter().map(characteristic_of).collect(),
    }
}

fn characteristic_of(definition: &CharacteristicDefinition) -> Characteristic {
    let mut properties = Vec::new();
    let mut permissions = Vec::new();
    if definition.capabilities.contains(Capabilities::READ) {
        properties.push(CharacteristicProperty::Read);
        permissions.push(AttributePermission::Readable);
    }
    if definition.capabilities.contains(Capabilities::WRITE) {
        properties.push(CharacteristicProperty::Write);
        permissions.push(AttributePermission::Writeable);
    }
    if definition.capabilities.contains(Capabilities::NOTIFY) {
        properties.push(CharacteristicProperty::Notify);
    }

    let descriptors = definition
        .user_description
        .iter()
        .map(|description| Descriptor {
            uuid: CHARACTERISTIC_USER_DESCRIPTION,
            properties: vec![CharacteristicProperty::Read],
            permissions: vec![AttributePermission::Readable],
            value: Some(description.clone().into_bytes()),
        })
        .collect();

    // Reads are answered by the attribute store, so only static values are
    // handed to the stack.
    let value = (!definition.capabilities.contains(Capabilities::WRITE)
        && !definition.capabilities.contains(Capabilities::NOTIFY))
    .then(|| definition.value.clone());

    Characteristic {
        uuid: definition.uuid,
        properties,
        permissions,
        value,
        descriptors,
    }
}

fn response_for(reason: RejectReason) -> RequestResponse {
    match reason {
        RejectReason::InvalidOffset => RequestResponse::InvalidOffset,
        RejectReason::ReadNotPermitted
        | RejectReason::WriteNotPermitted
        | RejectReason::UnknownCharacteristic => RequestResponse::RequestNotSupported,
        RejectReason::InvalidLength { .. } | RejectReason::HandlerFailed => {
            RequestResponse::UnlikelyError
        }
    }
}

/// `None` means the request loop went away without answering.
pub(crate) fn read_response(outcome: Option<ReadOutcome>) -> ReadRequestResponse {
    match outcome {
        Some(ReadOutcome::Value(value)) => ReadRequestResponse {
            value,
            response: RequestResponse::Success,
        },
        Some(ReadOutcome::Rejected(reason)) => ReadRequestResponse {
            value: Vec::new(),
            response: response_for(reason),
        },
        None => ReadRequestResponse {
            value: Vec::new(),
            response: RequestResponse::UnlikelyError,
        },
    }
}

pub(crate) fn write_response(outcome: Option<WriteOutcome>) -> WriteRequestResponse {
    let response = match outcome {
        Some(WriteOutcome::Accepted) => RequestResponse::Success,
        Some(WriteOutcome::Rejected(reason)) => response_for(reason),
        None => RequestResponse::UnlikelyError,
    };
    WriteRequestResponse { response }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn definition(capabilities: Capabilities) -> CharacteristicDefinition {
        CharacteristicDefinition::new(Uuid::from_u128(0x42), capabilities).with_value(vec![7])
    }

    fn has(characteristic: &Characteristic, property: &CharacteristicProperty) -> bool {
        characteristic
            .properties
            .iter()
            .any(|candidate| std::mem::discriminant(candidate) == std::mem::discriminant(property))
    }

    #[test]
    fn should_map_capabilities_to_properties() {
        let characteristic =
            characteristic_of(&definition(Capabilities::READ | Capabilities::NOTIFY));

        assert!(has(&characteristic, &CharacteristicProperty::Read));
        assert!(has(&characteristic, &CharacteristicProperty::Notify));
        assert!(!has(&characteristic, &CharacteristicProperty::Write));
        assert_eq!(characteristic.permissions.len(), 1);
    }

    #[test]
    fn should_hand_static_values_to_stack() {
        let fixed = characteristic_of(&definition(Capabilities::READ));
        let dynamic = characteristic_of(&definition(Capabilities::READ | Capabilities::WRITE));

        assert_eq!(fixed.value, Some(vec![7]));
        assert_eq!(dynamic.value, None);
    }

    #[test]
    fn should_add_user_description_descriptor() {
        let characteristic =
            characteristic_of(&definition(Capabilities::READ).with_description("Speed"));

        assert_eq!(characteristic.descriptors.len(), 1);
        assert_eq!(characteristic.descriptors[0].uuid, CHARACTERISTIC_USER_DESCRIPTION);
        assert_eq!(characteristic.descriptors[0].value, Some(b"Speed".to_vec()));
    }

    #[test]
    fn should_keep_service_shape() {
        let service = service_of(&ServiceDefinition {
            uuid: Uuid::from_u128(0x10),
            primary: true,
            characteristics: vec![definition(Capabilities::READ), definition(Capabilities::WRITE)],
        });

        assert!(service.primary);
        assert_eq!(service.characteristics.len(), 2);
    }

    #[test]
    fn should_answer_reads_with_value_or_status() {
        let value = read_response(Some(ReadOutcome::Value(vec![1, 2])));
        let offset = read_response(Some(ReadOutcome::Rejected(RejectReason::InvalidOffset)));
        let dropped = read_response(None);

        assert!(matches!(value.response, RequestResponse::Success));
        assert_eq!(value.value, vec![1, 2]);
        assert!(matches!(offset.response, RequestResponse::InvalidOffset));
        assert!(matches!(dropped.response, RequestResponse::UnlikelyError));
    }

    #[test]
    fn should_answer_rejected_writes_with_error_status() {
        let accepted = write_response(Some(WriteOutcome::Accepted));
        let refused = write_response(Some(WriteOutcome::Rejected(RejectReason::WriteNotPermitted)));
        let invalid = write_response(Some(WriteOutcome::Rejected(RejectReason::InvalidLength {
            expected: 1,
            actual: 2,
        })));

        assert!(matches!(accepted.response, RequestResponse::Success));
        assert!(matches!(refused.response, RequestResponse::RequestNotSupported));
        assert!(matches!(invalid.response, RequestResponse::UnlikelyError));
    }
}
