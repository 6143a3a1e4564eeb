//! The thread that owns the stack's peripheral handle.
//!
//! The handle is not `Send`, so it lives on its own thread with a
//! single-threaded runtime. Everything else talks to it through
//! [`Command`]s.

use std::time::Duration;

use ble_peripheral_rust::gatt::peripheral_event::{PeripheralEvent, RequestResponse, WriteRequestResponse};
use ble_peripheral_rust::gatt::service::Service;
use ble_peripheral_rust::{Peripheral, PeripheralImpl as _};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use vehiclelink_app::ports::PeripheralRequest;

use crate::error::PeripheralAdapterError;
use crate::mapping::{read_response, write_response};

const EVENT_CAPACITY: usize = 64;
const POWER_POLL: Duration = Duration::from_millis(100);
const POWER_POLLS: u32 = 50;

type Reply = oneshot::Sender<Result<(), PeripheralAdapterError>>;

pub(crate) enum Command {
    AddService { service: Service, reply: Reply },
    StartAdvertising { name: String, services: Vec<Uuid>, reply: Reply },
    Notify { characteristic: Uuid, value: Vec<u8>, reply: Reply },
}

pub(crate) fn spawn(
    commands: mpsc::Receiver<Command>,
    requests: mpsc::Sender<PeripheralRequest>,
    ready: Reply,
) -> Result<(), PeripheralAdapterError> {
    std::thread::Builder::new()
        .name("ble-peripheral".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready.send(Err(PeripheralAdapterError::Worker(err)));
                    return;
                }
            };
            runtime.block_on(run(commands, requests, ready));
        })
        .map(drop)
        .map_err(PeripheralAdapterError::Worker)
}

async fn run(
    mut commands: mpsc::Receiver<Command>,
    requests: mpsc::Sender<PeripheralRequest>,
    ready: Reply,
) {
    let (events_tx, mut events) = mpsc::channel(EVENT_CAPACITY);
    let mut peripheral = match power_up(events_tx).await {
        Ok(peripheral) => peripheral,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                execute(&mut peripheral, command).await;
            }
            Some(event) = events.recv() => bridge(event, &requests),
        }
    }
    tracing::debug!("peripheral worker stopped");
}

async fn power_up(
    events: mpsc::Sender<PeripheralEvent>,
) -> Result<Peripheral, PeripheralAdapterError> {
    let mut peripheral = Peripheral::new(events)
        .await
        .map_err(PeripheralAdapterError::stack)?;
    for _ in 0..POWER_POLLS {
        if peripheral
            .is_powered()
            .await
            .map_err(PeripheralAdapterError::stack)?
        {
            tracing::info!("Bluetooth radio powered");
            return Ok(peripheral);
        }
        tokio::time::sleep(POWER_POLL).await;
    }
    Err(PeripheralAdapterError::NotPowered)
}

async fn execute(peripheral: &mut Peripheral, command: Command) {
    let (result, reply) = match command {
        Command::AddService { service, reply } => {
            let uuid = service.uuid;
            let result = peripheral.add_service(&service).await;
            tracing::debug!(%uuid, ok = result.is_ok(), "service added");
            (result, reply)
        }
        Command::StartAdvertising {
            name,
            services,
            reply,
        } => (peripheral.start_advertising(&name, &services).await, reply),
        Command::Notify {
            characteristic,
            value,
            reply,
        } => (
            peripheral.update_characteristic(characteristic, value).await,
            reply,
        ),
    };
    let _ = reply.send(result.map_err(PeripheralAdapterError::stack));
}

/// Forward one stack event to the request loop.
///
/// Reads and writes are answered from a spawned task so the worker keeps
/// serving commands while the request loop works.
fn bridge(event: PeripheralEvent, requests: &mpsc::Sender<PeripheralRequest>) {
    let requests = requests.clone();
    match event {
        PeripheralEvent::StateUpdate { is_powered } => {
            tracing::info!(is_powered, "radio state changed");
        }
        PeripheralEvent::CharacteristicSubscriptionUpdate {
            request,
            subscribed,
        } => {
            tokio::spawn(async move {
                let request = PeripheralRequest::Subscription {
                    client: request.client,
                    characteristic: request.characteristic,
                    subscribed,
                };
                if requests.send(request).await.is_err() {
                    tracing::debug!("request loop gone, subscription dropped");
                }
            });
        }
        PeripheralEvent::ReadRequest {
            request,
            offset,
            responder,
        } => {
            tokio::spawn(async move {
                let (tx, rx) = oneshot::channel();
                let forwarded = PeripheralRequest::Read {
                    client: request.client,
                    characteristic: request.characteristic,
                    offset: usize::try_from(offset).unwrap_or(usize::MAX),
                    responder: tx,
                };
                let outcome = match requests.send(forwarded).await {
                    Ok(()) => rx.await.ok(),
                    Err(_) => None,
                };
                let _ = responder.send(read_response(outcome));
            });
        }
        PeripheralEvent::WriteRequest {
            request,
            value,
            offset,
            responder,
        } => {
            if offset != 0 {
                let _ = responder.send(WriteRequestResponse {
                    response: RequestResponse::InvalidOffset,
                });
                return;
            }
            tokio::spawn(async move {
                let (tx, rx) = oneshot::channel();
                let forwarded = PeripheralRequest::Write {
                    client: request.client,
                    characteristic: request.characteristic,
                    value,
                    responder: tx,
                };
                let outcome = match requests.send(forwarded).await {
                    Ok(()) => rx.await.ok(),
                    Err(_) => None,
                };
                let _ = responder.send(write_response(outcome));
            });
        }
    }
}
