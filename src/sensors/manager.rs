//! Sensor manager for BLE trainer discovery and connection.
//!
//! Drives one trainer link: scanning with the advertisement filter,
//! connecting, subscribing to telemetry, and three background tasks per
//! connection (notifications, the control point writer, the 1 Hz ticker).
//! All session logic lives in [`TelemetryHub`]; the tasks only move bytes
//! between it and the peripheral.

use crate::sensors::control::ControlCommand;
use crate::sensors::ftms::{
    CharacteristicKind, FITNESS_SERVICE_UUIDS, FTMS_CONTROL_POINT_UUID,
};
use crate::sensors::types::{
    AdvertisementFilter, ConnectionState, ControlError, DiscoveredSensor, Protocol, SensorConfig,
    SensorError, SensorEvent,
};
use crate::session::hub::TelemetryHub;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use crossbeam::channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

/// Shared handle to the session.
pub type SharedHub = Arc<Mutex<TelemetryHub>>;

/// An open connection to a trainer.
struct TrainerLink {
    device_id: String,
    peripheral: Peripheral,
    hub: SharedHub,
    writes: mpsc::UnboundedSender<ControlCommand>,
    tasks: Vec<JoinHandle<()>>,
}

/// Manages BLE discovery and the trainer connection.
pub struct SensorManager {
    /// Configuration
    config: SensorConfig,
    /// Which advertisements to keep
    filter: AdvertisementFilter,
    /// BLE adapter
    adapter: Option<Adapter>,
    /// Channel for sending sensor events
    event_tx: Option<Sender<SensorEvent>>,
    /// Discovered peripherals (device_id -> DiscoveredSensor)
    discovered: Arc<Mutex<HashMap<String, DiscoveredSensor>>>,
    /// Whether currently scanning
    is_scanning: Arc<Mutex<bool>>,
    /// Current trainer connection
    link: Option<TrainerLink>,
}

impl SensorManager {
    /// Create a new sensor manager.
    pub fn new(config: SensorConfig) -> Self {
        Self {
            filter: AdvertisementFilter::new(config.name_filter.clone()),
            config,
            adapter: None,
            event_tx: None,
            discovered: Arc::new(Mutex::new(HashMap::new())),
            is_scanning: Arc::new(Mutex::new(false)),
            link: None,
        }
    }

    /// Create a new sensor manager with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SensorConfig::default())
    }

    /// Initialize the BLE adapter.
    ///
    /// This must be called before any sensor operations.
    pub async fn initialize(&mut self) -> Result<(), SensorError> {
        tracing::info!("Initializing SensorManager");

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");
        self.adapter = Some(adapter);

        Ok(())
    }

    /// Get an event receiver for sensor events.
    pub fn event_receiver(&mut self) -> Receiver<SensorEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.event_tx = Some(tx);
        rx
    }

    /// Send an event if the channel is available.
    fn send_event(&self, event: SensorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Start scanning for trainers.
    pub async fn start_discovery(&mut self) -> Result<(), SensorError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or(SensorError::AdapterNotFound)?;

        {
            let mut is_scanning = self.is_scanning.lock().await;
            if *is_scanning {
                return Ok(()); // Already scanning
            }
            *is_scanning = true;
        }

        tracing::info!("Starting sensor discovery");
        self.discovered.lock().await.clear();

        // Without a name filter the adapter can drop non-fitness devices itself.
        let scan_filter = match self.config.name_filter {
            Some(_) => ScanFilter::default(),
            None => ScanFilter {
                services: FITNESS_SERVICE_UUIDS.to_vec(),
            },
        };

        adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        self.send_event(SensorEvent::ScanStarted);

        let adapter_clone = adapter.clone();
        let filter = self.filter.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();
        let is_scanning = self.is_scanning.clone();

        tokio::spawn(async move {
            Self::process_discovery_events(adapter_clone, filter, discovered, event_tx, is_scanning)
                .await;
        });

        Ok(())
    }

    /// Process discovery events from the adapter.
    async fn process_discovery_events(
        adapter: Adapter,
        filter: AdvertisementFilter,
        discovered: Arc<Mutex<HashMap<String, DiscoveredSensor>>>,
        event_tx: Option<Sender<SensorEvent>>,
        is_scanning: Arc<Mutex<bool>>,
    ) {
        use futures::stream::StreamExt;

        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            if !*is_scanning.lock().await {
                break;
            }

            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };

            let Ok(peripheral) = adapter.peripheral(&id).await else {
                continue;
            };

            if let Some(sensor) = Self::classify_peripheral(&peripheral, &filter).await {
                let is_new = discovered
                    .lock()
                    .await
                    .insert(sensor.device_id.clone(), sensor.clone())
                    .is_none();

                if is_new {
                    tracing::debug!(device = %sensor.device_id, name = %sensor.name, "Discovered");
                    if let Some(tx) = &event_tx {
                        let _ = tx.send(SensorEvent::Discovered(sensor));
                    }
                }
            }
        }
    }

    /// Build a discovery record when the advertisement passes the filter.
    async fn classify_peripheral(
        peripheral: &Peripheral,
        filter: &AdvertisementFilter,
    ) -> Option<DiscoveredSensor> {
        let properties = peripheral.properties().await.ok()??;

        if !filter.matches(properties.local_name.as_deref(), &properties.services) {
            return None;
        }

        Some(DiscoveredSensor {
            device_id: peripheral.id().to_string(),
            name: properties
                .local_name
                .unwrap_or_else(|| "Unknown Trainer".to_string()),
            protocol: Protocol::best_of(&properties.services),
            signal_strength: properties.rssi,
            last_seen: Instant::now(),
        })
    }

    /// Stop scanning.
    pub async fn stop_discovery(&mut self) -> Result<(), SensorError> {
        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        {
            let mut is_scanning = self.is_scanning.lock().await;
            if !*is_scanning {
                return Ok(()); // Not scanning
            }
            *is_scanning = false;
        }

        tracing::info!("Stopping sensor discovery");

        adapter
            .stop_scan()
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        self.send_event(SensorEvent::ScanStopped);

        Ok(())
    }

    /// Scan for the configured discovery timeout and return what was found.
    pub async fn discover(&mut self) -> Result<Vec<DiscoveredSensor>, SensorError> {
        self.start_discovery().await?;
        tokio::time::sleep(Duration::from_secs(self.config.discovery_timeout_secs)).await;
        self.stop_discovery().await?;
        Ok(self.get_discovered().await)
    }

    /// Connect to a trainer and attach it to `hub`.
    pub async fn connect(&mut self, device_id: &str, hub: SharedHub) -> Result<(), SensorError> {
        if self.link.is_some() {
            self.disconnect().await?;
        }

        let adapter = self.adapter.as_ref().ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("Connecting to trainer: {}", device_id);
        hub.lock().await.on_connecting();
        self.send_event(SensorEvent::ConnectionChanged {
            device_id: device_id.to_string(),
            state: ConnectionState::Connecting,
        });

        let result = self.open_link(adapter, device_id, hub.clone()).await;
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.send_event(SensorEvent::ConnectionChanged {
                    device_id: device_id.to_string(),
                    state: ConnectionState::Connected,
                });
                tracing::info!("Connected to trainer: {}", device_id);
                Ok(())
            }
            Err(e) => {
                hub.lock().await.on_disconnected();
                self.send_event(SensorEvent::ConnectionChanged {
                    device_id: device_id.to_string(),
                    state: ConnectionState::Disconnected,
                });
                Err(e)
            }
        }
    }

    async fn open_link(
        &self,
        adapter: &Adapter,
        device_id: &str,
        hub: SharedHub,
    ) -> Result<TrainerLink, SensorError> {
        let peripheral = adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| SensorError::SensorNotFound(device_id.to_string()))?;

        let timeout = Duration::from_secs(self.config.connection_timeout_secs);
        tokio::time::timeout(timeout, peripheral.connect())
            .await
            .map_err(|_| SensorError::ConnectionTimeout)?
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        let control_point = Self::subscribe_to_characteristics(&peripheral).await?;
        if control_point.is_none() {
            tracing::warn!("Trainer has no FTMS control point; targets will not be applied");
        }

        let (write_tx, write_rx) = mpsc::unbounded_channel();

        // Subscribe before the first write so no indication is missed.
        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;

        if let Some(first) = hub.lock().await.on_connected() {
            let _ = write_tx.send(first);
        }

        let writer = tokio::spawn(Self::run_writer(
            peripheral.clone(),
            control_point,
            write_rx,
            write_tx.clone(),
            hub.clone(),
        ));
        let ticker = tokio::spawn(Self::run_ticker(hub.clone(), write_tx.clone()));
        let notifier = tokio::spawn(Self::handle_notifications(
            notifications,
            hub.clone(),
            self.event_tx.clone(),
            device_id.to_string(),
            vec![writer.abort_handle(), ticker.abort_handle()],
        ));
        let tasks = vec![notifier, writer, ticker];

        Ok(TrainerLink {
            device_id: device_id.to_string(),
            peripheral,
            hub,
            writes: write_tx,
            tasks,
        })
    }

    /// Subscribe to telemetry characteristics and control point indications.
    /// Returns the control point, when present.
    async fn subscribe_to_characteristics(
        peripheral: &Peripheral,
    ) -> Result<Option<Characteristic>, SensorError> {
        let mut control_point = None;

        for characteristic in peripheral.characteristics() {
            if characteristic.uuid == FTMS_CONTROL_POINT_UUID {
                peripheral
                    .subscribe(&characteristic)
                    .await
                    .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;
                control_point = Some(characteristic);
            } else if let Some(kind) = CharacteristicKind::from_uuid(characteristic.uuid) {
                peripheral
                    .subscribe(&characteristic)
                    .await
                    .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;
                tracing::debug!("Subscribed to {}", kind);
            }
        }

        Ok(control_point)
    }

    /// Feed notifications into the hub until the peripheral goes away, then
    /// stop the link's other tasks. Aborting the writer drops the write
    /// receiver, which marks the link closed for [`Self::submit`] and
    /// [`Self::connected_device`].
    async fn handle_notifications(
        mut notifications: std::pin::Pin<
            Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>,
        >,
        hub: SharedHub,
        event_tx: Option<Sender<SensorEvent>>,
        device_id: String,
        link_tasks: Vec<AbortHandle>,
    ) {
        use futures::stream::StreamExt;

        while let Some(notification) = notifications.next().await {
            let mut hub = hub.lock().await;
            if notification.uuid == FTMS_CONTROL_POINT_UUID {
                hub.on_control_indication(&notification.value);
            } else if let Some(kind) = CharacteristicKind::from_uuid(notification.uuid) {
                hub.on_notification(kind, &notification.value);
            }
        }

        // Stream ended - peripheral disconnected
        tracing::warn!("Notification stream ended for {}", device_id);
        Self::close_link(&hub, link_tasks).await;
        if let Some(tx) = &event_tx {
            let _ = tx.send(SensorEvent::ConnectionChanged {
                device_id,
                state: ConnectionState::Disconnected,
            });
        }
    }

    /// Stop the writer and ticker of a dropped link and reset the session.
    async fn close_link(hub: &SharedHub, link_tasks: Vec<AbortHandle>) {
        for task in link_tasks {
            task.abort();
        }
        hub.lock().await.on_disconnected();
    }

    /// Perform control point writes one at a time and report each outcome
    /// back to the hub.
    async fn run_writer(
        peripheral: Peripheral,
        control_point: Option<Characteristic>,
        mut commands: mpsc::UnboundedReceiver<ControlCommand>,
        resubmit: mpsc::UnboundedSender<ControlCommand>,
        hub: SharedHub,
    ) {
        while let Some(command) = commands.recv().await {
            let result = match &control_point {
                Some(characteristic) => peripheral
                    .write(characteristic, &command.encode(), WriteType::WithResponse)
                    .await
                    .map_err(|e| ControlError::WriteNotAcknowledged(e.to_string())),
                None => Err(ControlError::WriteNotAcknowledged(
                    "no control point".to_string(),
                )),
            };

            if result.is_ok() {
                tracing::debug!("Wrote {}", command);
            }

            if let Some(next) = hub.lock().await.on_write_complete(result) {
                let _ = resubmit.send(next);
            }
        }
    }

    /// Tick the hub once per second.
    async fn run_ticker(hub: SharedHub, writes: mpsc::UnboundedSender<ControlCommand>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await;

        loop {
            interval.tick().await;
            let mut hub = hub.lock().await;
            if !hub.is_connected() {
                break;
            }
            if let Some(command) = hub.tick() {
                let _ = writes.send(command);
            }
        }
    }

    /// The current link, unless the peripheral has already gone away.
    fn live_link(&self) -> Option<&TrainerLink> {
        self.link.as_ref().filter(|link| !link.writes.is_closed())
    }

    /// Queue a write produced by the hub outside the background tasks.
    pub fn submit(&self, command: Option<ControlCommand>) -> Result<(), ControlError> {
        let Some(command) = command else {
            return Ok(());
        };
        let link = self.live_link().ok_or(ControlError::LinkUnavailable)?;
        link.writes
            .send(command)
            .map_err(|_| ControlError::LinkUnavailable)
    }

    /// Disconnect from the trainer.
    pub async fn disconnect(&mut self) -> Result<(), SensorError> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };

        for task in &link.tasks {
            task.abort();
        }

        if link.writes.is_closed() {
            // The notification task already reset the hub and reported it.
            tracing::debug!("Releasing closed link to {}", link.device_id);
            return Ok(());
        }

        tracing::info!("Disconnecting from trainer: {}", link.device_id);
        link.hub.lock().await.on_disconnected();

        link.peripheral.disconnect().await?;

        self.send_event(SensorEvent::ConnectionChanged {
            device_id: link.device_id,
            state: ConnectionState::Disconnected,
        });

        Ok(())
    }

    /// Get list of discovered peripherals.
    pub async fn get_discovered(&self) -> Vec<DiscoveredSensor> {
        self.discovered.lock().await.values().cloned().collect()
    }

    /// Device id of the connected trainer, `None` once the link has dropped.
    pub fn connected_device(&self) -> Option<&str> {
        self.live_link().map(|l| l.device_id.as_str())
    }

    /// Shutdown the sensor manager.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down SensorManager");

        let _ = self.stop_discovery().await;
        if let Err(e) = self.disconnect().await {
            tracing::warn!("Disconnect failed during shutdown: {}", e);
        }
    }
}
