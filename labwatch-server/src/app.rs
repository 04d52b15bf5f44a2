use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use labwatch_api::{AlarmConfig, ModemSession, MonitorStatus, SensorRow, Snapshot};
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::clock::{readable_time, Clock, SystemClock};
use crate::configs::{
    ConfigCache, ConfigStore, History, JsonConfigStore, JsonHistory, Modem, Monitor, Settings,
};
use crate::errors::AppError;
use crate::services::modem::{
    self, LineCloser, ModemClient, ModemHandle, ModemTransport, SerialTransport,
};
use crate::services::{
    supervise, AlertEngine, CommandRouter, NoPowerSupply, PowerSupply, SensorSource,
    SysfsPowerSupply, W1SensorSource,
};

/// External collaborators the engine reads from and writes to
pub struct Collaborators {
    pub store: Arc<dyn ConfigStore>,
    pub history: Arc<dyn History>,
    pub sensors: Arc<dyn SensorSource>,
    pub power: Arc<dyn PowerSupply>,
    pub clock: Arc<dyn Clock>,
}

/// Running monitor and modem loops plus the accessors a dashboard needs
pub struct App {
    cache: ConfigCache,
    history: Arc<dyn History>,
    clock: Arc<dyn Clock>,
    modem: ModemHandle,
    status: watch::Receiver<MonitorStatus>,
    reschedule: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
    closer: LineCloser,
    workers: Vec<JoinHandle<()>>,
}

impl App {
    /// Wires the engine together and spawns both supervised loops on the current runtime
    pub fn start<T>(
        modem_settings: Modem,
        monitor_settings: Monitor,
        transport: T,
        collaborators: Collaborators,
    ) -> Result<Self, AppError>
    where
        T: ModemTransport + 'static,
    {
        let Collaborators {
            store,
            history,
            sensors,
            power,
            clock,
        } = collaborators;

        let cache = ConfigCache::load(store)?;
        let (stop, stop_rx) = watch::channel(false);
        let (handle, mailbox) = modem::channel();

        let engine = AlertEngine::new(
            cache.clone(),
            sensors,
            power,
            history.clone(),
            clock.clone(),
            handle.clone(),
            monitor_settings.clone(),
        );
        let status = engine.subscribe();
        let reschedule = engine.reschedule_flag();

        let router = CommandRouter::new(
            cache.clone(),
            history.clone(),
            clock.clone(),
            handle.subscribe_session(),
            status.clone(),
        );

        let closer = transport.closer();
        let backoff = modem_settings.recovery_backoff();
        let client = ModemClient::new(
            transport,
            modem_settings,
            clock.clone(),
            Arc::new(router),
            mailbox,
        );

        let engine = Arc::new(Mutex::new(engine));
        let monitor = supervise(
            "monitor",
            stop_rx.clone(),
            monitor_settings.check_interval(),
            move |stop| {
                let engine = engine.clone();
                async move { engine.lock().await.run(stop).await }
            },
        );

        let client = Arc::new(Mutex::new(client));
        let modem = supervise("modem", stop_rx, backoff, move |stop| {
            let client = client.clone();
            async move {
                if let Err(e) = client.lock().await.run(stop).await {
                    tracing::error!("Modem loop failed: {}", e);
                }
            }
        });

        tracing::info!("Monitor and modem loops started");

        Ok(Self {
            cache,
            history,
            clock,
            modem: handle,
            status,
            reschedule,
            stop,
            closer,
            workers: vec![monitor, modem],
        })
    }

    /// Raises the stop signal, closes the serial line and waits for both loops
    pub async fn stop(self) -> Result<(), AppError> {
        tracing::info!("Stopping");

        self.stop.send_replace(true);
        self.closer.close();

        for worker in self.workers {
            worker.await?;
        }

        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        build_snapshot(
            &self.cache.current(),
            &self.status.borrow(),
            &self.modem.session(),
            self.clock.now(),
        )
    }

    /// Re-reads the alarm document after an external edit
    pub fn reload(&self) -> Result<Arc<AlarmConfig>, AppError> {
        Ok(self.cache.reload()?)
    }

    /// Reinstalls the daily report schedule on the next monitor tick
    pub fn reschedule_daily_report(&self) {
        self.reschedule.store(true, Ordering::SeqCst);
    }

    pub fn config(&self) -> &ConfigCache {
        &self.cache
    }

    pub fn history(&self) -> &Arc<dyn History> {
        &self.history
    }

    pub fn modem(&self) -> &ModemHandle {
        &self.modem
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MonitorStatus> {
        self.status.clone()
    }
}

/// Production wiring: JSON documents, 1-Wire probes, sysfs power supply and the serial modem
pub fn create_app(settings: &Settings, clock: SystemClock) -> Result<App, AppError> {
    let power: Arc<dyn PowerSupply> = match &settings.power {
        Some(power) => Arc::new(SysfsPowerSupply::new(power)),
        None => Arc::new(NoPowerSupply),
    };

    let store = JsonConfigStore::new(&settings.storage.config_path);
    tracing::info!("Alarm configuration at {}", store.path().display());

    let collaborators = Collaborators {
        store: Arc::new(store),
        history: Arc::new(JsonHistory::new(&settings.storage.history_path)),
        sensors: Arc::new(W1SensorSource::new(&settings.monitor.sensor_base_dir)),
        power,
        clock: Arc::new(clock),
    };

    let transport = SerialTransport::open(&settings.modem)?;

    App::start(
        settings.modem.clone(),
        settings.monitor.clone(),
        transport,
        collaborators,
    )
}

/// Dashboard view; rows only for sensors that are both configured and currently reading
pub fn build_snapshot(
    config: &AlarmConfig,
    status: &MonitorStatus,
    session: &ModemSession,
    now: OffsetDateTime,
) -> Snapshot {
    let sensors = status
        .readings
        .iter()
        .filter(|reading| reading.read_ok)
        .filter_map(|reading| {
            config.sensors.get(&reading.sensor_id).map(|sensor| SensorRow {
                sensor_id: reading.sensor_id.clone(),
                name: sensor.name.clone(),
                trigger: sensor.trigger,
                temperature: reading.temperature,
                above: status.above.contains_key(&reading.sensor_id),
            })
        })
        .collect();

    Snapshot {
        high_temperature: !status.above.is_empty(),
        location: config.location.clone(),
        hysteresis: config.hysteresis,
        alert_interval: config.alert_interval_seconds / 60,
        daily_report_time: config.daily_report_time.clone(),
        armed: config.armed,
        send_daily_report: config.send_daily_report,
        repeat_alerts: config.repeat_alerts,
        signal_quality: session.signal_quality,
        network_type: session.network_type,
        device_time: readable_time(now),
        contacts: config.contacts.clone(),
        power_source: status.power_source,
        battery_percent: status.battery_percent,
        sensors,
    }
}
