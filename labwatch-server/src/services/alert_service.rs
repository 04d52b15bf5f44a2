use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use labwatch_api::{
    AlarmConfig, MonitorStatus, OutboundMessage, PowerSource, SensorId, SensorReading,
    ThresholdState, ThresholdStatus,
};
use time::{Duration, OffsetDateTime, Time};
use tokio::sync::watch;

use crate::clock::{parse_time_of_day, readable_time, Clock};
use crate::configs::{ConfigCache, History, Monitor};
use crate::services::modem::ModemHandle;
use crate::services::power_service::PowerSupply;
use crate::services::sensor_service::SensorSource;
use crate::services::supervisor::pause;

/// Pending daily report, reinstalled whenever the configured wall-clock time changes
#[derive(Debug, Clone, PartialEq)]
pub struct DailySchedule {
    report_time: String,
    next_due: Option<OffsetDateTime>,
}

impl DailySchedule {
    pub fn new(report_time: &str, now: OffsetDateTime) -> Self {
        let mut schedule = Self {
            report_time: String::new(),
            next_due: None,
        };
        schedule.install(report_time, now);
        schedule
    }

    /// Next occurrence of `report_time` strictly after `now`; unparseable times disable the report
    pub fn install(&mut self, report_time: &str, now: OffsetDateTime) {
        self.report_time = report_time.to_string();
        self.next_due = parse_time_of_day(report_time).map(|time| next_occurrence(time, now));

        match self.next_due {
            Some(next_due) => tracing::info!("Daily report scheduled for {}", next_due),
            None => tracing::warn!("Invalid daily report time {:?}, report disabled", report_time),
        }
    }

    pub fn is_installed_for(&self, report_time: &str) -> bool {
        self.report_time == report_time
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.next_due.is_some_and(|next_due| now >= next_due)
    }

    /// Moves the marker to the first occurrence after `now`
    pub fn advance(&mut self, now: OffsetDateTime) {
        if let Some(time) = parse_time_of_day(&self.report_time) {
            self.next_due = Some(next_occurrence(time, now));
        }
    }

    pub fn next_due(&self) -> Option<OffsetDateTime> {
        self.next_due
    }
}

fn next_occurrence(time: Time, now: OffsetDateTime) -> OffsetDateTime {
    let today = now.replace_time(time);
    if today > now {
        today
    } else {
        today + Duration::DAY
    }
}

/// `true` when nothing was sent yet or more than `interval_seconds` have passed
fn gate_open(last: Option<OffsetDateTime>, now: OffsetDateTime, interval_seconds: u64) -> bool {
    last.map_or(true, |last| {
        (now - last).whole_seconds() > i64::try_from(interval_seconds).unwrap_or(i64::MAX)
    })
}

/// Monitoring state machine driven by the monitor loop
pub struct AlertEngine {
    cache: ConfigCache,
    sensors: Arc<dyn SensorSource>,
    power: Arc<dyn PowerSupply>,
    history: Arc<dyn History>,
    clock: Arc<dyn Clock>,
    modem: ModemHandle,
    monitor: Monitor,
    known_sensors: Vec<SensorId>,
    state: MonitorStatus,
    schedule: DailySchedule,
    reschedule: Arc<AtomicBool>,
    status: watch::Sender<MonitorStatus>,
}

impl AlertEngine {
    pub fn new(
        cache: ConfigCache,
        sensors: Arc<dyn SensorSource>,
        power: Arc<dyn PowerSupply>,
        history: Arc<dyn History>,
        clock: Arc<dyn Clock>,
        modem: ModemHandle,
        monitor: Monitor,
    ) -> Self {
        let config = cache.current();
        let now = clock.now();

        let mut known_sensors = sensors.discover();
        if known_sensors.is_empty() {
            known_sensors = config.sensors.keys().cloned().collect();
        }

        let state = MonitorStatus {
            armed: config.armed,
            ..Default::default()
        };
        let (status, _) = watch::channel(state.clone());

        Self {
            cache,
            sensors,
            power,
            history,
            clock,
            modem,
            monitor,
            known_sensors,
            state,
            schedule: DailySchedule::new(&config.daily_report_time, now),
            reschedule: Arc::new(AtomicBool::new(false)),
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
        self.status.subscribe()
    }

    /// Flag read at the start of the next tick to reinstall the daily schedule
    pub fn reschedule_flag(&self) -> Arc<AtomicBool> {
        self.reschedule.clone()
    }

    pub fn status(&self) -> &MonitorStatus {
        &self.state
    }

    /// Evaluates one reading cycle; returned messages were already queued to the modem
    pub fn tick(&mut self) -> Vec<OutboundMessage> {
        let now = self.clock.now();
        let mut config = self.cache.current();
        let mut emitted = Vec::new();

        if self.reschedule.swap(false, Ordering::SeqCst)
            || !self.schedule.is_installed_for(&config.daily_report_time)
        {
            self.schedule.install(&config.daily_report_time, now);
        }

        if self.read_sensors() {
            config = self.rediscover_sensors().unwrap_or(config);
        }

        self.state.armed = config.armed;

        if config.armed {
            self.evaluate_thresholds(&config, now, &mut emitted);
            self.evaluate_alert(&config, now, &mut emitted);
            self.evaluate_power(&config, now, &mut emitted);
            self.evaluate_daily_report(&config, now, &mut emitted);
        } else {
            self.state.above.clear();
            self.state.alert_already_sent = false;
            if self.schedule.is_due(now) {
                self.schedule.advance(now);
            }
        }

        self.state.next_daily_report = self.schedule.next_due();
        self.state.updated_at = Some(now);
        self.status.send_replace(self.state.clone());

        emitted
    }

    /// Runs [`AlertEngine::tick`] on the configured cadence until stopped
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            "Monitor loop started, checking every {:?}",
            self.monitor.check_interval()
        );

        while !*stop.borrow() {
            self.tick();
            pause(&mut stop, self.monitor.check_interval()).await;
        }

        tracing::info!("Monitor loop stopped");
    }

    /// Stores this tick's readings, returns `true` if any probe failed
    fn read_sensors(&mut self) -> bool {
        let results = self.sensors.read_all(&self.known_sensors);
        let mut failed = false;

        self.state.readings = results
            .into_iter()
            .map(|(sensor_id, result)| match result {
                Ok(temperature) => SensorReading::ok(sensor_id, temperature),
                Err(e) => {
                    tracing::warn!("Sensor {} read failed: {}", sensor_id, e);
                    failed = true;
                    SensorReading::failed(sensor_id)
                }
            })
            .collect();

        tracing::debug!("Readings: {:?}", self.state.readings);

        failed
    }

    fn rediscover_sensors(&mut self) -> Option<Arc<AlarmConfig>> {
        let discovered = self.sensors.discover();
        if discovered.is_empty() {
            return None;
        }

        tracing::info!("Updating sensors, found {}", discovered.len());
        self.known_sensors = discovered;

        match self.cache.store().register_sensors(&self.known_sensors) {
            Ok(0) => None,
            Ok(added) => {
                tracing::info!("Registered {} new sensor(s)", added);
                self.cache
                    .reload()
                    .map_err(|e| tracing::error!("Failed to reload configuration: {}", e))
                    .ok()
            }
            Err(e) => {
                tracing::error!("Failed to register sensors: {}", e);
                None
            }
        }
    }

    fn evaluate_thresholds(
        &mut self,
        config: &AlarmConfig,
        now: OffsetDateTime,
        emitted: &mut Vec<OutboundMessage>,
    ) {
        let was_above = !self.state.above.is_empty();
        self.state
            .above
            .retain(|sensor_id, _| config.sensors.contains_key(sensor_id));

        for reading in self.state.readings.iter().filter(|reading| reading.read_ok) {
            let Some(sensor) = config.sensors.get(&reading.sensor_id) else {
                continue;
            };

            match self.state.above.get_mut(&reading.sensor_id) {
                Some(_) if reading.temperature < sensor.trigger - config.hysteresis => {
                    tracing::info!("{} is back to normal temperature", sensor.name);
                    self.state.above.remove(&reading.sensor_id);
                }
                Some(state) => state.last_known_value = reading.temperature,
                None if reading.temperature > sensor.trigger => {
                    tracing::info!("{} is above {} C", sensor.name, sensor.trigger);
                    self.state.above.insert(
                        reading.sensor_id.clone(),
                        ThresholdState {
                            status: ThresholdStatus::Above,
                            last_known_value: reading.temperature,
                        },
                    );
                }
                None => {}
            }
        }

        if was_above && self.state.above.is_empty() {
            self.state.alert_already_sent = false;

            let body = format!(
                "Alert Resolved\n\nTemperature is back to normal on {}\n\nLocation: {}",
                readable_time(now),
                config.location
            );
            self.emit(
                config.alert_recipients(),
                body,
                Some("Temperature back to normal"),
                now,
                emitted,
            );
        }
    }

    fn evaluate_alert(
        &mut self,
        config: &AlarmConfig,
        now: OffsetDateTime,
        emitted: &mut Vec<OutboundMessage>,
    ) {
        if self.state.above.is_empty()
            || !gate_open(self.state.last_alert_time, now, config.alert_interval_seconds)
            || !(config.repeat_alerts || !self.state.alert_already_sent)
        {
            return;
        }

        let details = self
            .state
            .above
            .iter()
            .map(|(sensor_id, state)| {
                let name = config
                    .sensors
                    .get(sensor_id)
                    .map_or(sensor_id.as_str(), |sensor| sensor.name.as_str());
                format!("{}: {} C", name, state.last_known_value)
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.state.alert_already_sent = true;
        self.state.last_alert_time = Some(now);

        let body = format!(
            "Alert\n\nHigh temperature on {}\n\nSensors above threshold\n{}\n\nLocation: {}",
            readable_time(now),
            details,
            config.location
        );
        self.emit(
            config.alert_recipients(),
            body,
            Some("High temperature"),
            now,
            emitted,
        );
    }

    fn evaluate_power(
        &mut self,
        config: &AlarmConfig,
        now: OffsetDateTime,
        emitted: &mut Vec<OutboundMessage>,
    ) {
        let Some(source) = self.power.status() else {
            return;
        };

        let previous = self.state.power_source.unwrap_or(PowerSource::Main);
        let first_reading = self.state.power_source.is_none();

        if source != previous || (first_reading && source == PowerSource::Backup) {
            self.record(&format!("Power changed to {source}"), now);

            match source {
                PowerSource::Backup => {
                    if gate_open(
                        self.state.last_power_event_time,
                        now,
                        config.alert_interval_seconds,
                    ) {
                        self.state.last_power_event_time = Some(now);

                        let body = format!(
                            "Alert\n\nPower lost on {}, running on battery power\n\nLocation: {}",
                            readable_time(now),
                            config.location
                        );
                        self.emit(config.alert_recipients(), body, None, now, emitted);
                    } else {
                        tracing::info!("Power lost, notification rate limited");
                    }
                }
                PowerSource::Main => {
                    self.state.last_power_event_time = Some(now);
                    self.state.low_battery_latched = false;

                    let body = format!(
                        "Alert Resolved\n\nPower has been recovered on {}\n\nLocation: {}",
                        readable_time(now),
                        config.location
                    );
                    self.emit(config.alert_recipients(), body, None, now, emitted);
                }
            }
        }

        self.state.power_source = Some(source);
        self.state.battery_percent = self.power.battery_percent();

        if source == PowerSource::Backup {
            self.evaluate_battery(config, now, emitted);
        }
    }

    fn evaluate_battery(
        &mut self,
        config: &AlarmConfig,
        now: OffsetDateTime,
        emitted: &mut Vec<OutboundMessage>,
    ) {
        let Some(percent) = self.state.battery_percent else {
            return;
        };
        let threshold = self.monitor.low_battery_threshold;

        if percent > threshold {
            self.state.low_battery_latched = false;
        } else if !self.state.low_battery_latched {
            self.state.low_battery_latched = true;

            let body = format!(
                "Alert\n\nBattery is at or below {}% on {}\n\nLocation: {}",
                threshold,
                readable_time(now),
                config.location
            );
            self.emit(
                config.alert_recipients(),
                body,
                Some("Low battery"),
                now,
                emitted,
            );
        }
    }

    fn evaluate_daily_report(
        &mut self,
        config: &AlarmConfig,
        now: OffsetDateTime,
        emitted: &mut Vec<OutboundMessage>,
    ) {
        if !self.schedule.is_due(now) {
            return;
        }
        self.schedule.advance(now);

        if !config.send_daily_report {
            return;
        }

        let mut rows: Vec<(&str, f64)> = self
            .state
            .readings
            .iter()
            .filter(|reading| reading.read_ok)
            .filter_map(|reading| {
                config
                    .sensors
                    .get(&reading.sensor_id)
                    .map(|sensor| (sensor.name.as_str(), reading.temperature))
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));

        let details = rows
            .iter()
            .map(|(name, temperature)| format!("{name}: {temperature} C"))
            .collect::<Vec<_>>()
            .join("\n");
        let power = self
            .state
            .power_source
            .map_or("Unknown".to_string(), |source| source.to_string());

        let body = format!(
            "Daily Report\n\nLocation: {}\n\nPower: {}\n{}\nTime: {}",
            config.location,
            power,
            details,
            readable_time(now)
        );
        self.emit(
            config.daily_report_recipients(),
            body,
            Some("Daily report sent"),
            now,
            emitted,
        );
    }

    fn emit(
        &self,
        recipients: Vec<String>,
        body: String,
        event: Option<&str>,
        now: OffsetDateTime,
        emitted: &mut Vec<OutboundMessage>,
    ) {
        if let Some(event) = event {
            self.record(event, now);
        }

        let message = OutboundMessage::new(recipients, body);
        if !self.modem.enqueue(message.clone()) {
            tracing::error!("Modem queue closed, message dropped");
        }

        emitted.push(message);
    }

    fn record(&self, event: &str, now: OffsetDateTime) {
        tracing::info!("{}", event);

        if let Err(e) = self.history.append(event, now) {
            tracing::error!("Failed to write history: {}", e);
        }
    }
}
