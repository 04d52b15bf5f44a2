//! In-memory doubles for the engine's collaborators, shared by unit and integration tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use labwatch_api::{AlarmConfig, InboundMessage, PowerSource, SensorId};
use time::{Duration, OffsetDateTime};

use crate::clock::{readable_time, Clock};
use crate::configs::{ConfigStore, History, HistoryEntry};
use crate::errors::{ModemError, SensorError, StoreError};
use crate::services::modem::{at, LineCloser, ModemTransport, Reply};
use crate::services::{PowerSupply, SensorSource};

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap()
    }
}

pub struct MemoryConfigStore {
    document: Mutex<AlarmConfig>,
}

impl MemoryConfigStore {
    pub fn new(document: AlarmConfig) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> Result<AlarmConfig, StoreError> {
        Ok(self.document.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn put(&self, document: &AlarmConfig) -> Result<(), StoreError> {
        *self.document.lock().map_err(|_| StoreError::Poisoned)? = document.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }
}

impl History for MemoryHistory {
    fn append(&self, event: &str, timestamp: OffsetDateTime) -> Result<(), StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)?.push(HistoryEntry {
            message: event.to_string(),
            time: readable_time(timestamp),
            timestamp: timestamp.unix_timestamp(),
        });
        Ok(())
    }

    fn entries(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.entries.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)?.clear();
        Ok(())
    }
}

/// Probes with settable values; `None` makes the probe fail
#[derive(Default)]
pub struct FakeSensorSource {
    values: Mutex<BTreeMap<SensorId, Option<f64>>>,
}

impl FakeSensorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sensor_id: &str, value: Option<f64>) {
        self.values
            .lock()
            .unwrap()
            .insert(sensor_id.to_string(), value);
    }
}

impl SensorSource for FakeSensorSource {
    fn discover(&self) -> Vec<SensorId> {
        self.values.lock().unwrap().keys().cloned().collect()
    }

    fn read_all(&self, sensor_ids: &[SensorId]) -> BTreeMap<SensorId, Result<f64, SensorError>> {
        let values = self.values.lock().unwrap();

        sensor_ids
            .iter()
            .map(|sensor_id| {
                let result = values
                    .get(sensor_id)
                    .copied()
                    .flatten()
                    .ok_or(SensorError::MissingTemperature);
                (sensor_id.clone(), result)
            })
            .collect()
    }
}

pub struct FakePowerSupply {
    status: Mutex<Option<PowerSource>>,
    battery: Mutex<Option<u8>>,
}

impl FakePowerSupply {
    pub fn new(status: Option<PowerSource>, battery: Option<u8>) -> Self {
        Self {
            status: Mutex::new(status),
            battery: Mutex::new(battery),
        }
    }

    pub fn main() -> Self {
        Self::new(Some(PowerSource::Main), Some(100))
    }

    pub fn set_status(&self, status: Option<PowerSource>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_battery(&self, battery: Option<u8>) {
        *self.battery.lock().unwrap() = battery;
    }
}

impl PowerSupply for FakePowerSupply {
    fn status(&self) -> Option<PowerSource> {
        *self.status.lock().unwrap()
    }

    fn battery_percent(&self) -> Option<u8> {
        *self.battery.lock().unwrap()
    }
}

struct ModemState {
    responsive: bool,
    reject_sends: bool,
    rssi: i32,
    network: String,
    inbox: Vec<InboundMessage>,
    commands: Vec<String>,
    sent: Vec<(String, String)>,
    recipient: Option<String>,
    /// Pending line faults as `(command prefix, remaining)`
    faults: Vec<(String, u32)>,
}

/// Simulated SIM7600 answering the AT subset the client uses
#[derive(Clone)]
pub struct FakeModem {
    state: Arc<Mutex<ModemState>>,
}

impl Default for FakeModem {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeModem {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ModemState {
                responsive: true,
                reject_sends: false,
                rssi: 20,
                network: "LTE".to_string(),
                inbox: Vec::new(),
                commands: Vec::new(),
                sent: Vec::new(),
                recipient: None,
                faults: Vec::new(),
            })),
        }
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            modem: self.clone(),
            closer: LineCloser::default(),
        }
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.state.lock().unwrap().responsive = responsive;
    }

    /// Makes the modem withhold the `> ` prompt
    pub fn set_reject_sends(&self, reject: bool) {
        self.state.lock().unwrap().reject_sends = reject;
    }

    pub fn set_network(&self, network: &str) {
        self.state.lock().unwrap().network = network.to_string();
    }

    pub fn set_rssi(&self, rssi: i32) {
        self.state.lock().unwrap().rssi = rssi;
    }

    /// Fails the next `times` commands starting with `prefix` with an I/O error
    pub fn fail_on(&self, prefix: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .faults
            .push((prefix.to_string(), times));
    }

    fn take_fault(&self, command: &str) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let fault = state
            .faults
            .iter_mut()
            .find(|(prefix, remaining)| *remaining > 0 && command.starts_with(prefix.as_str()));

        match fault {
            Some((_, remaining)) => {
                *remaining -= 1;
                state.commands.push(command.to_string());
                true
            }
            None => false,
        }
    }

    pub fn deliver(&self, index: u32, sender: &str, body: &str) {
        self.state.lock().unwrap().inbox.push(InboundMessage {
            index,
            sender: sender.to_string(),
            body: body.to_string(),
        });
    }

    pub fn inbox(&self) -> Vec<InboundMessage> {
        self.state.lock().unwrap().inbox.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Confirmed segments as `(recipient, text)`
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    fn respond(&self, command: &str) -> Reply {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());

        if !state.responsive {
            return Reply::NoReply(String::new());
        }

        let ok = || Reply::Valid("\nOK".to_string());

        match command {
            at::HEALTH_CHECK | at::FACTORY_RESET | at::TEXT_MODE | at::GSM_CHARSET => ok(),
            at::CTRL_Z => {
                state.recipient = None;
                ok()
            }
            at::SIGNAL_QUALITY => Reply::Valid(format!("+CSQ: {},99\n\nOK", state.rssi)),
            at::SYSTEM_INFO => Reply::Valid(format!("+CPSI: {},Online\n\nOK", state.network)),
            at::LIST_UNREAD => {
                let mut listing = String::new();
                for message in &state.inbox {
                    listing.push_str(&format!(
                        "+CMGL: {},\"REC UNREAD\",\"{}\",\"\",\"24/03/05,14:07:00-20\"\n{}\n",
                        message.index, message.sender, message.body
                    ));
                }
                listing.push_str("\nOK");
                Reply::Valid(listing)
            }
            _ if command.starts_with("AT+CMGD=") => {
                let index = command
                    .trim_start_matches("AT+CMGD=")
                    .trim_end()
                    .parse::<u32>()
                    .ok();
                state.inbox.retain(|message| Some(message.index) != index);
                ok()
            }
            _ if command.starts_with("AT+CMGS=\"") => {
                if state.reject_sends {
                    return Reply::NoReply("\nERROR".to_string());
                }
                let number = command
                    .trim_start_matches("AT+CMGS=\"")
                    .trim_end_matches('\r')
                    .trim_end_matches('"');
                state.recipient = Some(number.to_string());
                Reply::Valid("> ".to_string())
            }
            _ if command.ends_with(at::CTRL_Z) => match state.recipient.take() {
                Some(recipient) => {
                    let text = command.trim_end_matches(at::CTRL_Z).to_string();
                    state.sent.push((recipient, text));
                    Reply::Valid(format!("+CMGS: {}\n\nOK", state.sent.len()))
                }
                None => Reply::NoReply("\nERROR".to_string()),
            },
            _ => Reply::NoReply("\nERROR".to_string()),
        }
    }
}

/// [`ModemTransport`] end of a [`FakeModem`]
pub struct FakeTransport {
    modem: FakeModem,
    closer: LineCloser,
}

#[async_trait]
impl ModemTransport for FakeTransport {
    async fn send(
        &mut self,
        command: &str,
        _expected: &str,
        _timeout: StdDuration,
    ) -> Result<Reply, ModemError> {
        if self.closer.is_closed() {
            return Err(ModemError::LineClosed);
        }

        if self.modem.take_fault(command) {
            return Err(ModemError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected line fault",
            )));
        }

        let reply = self.modem.respond(command);
        tokio::task::yield_now().await;

        Ok(reply)
    }

    fn closer(&self) -> LineCloser {
        self.closer.clone()
    }
}
