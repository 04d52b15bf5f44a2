use std::sync::Arc;
use std::time::Duration;

use labwatch_api::{AlarmConfig, Contact, SensorConfig};
use labwatch_server::app::{App, Collaborators};
use labwatch_server::configs::{Modem, Monitor};
use labwatch_server::tests::{
    FakeModem, FakePowerSupply, FakeSensorSource, ManualClock, MemoryConfigStore, MemoryHistory,
};
use time::macros::datetime;

pub const ADMIN: &str = "+14155550100";
pub const USER: &str = "+14155550101";
pub const STRANGER: &str = "+19995550199";

pub struct MockApp {
    pub app: App,
    pub modem: FakeModem,
    pub sensors: Arc<FakeSensorSource>,
    pub power: Arc<FakePowerSupply>,
    pub history: Arc<MemoryHistory>,
    pub store: Arc<MemoryConfigStore>,
    pub clock: Arc<ManualClock>,
}

impl MockApp {
    pub fn new() -> Self {
        Self::with_config(Self::sample_config())
    }

    pub fn with_config(config: AlarmConfig) -> Self {
        let modem = FakeModem::new();
        let sensors = Arc::new(FakeSensorSource::new());
        sensors.set("28-a", Some(21.0));
        sensors.set("28-b", Some(22.0));
        let power = Arc::new(FakePowerSupply::main());
        let history = Arc::new(MemoryHistory::default());
        let store = Arc::new(MemoryConfigStore::new(config));
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00 UTC)));

        let app = App::start(
            Modem {
                settle_ms: 0,
                recovery_backoff_ms: 5,
                idle_ms: 5,
                ..Default::default()
            },
            Monitor {
                check_interval_ms: 10,
                ..Default::default()
            },
            modem.transport(),
            Collaborators {
                store: store.clone(),
                history: history.clone(),
                sensors: sensors.clone(),
                power: power.clone(),
                clock: clock.clone(),
            },
        )
        .unwrap();

        Self {
            app,
            modem,
            sensors,
            power,
            history,
            store,
            clock,
        }
    }

    pub fn sample_config() -> AlarmConfig {
        let mut config = AlarmConfig {
            location: "Lab 3".to_string(),
            contacts: vec![
                Contact::new(ADMIN, "Ada").with_admin(true),
                Contact::new(USER, "Grace"),
            ],
            ..Default::default()
        };
        config.sensors.insert(
            "28-a".to_string(),
            SensorConfig {
                name: "Freezer".to_string(),
                trigger: 30.0,
            },
        );
        config.sensors.insert(
            "28-b".to_string(),
            SensorConfig {
                name: "Bench".to_string(),
                trigger: 30.0,
            },
        );
        config
    }
}

/// Polls `condition` until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
