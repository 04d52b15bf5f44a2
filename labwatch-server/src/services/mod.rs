pub mod modem;

mod alert_service;
mod command_service;
mod power_service;
mod sensor_service;
mod supervisor;

pub use alert_service::*;
pub use command_service::*;
pub use power_service::*;
pub use sensor_service::*;
pub use supervisor::*;
