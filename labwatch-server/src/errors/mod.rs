pub mod app;
pub mod modem;
pub mod power;
pub mod sensor;
pub mod store;

pub use app::AppError;
pub use modem::ModemError;
pub use power::PowerError;
pub use sensor::SensorError;
pub use store::StoreError;
