mod alarm;
mod contact;
mod message;
mod sensor;
mod status;

pub use alarm::*;
pub use contact::*;
pub use message::*;
pub use sensor::*;
pub use status::*;
