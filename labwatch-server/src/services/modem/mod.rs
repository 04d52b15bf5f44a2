mod client;
mod codec;
mod transport;

pub use client::*;
pub use codec::*;
pub use transport::*;
