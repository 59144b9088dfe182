// sensora-api: wire protocol layer for the Sensora realtime dashboard client

pub mod ack;
pub mod duration;
pub mod error;
pub mod frame;
pub mod socket;

pub use error::Error;
