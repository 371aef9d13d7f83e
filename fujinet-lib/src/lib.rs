pub mod adapter;
pub mod bus;
pub mod checksum;
pub mod config;
pub mod constants;
pub mod device;
pub mod engine;
pub mod error;
pub mod fields;
pub mod legacy;
pub mod packet;
pub mod scripted;
pub mod slip;
pub mod transport;


// Re-export the main entry points for easy access
pub use device::FujiNet;
pub use engine::{Completion, Engine, Generation, Payload, Request};
pub use error::FujiError;
pub use transport::{SerialTransport, Transport};
