//! Domain model: value objects, entities and the ports the engine depends on.

pub mod account;
pub mod challenge;
pub mod destination;
pub mod fee;
pub mod ports;
pub mod transaction;
