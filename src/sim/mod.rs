//! Simulation client: body input, snapshots, trail history and the tick loop.

pub mod body;
pub mod controller;
pub mod fetcher;
pub mod snapshot;
pub mod trajectory;
pub mod worker;
