//! Clocks shared by the simulation loop, the mixer and the melody player.

pub mod timebase;
pub mod timer;
