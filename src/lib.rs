//! cosmophone: a client that plays an N-body simulation as sound and picture,
//! and replays image melodies from a sonification service.

pub mod app;
pub mod audio;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod melody;
pub mod remote;
pub mod render;
pub mod sim;
pub mod synth;
pub mod ui;
