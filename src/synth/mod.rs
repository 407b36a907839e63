//! Synthesis primitives without semantic meaning (Hz, sec).

pub mod instrument;
pub mod util;

/// Errors returned by synth primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthError {
    /// Sample rate is non-finite or not positive.
    InvalidSampleRate,
    /// Note frequency is non-finite or not positive.
    InvalidFrequency,
}
