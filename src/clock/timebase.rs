use std::time::Duration;

/// Audio clock: sample rate and render block size.
#[derive(Clone, Copy, Debug)]
pub struct Timebase {
    pub fs: f32,
    /// Frames rendered per audio block.
    pub block: usize,
}

impl Timebase {
    /// Wall time covered by one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block as f64 / self.fs.max(1.0) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_duration_matches_rate() {
        let tb = Timebase {
            fs: 48_000.0,
            block: 480,
        };
        assert_eq!(tb.block_duration().as_micros(), 10_000);
    }

    #[test]
    fn zero_rate_is_clamped() {
        let tb = Timebase { fs: 0.0, block: 2 };
        assert_eq!(tb.block_duration(), Duration::from_secs(2));
    }
}
