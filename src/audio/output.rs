use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::*;
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info};

use crate::error::ResourceError;

/// Default output device fed from a stereo interleaved ring buffer.
pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    pub config: cpal::StreamConfig,
}

impl AudioOutput {
    /// Open the default device and return the producer the render thread pushes into.
    pub fn new(latency_ms: f32) -> Result<(Self, HeapProd<f32>), ResourceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(ResourceError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| ResourceError::StreamConfig(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels().max(1) as usize;

        let config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let frames = ((sample_rate as f32 * latency_ms.max(1.0) / 1000.0) as usize).max(64);
        let rb = HeapRb::<f32>::new(frames * 2 * 4);
        let (prod, mut cons): (HeapProd<f32>, HeapCons<f32>) = rb.split();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        // Pop whole frames only so L/R never swap on underrun.
                        let (l, r) = if cons.occupied_len() >= 2 {
                            (cons.try_pop().unwrap_or(0.0), cons.try_pop().unwrap_or(0.0))
                        } else {
                            (0.0, 0.0)
                        };
                        write_frame(frame, l, r);
                    }
                },
                |err| error!("output stream error: {err}"),
                None,
            )
            .map_err(|e| ResourceError::BuildStream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| ResourceError::PlayStream(e.to_string()))?;

        info!(
            "audio output: {} Hz, {} channel(s), {} ms latency",
            sample_rate, channels, latency_ms
        );
        Ok((
            Self {
                stream: Some(stream),
                config,
            },
            prod,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn stop(&mut self) {
        self.stream.take();
    }

    /// Push a whole block, waiting for the device to drain when the ring is full.
    /// Gives up early once `exiting` is set.
    pub fn push_samples(prod: &mut HeapProd<f32>, samples: &[f32], exiting: &AtomicBool) {
        let mut offset = 0;
        while offset < samples.len() {
            offset += prod.push_slice(&samples[offset..]);
            if offset < samples.len() {
                if exiting.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(Duration::from_micros(200));
            }
        }
    }
}

/// Map one stereo frame onto the device layout. Mono devices get the average.
fn write_frame(frame: &mut [f32], l: f32, r: f32) {
    match frame.len() {
        1 => frame[0] = 0.5 * (l + r),
        _ => {
            frame[0] = l;
            frame[1] = r;
            for s in frame.iter_mut().skip(2) {
                *s = 0.0;
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!("audio output stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_map_to_device_layout() {
        let mut mono = [0.0f32];
        write_frame(&mut mono, 0.2, 0.4);
        assert!((mono[0] - 0.3).abs() < 1e-6);

        let mut quad = [9.0f32; 4];
        write_frame(&mut quad, 0.1, -0.1);
        assert_eq!(quad, [0.1, -0.1, 0.0, 0.0]);
    }

    #[test]
    fn push_gives_up_when_exiting() {
        let rb = HeapRb::<f32>::new(4);
        let (mut prod, _cons) = rb.split();
        let exiting = AtomicBool::new(true);
        AudioOutput::push_samples(&mut prod, &[0.0; 16], &exiting);
        assert_eq!(prod.occupied_len(), 4);
    }
}
