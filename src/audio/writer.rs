use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{error, info};

/// Records the guarded stereo mix to a 16-bit WAV file on its own thread.
pub struct WavOutput;

impl WavOutput {
    /// The thread finalizes the file once every sender of `rx` is dropped.
    pub fn run(
        rx: Receiver<Arc<[f32]>>,
        path: PathBuf,
        sample_rate: u32,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("wav-writer".into())
            .spawn(move || {
                let spec = WavSpec {
                    channels: 2,
                    sample_rate,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                };
                let mut writer = match WavWriter::create(&path, spec) {
                    Ok(w) => w,
                    Err(e) => {
                        error!("cannot create {}: {e}", path.display());
                        // Keep draining so the render thread never blocks on us.
                        while rx.recv().is_ok() {}
                        return;
                    }
                };
                info!("recording to {}", path.display());

                let mut frames: u64 = 0;
                'recv: while let Ok(samples) = rx.recv() {
                    for &s in samples.iter() {
                        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        if let Err(e) = writer.write_sample(v) {
                            error!("wav write failed: {e}");
                            break 'recv;
                        }
                    }
                    frames += samples.len() as u64 / 2;
                }

                match writer.finalize() {
                    Ok(()) => info!("wrote {frames} frames to {}", path.display()),
                    Err(e) => error!("wav finalize failed: {e}"),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_stereo_file() {
        let path = std::env::temp_dir().join(format!("cosmophone-writer-{}.wav", std::process::id()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = WavOutput::run(rx, path.clone(), 8_000).unwrap();
        let block: Arc<[f32]> = vec![0.5f32, -0.5, 0.25, -0.25].into();
        tx.send(block.clone()).unwrap();
        tx.send(block).unwrap();
        drop(tx);
        handle.join().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.len(), 8);
        let _ = std::fs::remove_file(&path);
    }
}
