use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use ringbuf::HeapProd;
use tracing::{debug, info, warn};

use super::mixer::{Mixer, MixerCommand};
use super::output::AudioOutput;
use super::output_guard::{OutputGuard, OutputGuardMode};
use super::writer::WavOutput;
use super::{NoteSink, NoteTrigger, VoiceId, VoiceParams, VoiceSink};
use crate::clock::timebase::Timebase;
use crate::config::AudioConfig;
use crate::error::ResourceError;

const BLOCK_FRAMES: usize = 512;
/// Upper bound on blocks rendered while fading out at shutdown.
const MAX_FADE_BLOCKS: usize = 64;

/// Cheap clonable front end of the render thread.
#[derive(Clone, Debug)]
pub struct MixerHandle {
    tx: Sender<MixerCommand>,
    next_id: Arc<AtomicU64>,
}

impl MixerHandle {
    pub fn new(tx: Sender<MixerCommand>) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn send(&self, cmd: MixerCommand) {
        if self.tx.send(cmd).is_err() {
            debug!("render thread gone; dropped {cmd:?}");
        }
    }
}

impl VoiceSink for MixerHandle {
    fn start_voice(&self, params: VoiceParams) -> VoiceId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(MixerCommand::StartVoice { id, params });
        id
    }

    fn stop_voice(&self, id: VoiceId) {
        self.send(MixerCommand::StopVoice { id });
    }
}

impl NoteSink for MixerHandle {
    fn trigger(&self, note: NoteTrigger) {
        self.send(MixerCommand::Note(note));
    }
}

/// Owns the render thread, the device stream and the optional WAV recorder.
pub struct AudioEngine {
    handle: MixerHandle,
    sample_rate: u32,
    exiting: Arc<AtomicBool>,
    render_thread: Option<JoinHandle<()>>,
    wav_thread: Option<JoinHandle<()>>,
    output: Option<AudioOutput>,
}

impl AudioEngine {
    /// Open the device when `play` is set and start rendering.
    ///
    /// Fails only when neither the device nor a WAV file can receive the mix.
    pub fn start(
        cfg: &AudioConfig,
        play: bool,
        wav_path: Option<PathBuf>,
    ) -> Result<Self, ResourceError> {
        let (output, prod) = if play {
            match AudioOutput::new(cfg.latency_ms) {
                Ok((out, prod)) => (Some(out), Some(prod)),
                Err(e) if wav_path.is_some() => {
                    warn!("{e}; recording without playback");
                    (None, None)
                }
                Err(e) => return Err(e),
            }
        } else {
            (None, None)
        };
        if output.is_none() && wav_path.is_none() {
            return Err(ResourceError::NoOutputDevice);
        }

        let sample_rate = output
            .as_ref()
            .map(AudioOutput::sample_rate)
            .unwrap_or(cfg.sample_rate.max(1));

        let (wav_tx, wav_thread) = match wav_path {
            Some(path) => {
                let (tx, rx) = unbounded::<Arc<[f32]>>();
                let handle = WavOutput::run(rx, path, sample_rate)
                    .map_err(|_| ResourceError::Spawn("wav-writer"))?;
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        let (cmd_tx, cmd_rx) = unbounded();
        let exiting = Arc::new(AtomicBool::new(false));
        let mixer = Mixer::new(sample_rate as f32, cfg.declick_ms);
        let guard = OutputGuard::new(
            OutputGuardMode::from_env_or(&cfg.output_guard),
            sample_rate,
            2,
        );
        let tb = Timebase {
            fs: sample_rate as f32,
            block: BLOCK_FRAMES,
        };
        let exiting_render = exiting.clone();
        let render_thread = thread::Builder::new()
            .name("audio-render".into())
            .spawn(move || render_loop(mixer, guard, cmd_rx, prod, wav_tx, tb, exiting_render))
            .map_err(|_| ResourceError::Spawn("audio-render"))?;

        info!(
            "audio engine started: {} Hz, device={}, guard={:?}",
            sample_rate,
            output.is_some(),
            cfg.output_guard
        );
        Ok(Self {
            handle: MixerHandle::new(cmd_tx),
            sample_rate,
            exiting,
            render_thread: Some(render_thread),
            wav_thread,
            output,
        })
    }

    pub fn handle(&self) -> MixerHandle {
        self.handle.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fade out, stop rendering, close the device and finalize the WAV file.
    pub fn shutdown(&mut self) {
        self.exiting.store(true, Ordering::SeqCst);
        if let Some(h) = self.render_thread.take() {
            let _ = h.join();
        }
        // The render thread owned the last WAV sender, so the writer now drains and finalizes.
        if let Some(h) = self.wav_thread.take() {
            let _ = h.join();
        }
        if let Some(mut out) = self.output.take() {
            out.stop();
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_loop(
    mut mixer: Mixer,
    mut guard: OutputGuard,
    cmd_rx: Receiver<MixerCommand>,
    mut prod: Option<HeapProd<f32>>,
    wav_tx: Option<Sender<Arc<[f32]>>>,
    tb: Timebase,
    exiting: Arc<AtomicBool>,
) {
    let mut buf = vec![0.0f32; tb.block * 2];
    let block_duration = tb.block_duration();
    let mut next_deadline = Instant::now();

    while !exiting.load(Ordering::SeqCst) {
        for cmd in cmd_rx.try_iter() {
            mixer.apply(cmd);
        }
        render_block(&mut mixer, &mut guard, &mut buf, wav_tx.as_ref());

        match prod.as_mut() {
            // The ring applies back-pressure at device rate.
            Some(p) => AudioOutput::push_samples(p, &buf, &exiting),
            None => {
                next_deadline += block_duration;
                let now = Instant::now();
                if next_deadline > now {
                    thread::sleep(next_deadline - now);
                } else {
                    next_deadline = now;
                }
            }
        }
    }

    // Ramp held voices down so neither the device nor the recording ends on a click.
    for cmd in cmd_rx.try_iter() {
        mixer.apply(cmd);
    }
    mixer.apply(MixerCommand::StopAll);
    let mut blocks = 0;
    while mixer.voice_count() > 0 && blocks < MAX_FADE_BLOCKS {
        render_block(&mut mixer, &mut guard, &mut buf, wav_tx.as_ref());
        if let Some(p) = prod.as_mut() {
            AudioOutput::push_samples(p, &buf, &exiting);
        }
        blocks += 1;
    }
    debug!(fade_blocks = blocks, "audio render thread exiting");
}

/// Render, guard and record one block into `buf`.
fn render_block(
    mixer: &mut Mixer,
    guard: &mut OutputGuard,
    buf: &mut [f32],
    wav_tx: Option<&Sender<Arc<[f32]>>>,
) {
    mixer.render(buf);
    guard.process_interleaved(buf);
    let stats = guard.stats();
    if stats.num_over > 0 {
        debug!(
            "output guard engaged: peak in {:.3}, out {:.3}",
            stats.max_abs_in, stats.max_abs_out
        );
    }
    if let Some(tx) = wav_tx {
        let _ = tx.send(Arc::from(&buf[..]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_forwards_commands_in_order() {
        let (tx, rx) = unbounded();
        let handle = MixerHandle::new(tx);
        let p = VoiceParams {
            freq_hz: 330.0,
            pan: -0.5,
            gain: 0.2,
        };
        let a = handle.start_voice(p);
        let b = handle.clone().start_voice(p);
        assert_ne!(a, b);
        handle.stop_voice(a);

        let cmds: Vec<MixerCommand> = rx.try_iter().collect();
        assert_eq!(
            cmds,
            vec![
                MixerCommand::StartVoice { id: a, params: p },
                MixerCommand::StartVoice { id: b, params: p },
                MixerCommand::StopVoice { id: a },
            ]
        );
    }

    #[test]
    fn handle_survives_a_dead_render_thread() {
        let (tx, rx) = unbounded();
        drop(rx);
        let handle = MixerHandle::new(tx);
        handle.stop_voice(3);
    }

    #[test]
    fn records_to_wav_without_a_device() {
        let path = std::env::temp_dir().join(format!("cosmophone-engine-{}.wav", std::process::id()));
        let cfg = AudioConfig {
            sample_rate: 8_000,
            ..AudioConfig::default()
        };
        let mut engine = AudioEngine::start(&cfg, false, Some(path.clone())).unwrap();
        let sink = engine.handle();
        sink.start_voice(VoiceParams {
            freq_hz: 440.0,
            pan: 0.0,
            gain: 0.5,
        });
        std::thread::sleep(std::time::Duration::from_millis(200));
        engine.shutdown();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert!(reader.len() > 0);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        assert!(peak > 1_000);
        // The held voice was faded out, so the file ends in silence.
        assert!(samples.len() > 32);
        assert!(samples[samples.len() - 32..].iter().all(|&s| s == 0));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn nothing_to_render_into_is_an_error() {
        let err = AudioEngine::start(&AudioConfig::default(), false, None).err();
        assert_eq!(err, Some(ResourceError::NoOutputDevice));
    }
}
