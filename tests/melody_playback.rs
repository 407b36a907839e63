use std::sync::Arc;
use std::time::{Duration, Instant};

use cosmophone::audio::RecordingSink;
use cosmophone::melody::player::{MelodyPlayer, PlaybackState};
use cosmophone::melody::{Instrument, NoteEvent, midi_to_hz};

fn note(time_offset: f64, note: u8) -> NoteEvent {
    NoteEvent {
        time_offset,
        note,
        instrument: Instrument::Piano,
        pan: 0.0,
    }
}

#[test]
fn three_notes_play_in_order_then_finish() {
    let sink = Arc::new(RecordingSink::new());
    let player = MelodyPlayer::new(sink.clone(), 0.1, 0.2);
    let t0 = Instant::now();
    player.play(&[note(0.0, 60), note(0.1, 64), note(0.2, 67)]);
    assert_eq!(player.state(), PlaybackState::Playing);
    player.join();
    let elapsed = t0.elapsed();

    let freqs: Vec<f32> = sink.notes().iter().map(|n| n.freq_hz).collect();
    assert_eq!(freqs, vec![midi_to_hz(60), midi_to_hz(64), midi_to_hz(67)]);
    assert_eq!(player.progress(), 100.0);
    assert_eq!(player.state(), PlaybackState::Finished);
    assert!(elapsed >= Duration::from_millis(280), "{elapsed:?}");
}

#[test]
fn second_play_cancels_the_first() {
    let sink = Arc::new(RecordingSink::new());
    let player = MelodyPlayer::new(sink.clone(), 0.1, 0.2);
    player.play(&[note(0.0, 60), note(0.1, 62), note(0.2, 64)]);
    std::thread::sleep(Duration::from_millis(30));
    player.play(&[note(0.0, 72)]);
    player.join();
    std::thread::sleep(Duration::from_millis(300));

    let freqs: Vec<f32> = sink.notes().iter().map(|n| n.freq_hz).collect();
    assert_eq!(freqs, vec![midi_to_hz(60), midi_to_hz(72)]);
    assert_eq!(player.state(), PlaybackState::Finished);
}

