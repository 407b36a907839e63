use std::time::Duration;

use tracing::warn;

use super::NoteEvent;

/// Seconds between undated events when the configured spacing is unusable.
pub const DEFAULT_SPACING: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineAction {
    /// Play `event` and move the indicator to `progress` percent.
    Note {
        index: usize,
        event: NoteEvent,
        progress: f32,
    },
    /// End of the melody; the indicator reaches 100 %.
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAction {
    pub at: Duration,
    pub action: TimelineAction,
}

/// Ordered schedule of a melody relative to its start time.
#[derive(Debug, Clone)]
pub struct MelodyTimeline {
    actions: Vec<ScheduledAction>,
    total: Duration,
    cursor: usize,
}

impl MelodyTimeline {
    /// Build the schedule. The melody lasts `events.len() * spacing` seconds;
    /// events later than that cannot sound and are dropped.
    pub fn new(events: &[NoteEvent], spacing: f64) -> Self {
        let count = events.len();
        let requested = if spacing.is_finite() && spacing > 0.0 {
            spacing
        } else {
            DEFAULT_SPACING
        };
        let (spacing, total) = match Duration::try_from_secs_f64(count as f64 * requested) {
            Ok(total) => (requested, total),
            Err(e) => {
                warn!(spacing = requested, "melody length out of range ({e}); using default spacing");
                let total = Duration::try_from_secs_f64(count as f64 * DEFAULT_SPACING)
                    .unwrap_or(Duration::MAX);
                (DEFAULT_SPACING, total)
            }
        };
        let total_sec = count as f64 * spacing;

        let mut notes: Vec<(usize, Duration, NoteEvent)> = Vec::with_capacity(count);
        for (index, event) in events.iter().enumerate() {
            let t = event.time_offset;
            if !t.is_finite() || t < 0.0 {
                warn!(index, offset = t, "dropping note with invalid offset");
                continue;
            }
            if t > total_sec {
                warn!(index, offset = t, total_sec, "dropping note past melody end");
                continue;
            }
            let Ok(at) = Duration::try_from_secs_f64(t) else {
                warn!(index, offset = t, "dropping note with unrepresentable offset");
                continue;
            };
            notes.push((index, at, *event));
        }
        // Stable: simultaneous events keep their input order.
        notes.sort_by_key(|&(_, at, _)| at);

        // Progress counts kept notes in firing order.
        let kept = notes.len();
        let mut actions: Vec<ScheduledAction> = notes
            .into_iter()
            .enumerate()
            .map(|(pos, (index, at, event))| ScheduledAction {
                at,
                action: TimelineAction::Note {
                    index,
                    event,
                    progress: pos as f32 / kept as f32 * 100.0,
                },
            })
            .collect();
        actions.push(ScheduledAction {
            at: total,
            action: TimelineAction::Finish,
        });

        Self {
            actions,
            total,
            cursor: 0,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn actions(&self) -> &[ScheduledAction] {
        &self.actions
    }

    pub fn note_count(&self) -> usize {
        self.actions.len().saturating_sub(1)
    }

    pub fn next_at(&self) -> Option<Duration> {
        self.actions.get(self.cursor).map(|a| a.at)
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.actions.len()
    }

    /// Take every action scheduled at or before `elapsed`, in order.
    pub fn due(&mut self, elapsed: Duration) -> Vec<TimelineAction> {
        let mut out = Vec::new();
        while let Some(next) = self.actions.get(self.cursor) {
            if next.at > elapsed {
                break;
            }
            out.push(next.action.clone());
            self.cursor += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melody::Instrument;

    fn ev(t: f64, note: u8) -> NoteEvent {
        NoteEvent {
            time_offset: t,
            note,
            instrument: Instrument::Piano,
            pan: 0.0,
        }
    }

    fn notes_of(actions: &[TimelineAction]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|a| match a {
                TimelineAction::Note { event, .. } => Some(event.note),
                TimelineAction::Finish => None,
            })
            .collect()
    }

    #[test]
    fn three_events_finish_at_total_duration() {
        let mut tl = MelodyTimeline::new(&[ev(0.0, 60), ev(0.1, 62), ev(0.2, 64)], 0.1);
        assert_eq!(tl.note_count(), 3);
        assert!((tl.total_duration().as_secs_f64() - 0.3).abs() < 1e-9);

        let first = tl.due(Duration::ZERO);
        assert_eq!(notes_of(&first), vec![60]);
        let mid = tl.due(Duration::from_millis(250));
        assert_eq!(notes_of(&mid), vec![62, 64]);
        assert!(!mid.contains(&TimelineAction::Finish));
        assert!(!tl.is_done());

        let last = tl.due(Duration::from_millis(300));
        assert_eq!(last, vec![TimelineAction::Finish]);
        assert!(tl.is_done());
        assert!(tl.due(Duration::from_secs(10)).is_empty());
    }

    fn progress_of(tl: &MelodyTimeline) -> Vec<f32> {
        tl.actions()
            .iter()
            .filter_map(|a| match a.action {
                TimelineAction::Note { progress, .. } => Some(progress),
                TimelineAction::Finish => None,
            })
            .collect()
    }

    #[test]
    fn progress_follows_event_index() {
        let tl = MelodyTimeline::new(&[ev(0.0, 60), ev(0.1, 62), ev(0.2, 64), ev(0.3, 65)], 0.1);
        assert_eq!(progress_of(&tl), vec![0.0, 25.0, 50.0, 75.0]);
    }

    #[test]
    fn progress_never_moves_backwards_for_unsorted_input() {
        let tl = MelodyTimeline::new(&[ev(0.3, 1), ev(0.0, 2), ev(0.2, 3), ev(0.1, 4)], 0.1);
        assert_eq!(progress_of(&tl), vec![0.0, 25.0, 50.0, 75.0]);
        let firing: Vec<usize> = tl
            .actions()
            .iter()
            .filter_map(|a| match a.action {
                TimelineAction::Note { index, .. } => Some(index),
                TimelineAction::Finish => None,
            })
            .collect();
        assert_eq!(firing, vec![1, 3, 2, 0]);
    }

    #[test]
    fn progress_counts_only_kept_notes() {
        let tl = MelodyTimeline::new(&[ev(0.0, 60), ev(f64::NAN, 61), ev(0.1, 62), ev(9.0, 63)], 0.1);
        assert_eq!(progress_of(&tl), vec![0.0, 50.0]);
    }

    #[test]
    fn huge_spacing_falls_back_instead_of_overflowing() {
        let tl = MelodyTimeline::new(&[ev(0.0, 60), ev(0.1, 62)], 1e300);
        assert_eq!(tl.note_count(), 2);
        assert_eq!(tl.total_duration(), Duration::from_secs_f64(2.0 * DEFAULT_SPACING));
    }

    #[test]
    fn out_of_order_input_fires_sorted_and_stable() {
        let mut tl = MelodyTimeline::new(&[ev(0.2, 1), ev(0.0, 2), ev(0.1, 3), ev(0.1, 4)], 0.1);
        let all = tl.due(Duration::from_secs(1));
        assert_eq!(notes_of(&all), vec![2, 3, 4, 1]);
        assert_eq!(all.last(), Some(&TimelineAction::Finish));
    }

    #[test]
    fn events_past_the_end_are_dropped() {
        let tl = MelodyTimeline::new(&[ev(0.0, 60), ev(5.0, 61)], 0.1);
        assert_eq!(tl.note_count(), 1);
        let tl = MelodyTimeline::new(&[ev(f64::NAN, 60)], 0.1);
        assert_eq!(tl.note_count(), 0);
    }

    #[test]
    fn empty_melody_only_finishes() {
        let mut tl = MelodyTimeline::new(&[], 0.1);
        assert_eq!(tl.total_duration(), Duration::ZERO);
        assert_eq!(tl.due(Duration::ZERO), vec![TimelineAction::Finish]);
    }
}
