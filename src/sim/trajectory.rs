use std::collections::VecDeque;

use crate::sim::snapshot::Snapshot;

pub const DEFAULT_TRAIL_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    pub x: f64,
    pub y: f64,
}

/// Recent positions of every body, oldest first.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    capacity: usize,
    trails: Vec<VecDeque<TrailPoint>>,
}

impl TrajectoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            trails: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all history and prepare one empty trail per body.
    pub fn reset(&mut self, body_count: usize) {
        let capacity = self.capacity;
        self.trails.clear();
        self.trails
            .resize_with(body_count, || VecDeque::with_capacity(capacity));
    }

    pub fn clear(&mut self) {
        self.trails.clear();
    }

    pub fn append(&mut self, snapshot: &Snapshot) {
        debug_assert_eq!(self.trails.len(), snapshot.len());
        if self.trails.len() < snapshot.len() {
            let capacity = self.capacity;
            self.trails
                .resize_with(snapshot.len(), || VecDeque::with_capacity(capacity));
        }
        for (trail, body) in self.trails.iter_mut().zip(snapshot.iter()) {
            if trail.len() == self.capacity {
                trail.pop_front();
            }
            trail.push_back(TrailPoint { x: body.x, y: body.y });
        }
    }

    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    pub fn trail(&self, index: usize) -> Option<&VecDeque<TrailPoint>> {
        self.trails.get(index)
    }

    pub fn trails(&self) -> impl Iterator<Item = &VecDeque<TrailPoint>> {
        self.trails.iter()
    }
}

impl Default for TrajectoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TRAIL_CAPACITY)
    }
}
