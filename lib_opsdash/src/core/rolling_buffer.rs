//! # Rolling Point Buffer
//!
//! Bounded chart history fed by realtime `system_update` frames. Points are
//! kept in arrival order (never re-sorted by sample time); once the buffer is
//! full the oldest point is dropped for every new one.

use std::collections::VecDeque;

use serde::Serialize;

use crate::models::system::SystemSnapshot;

/// One sample of the four charted series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    /// Epoch seconds reported by the backend.
    pub timestamp: i64,
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub load: f64,
}

impl From<&SystemSnapshot> for MetricPoint {
    fn from(snapshot: &SystemSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            cpu: snapshot.cpu_usage,
            memory: snapshot.memory.percent,
            disk: snapshot.root_disk_percent(),
            load: snapshot.load_average.load1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollingPointBuffer {
    points: VecDeque<MetricPoint>,
    capacity: usize,
}

impl RollingPointBuffer {
    /// A zero capacity is bumped to one so the latest point is always visible.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `point`, then trims from the front down to capacity.
    pub fn push(&mut self, point: MetricPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }

    /// Copy of the buffer contents, oldest first.
    pub fn to_vec(&self) -> Vec<MetricPoint> {
        self.points.iter().copied().collect()
    }
}
