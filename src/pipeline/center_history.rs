// src/pipeline/center_history.rs
//
// Previous-frame centroids per track id.
//
// `previous_center` is only ever the centroid from the immediately
// preceding processed frame. An id missing from that frame starts over
// with `None`, so a crossing cannot be inferred across a gap.
//
// `last_seen` outlives the centroid map and drives the eviction sweep.

use crate::types::{Point, TrackId, TrackObservation, TrackedObject};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CenterHistory {
    previous: HashMap<TrackId, Point>,
    last_seen: HashMap<TrackId, u64>,
}

impl CenterHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn raw observations into tracked objects carrying their previous
    /// center, then remember this frame's centers.
    ///
    /// Duplicate ids within one frame: the last observation wins for the
    /// stored center; every observation is still passed through.
    pub fn annotate(&mut self, frame_index: u64, observations: Vec<TrackObservation>) -> Vec<TrackedObject> {
        let mut current = HashMap::with_capacity(observations.len());

        let tracked = observations
            .into_iter()
            .map(|obs| {
                let mut object = TrackedObject::new(obs.id, obs.label, obs.bbox);
                object.previous_center = self.previous.get(&obs.id).copied();
                current.insert(obs.id, object.center());
                self.last_seen.insert(obs.id, frame_index);
                object
            })
            .collect();

        self.previous = current;
        tracked
    }

    /// Remove ids unseen for more than `max_age` frames as of `frame_index`.
    /// Returns the removed ids, sorted.
    pub fn evict_stale(&mut self, frame_index: u64, max_age: u64) -> Vec<TrackId> {
        let mut stale: Vec<TrackId> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| frame_index.saturating_sub(**seen) > max_age)
            .map(|(&id, _)| id)
            .collect();
        stale.sort_unstable();

        for id in &stale {
            self.last_seen.remove(id);
            self.previous.remove(id);
        }
        stale
    }

    pub fn known_ids(&self) -> usize {
        self.last_seen.len()
    }

    pub fn clear(&mut self) {
        self.previous.clear();
        self.last_seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectLabel;

    fn obs(id: TrackId, x: f32) -> TrackObservation {
        TrackObservation {
            id,
            label: ObjectLabel::Car,
            bbox: [x, 0.0, x + 10.0, 10.0],
        }
    }

    #[test]
    fn test_first_appearance_has_no_previous() {
        let mut history = CenterHistory::new();
        let tracked = history.annotate(0, vec![obs(1, 0.0)]);
        assert_eq!(tracked[0].previous_center, None);
    }

    #[test]
    fn test_previous_center_from_last_frame() {
        let mut history = CenterHistory::new();
        history.annotate(0, vec![obs(1, 0.0)]);
        let tracked = history.annotate(1, vec![obs(1, 20.0)]);
        assert_eq!(tracked[0].previous_center, Some((5.0, 5.0)));
        assert_eq!(tracked[0].center(), (25.0, 5.0));
    }

    #[test]
    fn test_gap_resets_previous_center() {
        let mut history = CenterHistory::new();
        history.annotate(0, vec![obs(1, 0.0)]);
        history.annotate(1, vec![obs(2, 50.0)]);
        let tracked = history.annotate(2, vec![obs(1, 20.0)]);
        assert_eq!(tracked[0].previous_center, None);
    }

    #[test]
    fn test_evict_stale_ids() {
        let mut history = CenterHistory::new();
        history.annotate(0, vec![obs(1, 0.0), obs(2, 0.0)]);
        for frame in 1..=3 {
            history.annotate(frame, vec![obs(2, 0.0)]);
        }

        // id 1 last seen at 0: age 3 is not more than 3
        assert!(history.evict_stale(3, 3).is_empty());
        history.annotate(4, vec![obs(2, 0.0)]);
        assert_eq!(history.evict_stale(4, 3), vec![1]);
        assert_eq!(history.known_ids(), 1);
    }
}
