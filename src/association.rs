// src/association.rs
//
// Nearest-neighbour pairing between two labelled subsets of the current
// tracked-object set (riders ↔ motorbikes).
//
// Design:
//   - Each subject independently takes its closest candidate (argmin of
//     center distance, first index wins on exact ties)
//   - The pair is kept only when that distance is strictly below the gate
//   - Candidates are NOT exclusive: two riders may claim the same motorbike
//
// Must stay greedy: an optimal assignment pairs different ids and so fires
// different events.

use crate::geometry::center_of;
use crate::types::{ObjectLabel, TrackedObject};

/// Pair every subject with its nearest candidate closer than `max_distance`.
pub fn associate_nearest<'a>(
    subjects: &[&'a TrackedObject],
    candidates: &[&'a TrackedObject],
    max_distance: f32,
) -> Vec<(&'a TrackedObject, &'a TrackedObject)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut pairs = Vec::new();

    for &subject in subjects {
        let (sx, sy) = center_of(&subject.bbox);

        let mut best: Option<(usize, f32)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            let (cx, cy) = center_of(&candidate.bbox);
            let dist = (cx - sx).hypot(cy - sy);
            if dist.is_nan() {
                continue;
            }
            // Strict `<` keeps the first index on ties
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }

        if let Some((idx, dist)) = best {
            if dist < max_distance {
                pairs.push((subject, candidates[idx]));
            }
        }
    }

    pairs
}

/// Split `tracks` by label and associate the two groups.
pub fn pair_by_label(
    tracks: &[TrackedObject],
    subject_label: ObjectLabel,
    candidate_label: ObjectLabel,
    max_distance: f32,
) -> Vec<(&TrackedObject, &TrackedObject)> {
    let subjects: Vec<&TrackedObject> = tracks.iter().filter(|t| t.label == subject_label).collect();
    let candidates: Vec<&TrackedObject> =
        tracks.iter().filter(|t| t.label == candidate_label).collect();
    associate_nearest(&subjects, &candidates, max_distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(id: u64, label: ObjectLabel, cx: f32, cy: f32) -> TrackedObject {
        TrackedObject::new(id, label, [cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0])
    }

    #[test]
    fn test_pairs_nearest_within_gate() {
        let rider = obj(1, ObjectLabel::Person, 100.0, 100.0);
        let near = obj(10, ObjectLabel::Motorbike, 130.0, 100.0);
        let far = obj(11, ObjectLabel::Motorbike, 400.0, 100.0);

        let pairs = associate_nearest(&[&rider], &[&far, &near], 140.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.id, 1);
        assert_eq!(pairs[0].1.id, 10);
    }

    #[test]
    fn test_gate_is_strict() {
        let rider = obj(1, ObjectLabel::Person, 0.0, 0.0);
        let moto = obj(10, ObjectLabel::Motorbike, 140.0, 0.0);

        assert!(associate_nearest(&[&rider], &[&moto], 140.0).is_empty());
        assert_eq!(associate_nearest(&[&rider], &[&moto], 140.5).len(), 1);
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let rider = obj(1, ObjectLabel::Person, 100.0, 100.0);
        let left = obj(10, ObjectLabel::Motorbike, 50.0, 100.0);
        let right = obj(11, ObjectLabel::Motorbike, 150.0, 100.0);

        let pairs = associate_nearest(&[&rider], &[&left, &right], 140.0);
        assert_eq!(pairs[0].1.id, 10);

        let pairs = associate_nearest(&[&rider], &[&right, &left], 140.0);
        assert_eq!(pairs[0].1.id, 11);
    }

    #[test]
    fn test_candidate_can_be_claimed_twice() {
        let a = obj(1, ObjectLabel::Person, 100.0, 100.0);
        let b = obj(2, ObjectLabel::Person, 110.0, 100.0);
        let moto = obj(10, ObjectLabel::Motorbike, 105.0, 120.0);

        let pairs = associate_nearest(&[&a, &b], &[&moto], 140.0);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(_, m)| m.id == 10));
    }

    #[test]
    fn test_no_candidates() {
        let rider = obj(1, ObjectLabel::Person, 100.0, 100.0);
        assert!(associate_nearest(&[&rider], &[], 140.0).is_empty());
    }

    #[test]
    fn test_pair_by_label_filters_classes() {
        let tracks = vec![
            obj(1, ObjectLabel::Person, 100.0, 100.0),
            obj(2, ObjectLabel::Car, 101.0, 100.0),
            obj(3, ObjectLabel::Motorbike, 120.0, 100.0),
        ];
        let pairs = pair_by_label(&tracks, ObjectLabel::Person, ObjectLabel::Motorbike, 140.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0.id, pairs[0].1.id), (1, 3));
    }
}
