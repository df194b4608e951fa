//! Centroid-distance tracker that turns anonymous per-frame boxes into stable
//! track identities with short trajectories.
//!
//! Matching is greedy in detection order: each box joins the nearest live
//! track whose last center lies strictly inside the association radius, ties
//! going to the lowest track id. There is no randomness, so the same input
//! sequence always yields the same ids.

use crate::types::{BoundingBox, DetectionRecord, Point};
use std::collections::{BTreeMap, VecDeque};

/// Number of trailing history points used for the velocity estimate.
const VELOCITY_WINDOW: usize = 3;

/// Configuration for the ObjectTracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Max center-to-center distance for a match (exclusive).
    pub association_radius: f64,
    /// Centers kept per track, oldest evicted first.
    pub max_history: usize,
    /// Consecutive unmatched frames a track survives. 0 deletes a track on
    /// the first frame it is not seen.
    pub max_missed_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            association_radius: 50.0,
            max_history: 10,
            max_missed_frames: 0,
        }
    }
}

/// One tracked identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub track_id: u64,
    /// Box from the most recent frame this track was matched.
    pub current_box: BoundingBox,
    history: VecDeque<Point>,
    missed_frames: u32,
}

impl TrackedObject {
    fn new(track_id: u64, bbox: BoundingBox, max_history: usize) -> Self {
        let mut history = VecDeque::with_capacity(max_history.max(1));
        history.push_back(bbox.center());
        Self {
            track_id,
            current_box: bbox,
            history,
            missed_frames: 0,
        }
    }

    fn observe(&mut self, bbox: BoundingBox, max_history: usize) {
        self.current_box = bbox;
        self.history.push_back(bbox.center());
        while self.history.len() > max_history.max(1) {
            self.history.pop_front();
        }
    }

    /// Recent centers, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Point> + '_ {
        self.history.iter()
    }

    pub fn last_center(&self) -> Point {
        self.history
            .back()
            .copied()
            .unwrap_or_else(|| self.current_box.center())
    }

    /// Frames since this track was last matched.
    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }

    /// Mean per-frame displacement over the last three centers.
    ///
    /// Plain finite difference, no smoothing. Fewer than two centers gives
    /// `(0.0, 0.0)`.
    pub fn velocity(&self) -> (f64, f64) {
        let n = self.history.len();
        if n < 2 {
            return (0.0, 0.0);
        }
        let window = n.min(VELOCITY_WINDOW);
        let first = self.history[n - window];
        let last = self.history[n - 1];
        let steps = (window - 1) as f64;
        (
            (last.x as f64 - first.x as f64) / steps,
            (last.y as f64 - first.y as f64) / steps,
        )
    }
}

/// Assigns persistent ids to boxes across frames.
///
/// Reset it whenever the sensor's algorithm changes; boxes from different
/// algorithms do not describe the same things.
#[derive(Debug, Clone)]
pub struct ObjectTracker {
    config: TrackerConfig,
    tracks: BTreeMap<u64, TrackedObject>,
    next_track_id: u64,
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ObjectTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_track_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Feed one frame of boxes and return the id -> box mapping for every
    /// track matched or created in this frame.
    ///
    /// Tracks left unmatched age by one frame and are deleted once they exceed
    /// `max_missed_frames`. An empty frame just ages every track.
    pub fn update(&mut self, detections: &[BoundingBox]) -> BTreeMap<u64, BoundingBox> {
        let mut current = BTreeMap::new();

        for &bbox in detections {
            let center = bbox.center();
            let track_id = match self.nearest_track(center) {
                Some(id) => {
                    if let Some(track) = self.tracks.get_mut(&id) {
                        track.observe(bbox, self.config.max_history);
                    }
                    id
                }
                None => {
                    let id = self.next_track_id;
                    self.next_track_id += 1;
                    self.tracks
                        .insert(id, TrackedObject::new(id, bbox, self.config.max_history));
                    log::trace!("New track {} at ({}, {})", id, center.x, center.y);
                    id
                }
            };
            current.insert(track_id, bbox);
        }

        let max_missed = self.config.max_missed_frames;
        self.tracks.retain(|id, track| {
            if current.contains_key(id) {
                track.missed_frames = 0;
                return true;
            }
            track.missed_frames += 1;
            let keep = track.missed_frames <= max_missed;
            if !keep {
                log::trace!("Track {} lost", id);
            }
            keep
        });

        current
    }

    /// Same as `update`, taking the boxes from decoded records.
    pub fn update_records(&mut self, records: &[DetectionRecord]) -> BTreeMap<u64, BoundingBox> {
        let boxes: Vec<BoundingBox> = records.iter().map(DetectionRecord::bbox).collect();
        self.update(&boxes)
    }

    fn nearest_track(&self, center: Point) -> Option<u64> {
        let mut best: Option<(u64, f64)> = None;
        // BTreeMap iterates in ascending id order, so strict `<` keeps the
        // lowest id on ties.
        for (&id, track) in &self.tracks {
            let distance = track.last_center().distance(&center);
            if distance >= self.config.association_radius {
                continue;
            }
            match best {
                Some((_, d)) if d <= distance => {}
                _ => best = Some((id, distance)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Recent centers of `track_id`, oldest first. Unknown ids give an empty list.
    pub fn trajectory(&self, track_id: u64) -> Vec<Point> {
        self.tracks
            .get(&track_id)
            .map(|t| t.history().copied().collect())
            .unwrap_or_default()
    }

    /// Per-frame velocity of `track_id`; `(0.0, 0.0)` for unknown ids.
    pub fn velocity(&self, track_id: u64) -> (f64, f64) {
        self.tracks
            .get(&track_id)
            .map(TrackedObject::velocity)
            .unwrap_or((0.0, 0.0))
    }

    pub fn get(&self, track_id: u64) -> Option<&TrackedObject> {
        self.tracks.get(&track_id)
    }

    /// Live tracks in ascending id order, including ones coasting through a miss.
    pub fn tracks(&self) -> impl Iterator<Item = &TrackedObject> + '_ {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop every track and restart ids at 1.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_track_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectionKind;

    fn point_box(x: u32, y: u32) -> BoundingBox {
        BoundingBox::new(x, y, 0, 0)
    }

    #[test]
    fn test_small_move_keeps_id() {
        let mut tracker = ObjectTracker::default();
        let first = tracker.update(&[point_box(0, 0)]);
        assert_eq!(first.keys().copied().collect::<Vec<_>>(), vec![1]);

        let second = tracker.update(&[point_box(49, 0)]);
        assert_eq!(second.get(&1), Some(&point_box(49, 0)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_large_move_spawns_new_id() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0)]);
        let frame = tracker.update(&[point_box(51, 0)]);
        assert_eq!(frame.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert!(tracker.get(1).is_none());
    }

    #[test]
    fn test_radius_is_exclusive() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0)]);
        let frame = tracker.update(&[point_box(30, 40)]);
        assert!(frame.contains_key(&2));
    }

    #[test]
    fn test_unmatched_track_is_evicted_next_update() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0), point_box(200, 200)]);
        assert_eq!(tracker.len(), 2);

        let frame = tracker.update(&[point_box(5, 5)]);
        assert_eq!(frame.len(), 1);
        assert!(frame.contains_key(&1));
        assert!(tracker.get(2).is_none());
        assert!(tracker.trajectory(2).is_empty());
    }

    #[test]
    fn test_empty_frame_ages_out_everything() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0), point_box(300, 0)]);
        assert!(tracker.update(&[]).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0)]);
        tracker.update(&[]);
        let frame = tracker.update(&[point_box(0, 0)]);
        assert!(frame.contains_key(&2));
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0), point_box(60, 0)]);
        let frame = tracker.update(&[point_box(30, 0)]);
        assert_eq!(frame.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_nearest_track_wins() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0), point_box(60, 0)]);
        let frame = tracker.update(&[point_box(40, 0), point_box(0, 10)]);
        assert_eq!(frame.get(&2), Some(&point_box(40, 0)));
        assert_eq!(frame.get(&1), Some(&point_box(0, 10)));
    }

    #[test]
    fn test_close_detections_in_one_frame_share_a_track() {
        let mut tracker = ObjectTracker::default();
        let frame = tracker.update(&[point_box(0, 0), point_box(20, 0)]);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get(&1), Some(&point_box(20, 0)));
        assert_eq!(tracker.trajectory(1), vec![Point::new(0, 0), Point::new(20, 0)]);
    }

    #[test]
    fn test_determinism() {
        let frames: Vec<Vec<BoundingBox>> = vec![
            vec![point_box(0, 0), point_box(100, 100), point_box(300, 10)],
            vec![point_box(10, 5), point_box(290, 15)],
            vec![point_box(20, 10), point_box(100, 100), point_box(280, 20)],
            vec![],
            vec![point_box(25, 12)],
        ];
        let run = || {
            let mut tracker = ObjectTracker::default();
            frames.iter().map(|f| tracker.update(f)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = ObjectTracker::default();
        for i in 0..15 {
            tracker.update(&[point_box(i * 10, 0)]);
        }
        let trajectory = tracker.trajectory(1);
        assert_eq!(trajectory.len(), 10);
        let expected: Vec<Point> = (5..15).map(|i| Point::new(i * 10, 0)).collect();
        assert_eq!(trajectory, expected);
    }

    #[test]
    fn test_velocity_over_three_points() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(0, 0)]);
        assert_eq!(tracker.velocity(1), (0.0, 0.0));
        tracker.update(&[point_box(10, 0)]);
        tracker.update(&[point_box(20, 0)]);
        assert_eq!(tracker.velocity(1), (10.0, 0.0));
    }

    #[test]
    fn test_velocity_uses_last_window_only() {
        let mut tracker = ObjectTracker::default();
        for x in [0, 40, 45, 55] {
            tracker.update(&[point_box(x, 0)]);
        }
        // window is (40,0), (45,0), (55,0)
        assert_eq!(tracker.velocity(1), (7.5, 0.0));
        assert_eq!(tracker.velocity(99), (0.0, 0.0));
    }

    #[test]
    fn test_velocity_two_points() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[point_box(10, 30)]);
        tracker.update(&[point_box(4, 42)]);
        assert_eq!(tracker.velocity(1), (-6.0, 12.0));
    }

    #[test]
    fn test_centers_use_box_geometry() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[BoundingBox::new(10, 20, 30, 40)]);
        assert_eq!(tracker.trajectory(1), vec![Point::new(25, 40)]);
    }

    #[test]
    fn test_grace_period_keeps_track_alive() {
        let mut tracker = ObjectTracker::new(TrackerConfig {
            max_missed_frames: 2,
            ..TrackerConfig::default()
        });
        tracker.update(&[point_box(0, 0)]);
        assert!(tracker.update(&[]).is_empty());
        assert_eq!(tracker.get(1).map(TrackedObject::missed_frames), Some(1));

        let frame = tracker.update(&[point_box(10, 0)]);
        assert!(frame.contains_key(&1));
        assert_eq!(tracker.get(1).map(TrackedObject::missed_frames), Some(0));

        tracker.update(&[]);
        tracker.update(&[]);
        assert_eq!(tracker.len(), 1);
        tracker.update(&[]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_boxes_at_coordinate_limits() {
        let far = BoundingBox::new(u32::MAX, 0, 4, 0);
        let mut tracker = ObjectTracker::default();
        let frame = tracker.update(&[far, point_box(0, 0)]);
        assert_eq!(frame.len(), 2);
        assert_eq!(tracker.trajectory(1), vec![Point::new(u32::MAX as i64 + 2, 0)]);

        let frame = tracker.update(&[BoundingBox::new(u32::MAX - 10, 0, 4, 0)]);
        assert!(frame.contains_key(&1));
        assert_eq!(tracker.velocity(1), (-10.0, 0.0));
    }

    #[test]
    fn test_update_records_and_reset() {
        let records = [
            DetectionRecord::new(DetectionKind::Face, 10, 20, 30, 40),
            DetectionRecord::new(DetectionKind::Face, 100, 50, 20, 20).with_identity(2),
        ];
        let mut tracker = ObjectTracker::default();
        let frame = tracker.update_records(&records);
        assert_eq!(frame.get(&1), Some(&records[0].bbox()));
        assert_eq!(frame.get(&2), Some(&records[1].bbox()));

        tracker.reset();
        assert!(tracker.is_empty());
        let frame = tracker.update_records(&records[..1]);
        assert!(frame.contains_key(&1));
    }
}
