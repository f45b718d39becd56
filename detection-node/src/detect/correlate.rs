//! Proximity correlation between cigarette and person detections, and the
//! per-camera event rate gate.

use std::time::Instant;

use smokewatch_common::{BBox, Detection};

/// Center-to-center Euclidean distance between two boxes, normalized by the
/// frame diagonal. Symmetric; within [0, sqrt(2)] for in-frame boxes.
pub fn normalized_distance(a: &BBox, b: &BBox, width: u32, height: u32) -> f32 {
    let dx = a.center_x() - b.center_x();
    let dy = a.center_y() - b.center_y();
    let diagonal = ((width as f32).powi(2) + (height as f32).powi(2)).sqrt();
    (dx * dx + dy * dy).sqrt() / diagonal
}

/// Every cigarette detection with at least one person detection closer than
/// `threshold`. The first qualifying person short-circuits the inner scan;
/// no nearest-match selection is performed.
pub fn smoking_candidates<'a>(
    cigarettes: &'a [Detection],
    persons: &[Detection],
    threshold: f32,
    width: u32,
    height: u32,
) -> Vec<&'a Detection> {
    let mut candidates = Vec::new();
    for cigarette in cigarettes {
        for person in persons {
            if normalized_distance(&cigarette.bbox, &person.bbox, width, height) < threshold {
                candidates.push(cigarette);
                break;
            }
        }
    }
    candidates
}

/// The highest confidence among qualifying candidates. This is the value an
/// emitted event carries, independent of which pair qualified first.
pub fn peak_confidence(candidates: &[&Detection]) -> Option<f32> {
    candidates
        .iter()
        .map(|d| d.confidence)
        .fold(None, |best, c| match best {
            Some(b) if b >= c => Some(b),
            _ => Some(c),
        })
}

/// Per-detection flag marking cigarette boxes that participate in a
/// qualifying proximity pair, for annotation coloring. Unlike candidate
/// derivation this covers every drawn detection, including ones below the
/// confidence floor.
pub fn event_flags(
    detections: &[Detection],
    persons: &[Detection],
    is_cigarette: impl Fn(&str) -> bool,
    threshold: f32,
    width: u32,
    height: u32,
) -> Vec<bool> {
    detections
        .iter()
        .map(|d| {
            is_cigarette(&d.class_label)
                && persons.iter().any(|p| {
                    normalized_distance(&d.bbox, &p.bbox, width, height) < threshold
                })
        })
        .collect()
}

/// Per-camera rate limiter: at most one event per `min_interval`. The
/// admission timestamp is monotonically non-decreasing and survives worker
/// restarts.
#[derive(Debug)]
pub struct EventGate {
    min_interval: std::time::Duration,
    last: Option<Instant>,
}

impl EventGate {
    pub fn new(min_interval: std::time::Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// True iff more than `min_interval` has elapsed since the last admitted
    /// event. An admitted call updates the gate; rejected candidates are
    /// dropped, not deferred.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) <= self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
        Detection {
            bbox: BBox::new(x1, y1, x2, y2),
            class_id: if label == "cigarette" { 0 } else { 1 },
            class_label: label.to_string(),
            confidence: conf,
        }
    }

    #[test]
    fn distance_is_symmetric_and_normalized() {
        let a = BBox::new(0.0, 0.0, 20.0, 20.0);
        let b = BBox::new(600.0, 440.0, 640.0, 480.0);
        let d_ab = normalized_distance(&a, &b, 640, 480);
        let d_ba = normalized_distance(&b, &a, 640, 480);
        assert_eq!(d_ab, d_ba);
        assert!(d_ab > 0.0 && d_ab <= std::f32::consts::SQRT_2);

        let same = BBox::new(10.0, 10.0, 30.0, 30.0);
        assert_eq!(normalized_distance(&same, &same, 640, 480), 0.0);
    }

    #[test]
    fn nearby_pair_qualifies() {
        // Cigarette [100,100,140,140] @0.9, person [120,120,300,300] @0.8 in
        // a 640x480 frame: centers (120,120) and (210,210), distance
        // ~0.159 of the diagonal.
        let cigarettes = vec![det("cigarette", 100.0, 100.0, 140.0, 140.0, 0.9)];
        let persons = vec![det("person", 120.0, 120.0, 300.0, 300.0, 0.8)];

        let candidates = smoking_candidates(&cigarettes, &persons, 0.3, 640, 480);
        assert_eq!(candidates.len(), 1);
        assert_eq!(peak_confidence(&candidates), Some(0.9));
    }

    #[test]
    fn tight_threshold_rejects_same_pair() {
        let cigarettes = vec![det("cigarette", 100.0, 100.0, 140.0, 140.0, 0.9)];
        let persons = vec![det("person", 120.0, 120.0, 300.0, 300.0, 0.8)];

        let candidates = smoking_candidates(&cigarettes, &persons, 0.05, 640, 480);
        assert!(candidates.is_empty());
        assert_eq!(peak_confidence(&candidates), None);
    }

    #[test]
    fn empty_side_yields_no_candidates() {
        let cigarettes = vec![det("cigarette", 0.0, 0.0, 20.0, 20.0, 0.9)];
        let persons = vec![det("person", 0.0, 0.0, 20.0, 20.0, 0.9)];

        assert!(smoking_candidates(&cigarettes, &[], 0.5, 640, 480).is_empty());
        assert!(smoking_candidates(&[], &persons, 0.5, 640, 480).is_empty());
    }

    #[test]
    fn peak_confidence_spans_all_candidates() {
        let cigarettes = vec![
            det("cigarette", 100.0, 100.0, 140.0, 140.0, 0.6),
            det("cigarette", 110.0, 110.0, 150.0, 150.0, 0.95),
        ];
        let persons = vec![det("person", 120.0, 120.0, 300.0, 300.0, 0.8)];

        let candidates = smoking_candidates(&cigarettes, &persons, 0.3, 640, 480);
        assert_eq!(candidates.len(), 2);
        assert_eq!(peak_confidence(&candidates), Some(0.95));
    }

    #[test]
    fn event_flags_mark_only_close_cigarettes() {
        let detections = vec![
            det("cigarette", 100.0, 100.0, 140.0, 140.0, 0.3), // below floor, still flagged
            det("cigarette", 500.0, 400.0, 540.0, 440.0, 0.9), // far away
            det("person", 120.0, 120.0, 300.0, 300.0, 0.8),
        ];
        let persons = vec![detections[2].clone()];

        let flags = event_flags(
            &detections,
            &persons,
            |label| label == "cigarette",
            0.3,
            640,
            480,
        );
        assert_eq!(flags, vec![true, false, false]);
    }

    #[test]
    fn gate_enforces_minimum_spacing() {
        let mut gate = EventGate::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(gate.admit(t0));
        assert!(!gate.admit(t0 + Duration::from_millis(50)));
        assert!(!gate.admit(t0 + Duration::from_millis(100)));
        assert!(gate.admit(t0 + Duration::from_millis(101)));
        assert!(!gate.admit(t0 + Duration::from_millis(150)));
    }

    #[test]
    fn gate_admissions_are_at_least_interval_apart() {
        let interval = Duration::from_millis(40);
        let mut gate = EventGate::new(interval);
        let t0 = Instant::now();

        let mut admitted = Vec::new();
        for i in 0..200 {
            let now = t0 + Duration::from_millis(i);
            if gate.admit(now) {
                admitted.push(now);
            }
        }
        for pair in admitted.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= interval);
        }
    }
}
