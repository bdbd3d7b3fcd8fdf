//! Persistent object identities over a stream of transient detections.
//!
//! The parser re-reports the same bounding box on every rescan and the model
//! re-describes the same object across turns; [`IdentityTracker`] reconciles
//! each incoming [`Detection`] onto the live set so downstream consumers see
//! one stable identity per physical object.
//!
//! Matching is greedy nearest-neighbor within same-label candidates, applied
//! in parser emission order.  An object already refreshed by an earlier
//! detection in the batch remains a valid target for a later one — there is
//! no exclusivity constraint and no global assignment.  Under multiple
//! simultaneously-moving same-label objects this can cross identities; that
//! is accepted behavior, traded for per-detection latency.

use std::time::{Duration, Instant};

use crate::parse::Detection;

// ---------------------------------------------------------------------------
// TrackedObject
// ---------------------------------------------------------------------------

/// A detection reconciled into a persistent identity.
///
/// `id` is stable across updates matching the same physical object and is
/// never reused after the object is pruned.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub id: u64,
    pub label: String,
    pub ymin: u32,
    pub xmin: u32,
    pub ymax: u32,
    pub xmax: u32,
    /// Timestamp of the most recent detection matched onto this object.
    pub last_updated: Instant,
}

impl TrackedObject {
    /// Box center `(x, y)` in the `[0, 1000]` coordinate space.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) as f64 / 2.0,
            (self.ymin + self.ymax) as f64 / 2.0,
        )
    }
}

// ---------------------------------------------------------------------------
// IdentityTracker
// ---------------------------------------------------------------------------

/// Live tracked-object set with greedy matching and TTL pruning.
///
/// The tracker has one writer domain: the session loop calls
/// [`observe`](Self::observe) on parsed batches and [`prune`](Self::prune)
/// on a timer, both behind the same `Mutex`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use live_grounding::parse::DetectionParser;
/// use live_grounding::track::IdentityTracker;
///
/// let mut parser = DetectionParser::new(500);
/// let mut tracker = IdentityTracker::new(200.0, Duration::from_millis(3_000));
///
/// tracker.observe(&parser.push_delta("cup [100, 100, 200, 200]"));
/// assert_eq!(tracker.len(), 1);
/// ```
pub struct IdentityTracker {
    objects: Vec<TrackedObject>,
    /// Next identity to hand out.  Monotonic — ids are never reused, even
    /// after their object is pruned.
    next_id: u64,
    match_threshold: f64,
    ttl: Duration,
}

impl IdentityTracker {
    /// Create a tracker.
    ///
    /// * `match_threshold` — maximum center distance for reconciliation
    ///   (200.0 in production: 20% of the 1000-unit coordinate span).
    /// * `ttl` — age after which an un-refreshed object is pruned.
    pub fn new(match_threshold: f64, ttl: Duration) -> Self {
        Self {
            objects: Vec::new(),
            next_id: 0,
            match_threshold,
            ttl,
        }
    }

    /// Reconcile a batch of detections, in order.
    ///
    /// Each detection either refreshes the nearest same-label object (center
    /// distance below the threshold — box and `last_updated` change, `id`
    /// does not) or creates a new object with a fresh id.
    pub fn observe(&mut self, detections: &[Detection]) {
        for det in detections {
            self.observe_one(det);
        }
    }

    fn observe_one(&mut self, det: &Detection) {
        let (cx, cy) = det.center();
        // Model labels are free text and not necessarily ASCII, so fold the
        // full Unicode case, not just `eq_ignore_ascii_case`.
        let det_label = det.label.to_lowercase();

        let mut best: Option<(usize, f64)> = None;
        for (idx, obj) in self.objects.iter().enumerate() {
            if obj.label.to_lowercase() != det_label {
                continue;
            }
            let (ox, oy) = obj.center();
            let dist = ((cx - ox).powi(2) + (cy - oy).powi(2)).sqrt();
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }

        match best {
            Some((idx, dist)) if dist < self.match_threshold => {
                let obj = &mut self.objects[idx];
                obj.ymin = det.ymin;
                obj.xmin = det.xmin;
                obj.ymax = det.ymax;
                obj.xmax = det.xmax;
                obj.last_updated = det.observed_at;
                log::trace!("tracker: refreshed object {} ({})", obj.id, obj.label);
            }
            _ => {
                let id = self.next_id;
                self.next_id += 1;
                log::debug!("tracker: new object {} ({})", id, det.label);
                self.objects.push(TrackedObject {
                    id,
                    label: det.label.clone(),
                    ymin: det.ymin,
                    xmin: det.xmin,
                    ymax: det.ymax,
                    xmax: det.xmax,
                    last_updated: det.observed_at,
                });
            }
        }
    }

    /// Remove every object whose age at `now` exceeds the TTL.
    ///
    /// An object aged exactly the TTL survives.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.objects.len();
        self.objects
            .retain(|obj| now.saturating_duration_since(obj.last_updated) <= ttl);
        let removed = before - self.objects.len();
        if removed > 0 {
            log::debug!("tracker: pruned {removed} stale object(s)");
        }
    }

    /// Read-only clone of the live set for the presentation subscriber.
    pub fn snapshot(&self) -> Vec<TrackedObject> {
        self.objects.clone()
    }

    /// Drop every tracked object.  The id counter is untouched, so ids are
    /// not reused across a clear.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
