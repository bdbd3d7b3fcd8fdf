//! Incremental detection parsing from a streamed text transcript.
//!
//! The remote model emits bounding boxes inline in its text output as
//! `label [ymin, xmin, ymax, xmax]` with integer coordinates in a
//! 1000×1000 normalised space.  Deltas arrive token-by-token, so a bracket
//! group is routinely split across two deliveries.  [`DetectionParser`]
//! keeps a bounded trailing buffer of recent text and re-scans the whole
//! buffer on every delta — the only way to guarantee a group whose
//! characters straddled a delivery boundary is eventually matched.  The
//! buffer cap bounds the cost of each rescan.
//!
//! Re-scanning means a group already reported on a previous delta is
//! reported again; de-duplication is the identity tracker's job, not the
//! parser's.

use std::time::Instant;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// One parsed bounding-box observation.
///
/// Transient — produced by [`DetectionParser::push_delta`] and consumed by
/// the tracker within the same cycle.  Coordinates are in the model's
/// `[0, 1000]` normalised space, ordered `ymin, xmin, ymax, xmax` as on the
/// wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The last whitespace-delimited token preceding the bracket, or
    /// `"Object"` when there was none.
    pub label: String,
    pub ymin: u32,
    pub xmin: u32,
    pub ymax: u32,
    pub xmax: u32,
    /// When this observation was parsed.
    pub observed_at: Instant,
}

impl Detection {
    /// Box center `(x, y)` in the `[0, 1000]` coordinate space.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) as f64 / 2.0,
            (self.ymin + self.ymax) as f64 / 2.0,
        )
    }
}

// ---------------------------------------------------------------------------
// DetectionParser
// ---------------------------------------------------------------------------

/// Coordinates must land in the model's normalised space; anything outside
/// is a malformed group, not a value to clamp.
const COORD_MAX: u32 = 1_000;

/// Incremental parser over a bounded trailing text buffer.
///
/// # Example
///
/// ```rust
/// use live_grounding::parse::DetectionParser;
///
/// let mut parser = DetectionParser::new(500);
/// let found = parser.push_delta("a coffee cup [200, 300, 450, 500]");
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].label, "cup");
/// assert_eq!(found[0].ymin, 200);
/// ```
pub struct DetectionParser {
    buffer: String,
    /// Buffer cap in characters (not bytes); oldest characters drop first.
    cap: usize,
}

impl DetectionParser {
    /// Create a parser whose trailing buffer holds at most `cap` characters.
    pub fn new(cap: usize) -> Self {
        Self {
            buffer: String::new(),
            cap,
        }
    }

    /// Append a text delta and return every well-formed bracket group in the
    /// current buffer.
    ///
    /// Malformed groups (wrong arity, non-integer, out of `[0, 1000]`) are
    /// skipped and scanning resumes after their closing bracket.  An
    /// unterminated `[` is left in the buffer for a later delta to complete.
    pub fn push_delta(&mut self, delta: &str) -> Vec<Detection> {
        self.buffer.push_str(delta);
        self.truncate_front();
        self.scan()
    }

    /// Number of characters currently buffered.
    pub fn buffered_chars(&self) -> usize {
        self.buffer.chars().count()
    }

    /// Drop characters from the front until at most `cap` remain.
    ///
    /// Truncation is char-aligned so a multi-byte scalar is never split.
    fn truncate_front(&mut self) {
        let len = self.buffer.chars().count();
        if len <= self.cap {
            return;
        }
        let excess = len - self.cap;
        if let Some((byte_idx, _)) = self.buffer.char_indices().nth(excess) {
            self.buffer.drain(..byte_idx);
        } else {
            self.buffer.clear();
        }
    }

    /// Scan the whole buffer for non-overlapping bracket groups.
    fn scan(&self) -> Vec<Detection> {
        let mut detections = Vec::new();
        let buf = self.buffer.as_str();
        // Byte offset where the unconsumed region (and the label text for
        // the next group) starts.
        let mut cursor = 0;

        while let Some(open_rel) = buf[cursor..].find('[') {
            let open = cursor + open_rel;
            let Some(close_rel) = buf[open + 1..].find(']') else {
                // Unterminated group — its tail may arrive in a later delta.
                break;
            };
            let close = open + 1 + close_rel;

            match parse_box(&buf[open + 1..close]) {
                Some([ymin, xmin, ymax, xmax]) => {
                    detections.push(Detection {
                        label: extract_label(&buf[cursor..open]),
                        ymin,
                        xmin,
                        ymax,
                        xmax,
                        observed_at: Instant::now(),
                    });
                    // Non-overlapping: resume after the closing bracket.
                    cursor = close + 1;
                }
                None => {
                    log::debug!(
                        "parser: discarding malformed bracket group {:?}",
                        &buf[open..=close]
                    );
                    // The failed span may still contain a valid group whose
                    // own `[` sits between this pair, as in
                    // `[ a cup [100, 200, 300, 400]`.  Re-anchor just past
                    // the stray opener so that group is not swallowed.
                    cursor = open + 1;
                }
            }
        }

        detections
    }
}

/// Parse the inside of a bracket group into `[ymin, xmin, ymax, xmax]`.
///
/// Exactly four comma/whitespace-separated non-negative integers, each at
/// most 1000.  Anything else is `None`.
fn parse_box(inner: &str) -> Option<[u32; 4]> {
    let mut coords = [0u32; 4];
    let mut count = 0;

    for token in inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if count == 4 {
            return None; // too many values
        }
        let value = token.parse::<u32>().ok()?;
        if value > COORD_MAX {
            return None;
        }
        coords[count] = value;
        count += 1;
    }

    (count == 4).then_some(coords)
}

/// Last whitespace-delimited token of the text preceding a bracket, or
/// `"Object"` when there is none.
///
/// The token is taken literally — a stray preposition such as "at" becomes
/// the label.  See the module docs of [`crate::track`] for how labels are
/// matched case-insensitively downstream.
fn extract_label(preceding: &str) -> String {
    preceding
        .split_whitespace()
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| "Object".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(dets: &[Detection]) -> Vec<[u32; 4]> {
        dets.iter()
            .map(|d| [d.ymin, d.xmin, d.ymax, d.xmax])
            .collect()
    }

    // ---- Well-formed groups ------------------------------------------------

    #[test]
    fn atomic_detection_parses_coordinates() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("I see a coffee cup at [200, 300, 450, 500]");
        assert_eq!(boxes(&found), vec![[200, 300, 450, 500]]);
    }

    #[test]
    fn label_is_last_token_before_bracket() {
        let mut p = DetectionParser::new(500);
        // The literal last token wins, even a preposition.
        let found = p.push_delta("a coffee cup at [1, 2, 3, 4]");
        assert_eq!(found[0].label, "at");
    }

    #[test]
    fn label_without_trailing_space() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("cup[1, 2, 3, 4]");
        assert_eq!(found[0].label, "cup");
    }

    #[test]
    fn missing_label_defaults_to_object() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("[10, 20, 30, 40]");
        assert_eq!(found[0].label, "Object");
    }

    #[test]
    fn whitespace_only_prefix_defaults_to_object() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("   \t [10, 20, 30, 40]");
        assert_eq!(found[0].label, "Object");
    }

    #[test]
    fn multiple_groups_in_one_delta() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("cat [1, 2, 3, 4] and a dog [5, 6, 7, 8]");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].label, "cat");
        assert_eq!(found[1].label, "dog");
        assert_eq!(boxes(&found), vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
    }

    #[test]
    fn whitespace_separated_coordinates() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("box [1 2 3 4]");
        assert_eq!(boxes(&found), vec![[1, 2, 3, 4]]);
    }

    #[test]
    fn boundary_values_accepted() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("edge [0, 0, 1000, 1000]");
        assert_eq!(boxes(&found), vec![[0, 0, 1000, 1000]]);
    }

    // ---- Buffer-spanning groups --------------------------------------------

    #[test]
    fn group_split_across_two_deltas() {
        let mut p = DetectionParser::new(500);
        assert!(p.push_delta("a red ball [120, 3").is_empty());
        let found = p.push_delta("40, 560, 780]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "ball");
        assert_eq!(boxes(&found), vec![[120, 340, 560, 780]]);
    }

    #[test]
    fn group_split_at_open_bracket() {
        let mut p = DetectionParser::new(500);
        assert!(p.push_delta("a lamp ").is_empty());
        assert!(p.push_delta("[").is_empty());
        let found = p.push_delta("9, 9, 9, 9]");
        assert_eq!(found[0].label, "lamp");
    }

    #[test]
    fn rescan_reports_existing_group_again() {
        let mut p = DetectionParser::new(500);
        let first = p.push_delta("cup [1, 2, 3, 4]");
        assert_eq!(first.len(), 1);
        // The group is still in the buffer, so the next delta re-reports it.
        let second = p.push_delta(" more text");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0], Detection { observed_at: second[0].observed_at, ..first[0].clone() });
    }

    // ---- Malformed groups --------------------------------------------------

    #[test]
    fn non_numeric_group_discarded() {
        let mut p = DetectionParser::new(500);
        assert!(p.push_delta("thing [a, b, c, d]").is_empty());
    }

    #[test]
    fn wrong_arity_discarded() {
        let mut p = DetectionParser::new(500);
        assert!(p.push_delta("thing [1, 2, 3]").is_empty());
        assert!(p.push_delta(" other [1, 2, 3, 4, 5]").is_empty());
    }

    #[test]
    fn out_of_range_discarded_not_clamped() {
        let mut p = DetectionParser::new(500);
        assert!(p.push_delta("big [0, 0, 1001, 500]").is_empty());
    }

    #[test]
    fn negative_value_discarded() {
        let mut p = DetectionParser::new(500);
        assert!(p.push_delta("neg [-5, 0, 10, 10]").is_empty());
    }

    #[test]
    fn malformed_group_does_not_stop_scan() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("bad [x] good [1, 2, 3, 4]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "good");
    }

    #[test]
    fn stray_open_bracket_does_not_swallow_inner_group() {
        let mut p = DetectionParser::new(500);
        // The first `[` pairs with the cup group's `]`, making one malformed
        // span; the valid group inside must still come out.
        let found = p.push_delta("I see [ a cup [100, 200, 300, 400]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "cup");
        assert_eq!(boxes(&found), vec![[100, 200, 300, 400]]);
    }

    #[test]
    fn nested_stray_brackets_still_yield_innermost_group() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("[[ a dog [5, 6, 7, 8]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "dog");
    }

    // ---- Trailing buffer ---------------------------------------------------

    #[test]
    fn buffer_truncates_oldest_first() {
        let mut p = DetectionParser::new(10);
        p.push_delta("abcdefghij");
        p.push_delta("XY");
        assert_eq!(p.buffered_chars(), 10);
    }

    #[test]
    fn truncation_is_char_aligned() {
        let mut p = DetectionParser::new(4);
        // Multi-byte characters must not be split.
        p.push_delta("héllo wörld");
        assert_eq!(p.buffered_chars(), 4);
    }

    #[test]
    fn group_pushed_out_of_buffer_is_gone() {
        let mut p = DetectionParser::new(20);
        assert_eq!(p.push_delta("cup [1, 2, 3, 4]").len(), 1);
        // Flood the buffer so the group's bracket falls off the front.
        assert!(p.push_delta(&"x".repeat(40)).is_empty());
    }

    // ---- Detection helpers -------------------------------------------------

    #[test]
    fn center_is_box_midpoint() {
        let mut p = DetectionParser::new(500);
        let found = p.push_delta("c [200, 300, 450, 500]");
        let (cx, cy) = found[0].center();
        assert!((cx - 400.0).abs() < f64::EPSILON);
        assert!((cy - 325.0).abs() < f64::EPSILON);
    }
}
