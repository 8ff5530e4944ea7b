//! Oriented course paths traced along isolines.
//!
//! A course path is a polyline in sketch coordinates whose points may live on
//! different layers. A point flagged as `jump` is reached through a layer link
//! (or a seam wrap) and the segment leading to it has zero length.
//!
//! # Example
//!
//! ```ignore
//! let path = CoursePath::new(points, true)?;
//! let p = path.sample_at(0.25);
//! ```

use thiserror::Error;

use crate::core::{Orientation, Vec2};

/// Point of a course path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoursePoint {
    pub layer: usize,
    pub position: Vec2,
    /// The segment arriving at this point crosses a layer link.
    pub jump: bool,
}

impl CoursePoint {
    #[must_use]
    pub const fn new(layer: usize, position: Vec2) -> Self {
        Self {
            layer,
            position,
            jump: false,
        }
    }

    #[must_use]
    pub const fn jumping(mut self) -> Self {
        self.jump = true;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CourseError {
    #[error("course path requires at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("course path point {0} is not finite")]
    NonFinite(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoursePath {
    points: Vec<CoursePoint>,
    cumulative_lengths: Vec<f64>,
    total_length: f64,
    circular: bool,
}

impl CoursePath {
    pub fn new(points: Vec<CoursePoint>, circular: bool) -> Result<Self, CourseError> {
        if points.len() < 2 {
            return Err(CourseError::TooFewPoints(points.len()));
        }
        if let Some(bad) = points.iter().position(|p| !p.position.is_finite()) {
            return Err(CourseError::NonFinite(bad));
        }

        let mut cumulative_lengths = Vec::with_capacity(points.len());
        cumulative_lengths.push(0.0);
        let mut total = 0.0;
        for window in points.windows(2) {
            total += segment_length(&window[0], &window[1]);
            cumulative_lengths.push(total);
        }
        if circular {
            total += segment_length(&points[points.len() - 1], &points[0]);
        }

        Ok(Self {
            points,
            cumulative_lengths,
            total_length: total,
            circular,
        })
    }

    /// Two-point path on one layer; circular lines close through a link jump.
    #[must_use]
    pub fn line(layer: usize, from: Vec2, to: Vec2, circular: bool) -> Self {
        let length = from.distance_to(to);
        Self {
            points: vec![
                CoursePoint {
                    layer,
                    position: from,
                    jump: circular,
                },
                CoursePoint::new(layer, to),
            ],
            cumulative_lengths: vec![0.0, length],
            total_length: length,
            circular,
        }
    }

    #[must_use]
    pub fn points(&self) -> &[CoursePoint] {
        &self.points
    }

    #[must_use]
    pub const fn is_circular(&self) -> bool {
        self.circular
    }

    #[must_use]
    pub const fn length(&self) -> f64 {
        self.total_length
    }

    /// Point at arc-length fraction `alpha`; circular paths wrap around.
    #[must_use]
    pub fn sample_at(&self, alpha: f64) -> CoursePoint {
        let alpha = if self.circular {
            alpha.rem_euclid(1.0)
        } else {
            alpha.clamp(0.0, 1.0)
        };
        if self.total_length <= 0.0 || !self.total_length.is_finite() {
            return self.points[0];
        }
        let mut target = alpha * self.total_length;

        let last_index = self.points.len() - 1;
        if target >= self.cumulative_lengths[last_index] {
            let last = self.points[last_index];
            if !self.circular {
                return last;
            }
            let first = self.points[0];
            let seg_len = segment_length(&last, &first);
            if seg_len == 0.0 {
                return last;
            }
            let ratio = ((target - self.cumulative_lengths[last_index]) / seg_len).clamp(0.0, 1.0);
            return interpolate(&last, &first, ratio);
        }

        let idx = match self
            .cumulative_lengths
            .binary_search_by(|value| value.total_cmp(&target))
        {
            Ok(i) => i.min(last_index - 1),
            Err(i) => i.max(1) - 1,
        };
        let start = self.points[idx];
        let end = self.points[idx + 1];
        let seg_len = segment_length(&start, &end);
        if seg_len == 0.0 {
            return end;
        }
        target -= self.cumulative_lengths[idx];
        interpolate(&start, &end, (target / seg_len).clamp(0.0, 1.0))
    }

    /// Stitch locations for `count` stitches along the path.
    #[must_use]
    pub fn sample_uniform(&self, count: usize) -> Vec<CoursePoint> {
        (0..count)
            .map(|i| self.sample_at(stitch_alpha(i, count)))
            .collect()
    }

    /// Winding of the path when seen as a closed polygon.
    #[must_use]
    pub fn orientation(&self) -> Orientation {
        if !self.circular {
            return Orientation::Indecisive;
        }
        let positions: Vec<Vec2> = self.points.iter().map(|p| p.position).collect();
        Orientation::of(&positions)
    }

    /// Same path traversed backwards.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let n = self.points.len();
        let mut points = Vec::with_capacity(n);
        for k in 0..n {
            let mut point = self.points[n - 1 - k];
            // the jump flag belongs to the segment arriving at a point
            point.jump = if k == 0 {
                self.points[0].jump
            } else {
                self.points[n - k].jump
            };
            points.push(point);
        }
        if !self.circular {
            points[0].jump = false;
        }
        // lengths are unchanged, only their layout
        Self::new(points, self.circular).unwrap_or_else(|_| self.clone())
    }

    /// Path in the requested winding; the flag reports whether it was flipped.
    #[must_use]
    pub fn oriented(&self, ccw: bool) -> (Self, bool) {
        let flip = match self.orientation() {
            Orientation::Ccw => !ccw,
            Orientation::Cw => ccw,
            Orientation::Indecisive => false,
        };
        if flip {
            (self.reversed(), true)
        } else {
            (self.clone(), false)
        }
    }

    /// Checks whether two paths describe the same isoline (within `eps`).
    #[must_use]
    pub fn matches(&self, other: &Self, eps: f64) -> bool {
        self.circular == other.circular
            && self.points.len() == other.points.len()
            && (self.total_length - other.total_length).abs() <= eps
            && self.points.iter().zip(&other.points).all(|(a, b)| {
                a.layer == b.layer && a.position.distance_to(b.position) <= eps
            })
    }
}

/// Course parameter of stitch `index` out of `count`.
///
/// The first stitch sits on the course origin; flat courses stop one step
/// short of their end and circular ones one step short of wrapping.
#[must_use]
pub fn stitch_alpha(index: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    index as f64 / count as f64
}

fn segment_length(from: &CoursePoint, to: &CoursePoint) -> f64 {
    if to.jump || from.layer != to.layer {
        0.0
    } else {
        from.position.distance_to(to.position)
    }
}

fn interpolate(from: &CoursePoint, to: &CoursePoint, t: f64) -> CoursePoint {
    if from.layer != to.layer || to.jump {
        return if t < 1.0 { *from } else { *to };
    }
    CoursePoint {
        layer: from.layer,
        position: from.position.lerp(to.position, t),
        jump: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(ccw: bool) -> CoursePath {
        let mut pts = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        if !ccw {
            pts.reverse();
        }
        CoursePath::new(pts.into_iter().map(|p| CoursePoint::new(0, p)).collect(), true).unwrap()
    }

    #[test]
    fn circular_length_includes_closing_segment() {
        assert!((square(true).length() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn jumps_have_no_length() {
        let path = CoursePath::new(
            vec![
                CoursePoint::new(0, Vec2::new(0.0, 0.0)).jumping(),
                CoursePoint::new(0, Vec2::new(10.0, 0.0)),
            ],
            true,
        )
        .unwrap();
        assert!((path.length() - 10.0).abs() < 1e-12);
        let p = path.sample_at(0.25);
        assert!((p.position.x - 2.5).abs() < 1e-9);
        let wrapped = path.sample_at(1.25);
        assert!((wrapped.position.x - 2.5).abs() < 1e-9);
    }

    #[test]
    fn orientation_and_reversal() {
        let ccw = square(true);
        assert_eq!(ccw.orientation(), Orientation::Ccw);
        let (flipped, did_flip) = ccw.oriented(false);
        assert!(did_flip);
        assert_eq!(flipped.orientation(), Orientation::Cw);
        assert!((flipped.length() - ccw.length()).abs() < 1e-12);
        assert_eq!(square(false).oriented(false).1, false);
    }

    #[test]
    fn reversal_keeps_jump_segments() {
        let path = CoursePath::new(
            vec![
                CoursePoint::new(0, Vec2::new(0.0, 0.0)),
                CoursePoint::new(0, Vec2::new(4.0, 0.0)),
                CoursePoint::new(1, Vec2::new(9.0, 9.0)).jumping(),
                CoursePoint::new(1, Vec2::new(9.0, 12.0)),
            ],
            false,
        )
        .unwrap();
        let reversed = path.reversed();
        assert!((reversed.length() - path.length()).abs() < 1e-12);
        assert!(reversed.points()[2].jump);
    }

    #[test]
    fn alphas_start_at_the_course_origin() {
        assert_eq!(stitch_alpha(0, 4), 0.0);
        assert_eq!(stitch_alpha(3, 4), 0.75);
        assert_eq!(stitch_alpha(2, 0), 0.0);
    }

    #[test]
    fn flat_stitches_start_on_the_first_point() {
        let line = CoursePath::line(0, Vec2::new(0.0, 0.0), Vec2::new(40.0, 0.0), false);
        let xs: Vec<f64> = line.sample_uniform(4).iter().map(|p| p.position.x).collect();
        assert_eq!(xs, vec![0.0, 10.0, 20.0, 30.0]);
    }
}
