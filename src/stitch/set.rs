//! Stitch graph stored in a packed array.
//!
//! Stitches are grouped into courses and short rows. Every group owns a
//! contiguous index range; short-row groups always come after every course
//! stitch so they can be dropped by truncation.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::Vec2;
use crate::ds::{PackedArray, PackedArrayError};
use crate::error::SamplingError;

use super::layout::{
    STITCH_FIELDS, decode_group, decode_pointer, encode_group, encode_pointer, stitch_layout,
};

const MAGIC: &[u8; 4] = b"KNST";
const VERSION: u32 = 1;

/// Index range `[start, end)` of one course or short row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StitchGroup {
    pub start: u32,
    pub end: u32,
    pub time: f32,
    pub region: u32,
}

impl StitchGroup {
    #[must_use]
    pub const fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        index >= self.start as usize && index < self.end as usize
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// Location of a stitch to create.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StitchPoint {
    pub layer: usize,
    pub position: Vec2,
    pub alpha: f64,
}

impl StitchPoint {
    #[must_use]
    pub const fn new(layer: usize, position: Vec2, alpha: f64) -> Self {
        Self {
            layer,
            position,
            alpha,
        }
    }
}

/// Errors raised when reloading persisted stitches.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StitchDecodeError {
    #[error("stitch buffer does not start with the expected header")]
    BadHeader,
    #[error("unsupported stitch buffer version {0}")]
    Version(u32),
    #[error("stitch buffer truncated at byte {0}")]
    Truncated(usize),
    #[error(transparent)]
    Packed(#[from] PackedArrayError),
}

/// Course/wale graph over a packed stitch array.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchSet {
    stitches: PackedArray,
    courses: Vec<StitchGroup>,
    short_rows: Vec<StitchGroup>,
    /// Course flag per course group.
    circular: Vec<bool>,
}

impl Default for StitchSet {
    fn default() -> Self {
        Self::new()
    }
}

impl StitchSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stitches: PackedArray::new(stitch_layout()),
            courses: Vec::new(),
            short_rows: Vec::new(),
            circular: Vec::new(),
        }
    }

    /// Empty set with room for `capacity` stitches.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut set = Self::new();
        set.stitches.allocate(capacity);
        set
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.stitches.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stitches.is_empty()
    }

    #[must_use]
    pub fn courses(&self) -> &[StitchGroup] {
        &self.courses
    }

    #[must_use]
    pub fn short_rows(&self) -> &[StitchGroup] {
        &self.short_rows
    }

    #[must_use]
    pub fn is_circular(&self, course: usize) -> bool {
        self.circular.get(course).copied().unwrap_or(false)
    }

    /// Number of stitches that belong to courses.
    #[must_use]
    pub fn course_stitch_count(&self) -> usize {
        self.courses.last().map_or(0, |g| g.end as usize)
    }

    /// Underlying packed records.
    #[must_use]
    pub fn packed(&self) -> &PackedArray {
        &self.stitches
    }

    fn push_stitch(&mut self, point: StitchPoint, group: usize, short_row: bool) -> usize {
        let f = STITCH_FIELDS;
        let index = self.stitches.push_default();
        let i = index as isize;
        self.stitches.set(i, f.sx, point.position.x as f32);
        self.stitches.set(i, f.sy, point.position.y as f32);
        self.stitches.set(i, f.sa, point.alpha as f32);
        self.stitches.set(i, f.li, point.layer as u16);
        self.stitches.set(i, f.ym, 1u16);
        self.stitches.set(i, f.gd, encode_group(group, short_row));
        index
    }

    fn link_course(&mut self, a: usize, b: usize) {
        let f = STITCH_FIELDS;
        self.stitches.set(a as isize, f.nc, encode_pointer(Some(b)));
        self.stitches.set(b as isize, f.pc, encode_pointer(Some(a)));
    }

    fn push_group(&mut self, points: &[StitchPoint], time: f64, region: usize, short_row: bool) -> StitchGroup {
        let group = if short_row {
            self.short_rows.len()
        } else {
            self.courses.len()
        };
        let start = self.len();
        for point in points {
            self.push_stitch(*point, group, short_row);
        }
        for i in start + 1..self.len() {
            self.link_course(i - 1, i);
        }
        StitchGroup {
            start: start as u32,
            end: self.len() as u32,
            time: time as f32,
            region: region as u32,
        }
    }

    /// Appends a course and links its course pointers (wrapping when
    /// circular). Returns the course index.
    pub fn push_course(
        &mut self,
        points: &[StitchPoint],
        circular: bool,
        time: f64,
        region: usize,
    ) -> Result<usize, SamplingError> {
        if !self.short_rows.is_empty() {
            return Err(SamplingError::Invariant(
                "courses cannot follow short rows".into(),
            ));
        }
        if points.is_empty() {
            return Err(SamplingError::Invariant("empty course".into()));
        }
        let group = self.push_group(points, time, region, false);
        if circular && group.len() > 1 {
            self.link_course(group.end as usize - 1, group.start as usize);
        }
        self.courses.push(group);
        self.circular.push(circular);
        Ok(self.courses.len() - 1)
    }

    /// Appends a short-row group. Returns the short-row index.
    pub fn push_short_row(
        &mut self,
        points: &[StitchPoint],
        time: f64,
        region: usize,
    ) -> Result<usize, SamplingError> {
        if points.is_empty() {
            return Err(SamplingError::Invariant("empty short row".into()));
        }
        let group = self.push_group(points, time, region, true);
        self.short_rows.push(group);
        Ok(self.short_rows.len() - 1)
    }

    #[must_use]
    pub fn position(&self, index: usize) -> Vec2 {
        let f = STITCH_FIELDS;
        let i = index as isize;
        Vec2::new(
            f64::from(self.stitches.get::<f32>(i, f.sx)),
            f64::from(self.stitches.get::<f32>(i, f.sy)),
        )
    }

    #[must_use]
    pub fn alpha(&self, index: usize) -> f64 {
        f64::from(self.stitches.get::<f32>(index as isize, STITCH_FIELDS.sa))
    }

    #[must_use]
    pub fn layer(&self, index: usize) -> usize {
        usize::from(self.stitches.get::<u16>(index as isize, STITCH_FIELDS.li))
    }

    /// `(group, short_row)` of a stitch.
    #[must_use]
    pub fn group(&self, index: usize) -> (usize, bool) {
        decode_group(self.stitches.get::<u32>(index as isize, STITCH_FIELDS.gd))
    }

    #[must_use]
    pub fn is_short_row(&self, index: usize) -> bool {
        self.group(index).1
    }

    fn pointer(&self, index: usize, field: crate::ds::FieldId) -> Option<usize> {
        decode_pointer(self.stitches.get::<u32>(index as isize, field))
    }

    #[must_use]
    pub fn prev_course(&self, index: usize) -> Option<usize> {
        self.pointer(index, STITCH_FIELDS.pc)
    }

    #[must_use]
    pub fn next_course(&self, index: usize) -> Option<usize> {
        self.pointer(index, STITCH_FIELDS.nc)
    }

    #[must_use]
    pub fn prev_wales(&self, index: usize) -> Vec<usize> {
        STITCH_FIELDS
            .pw
            .iter()
            .filter_map(|&f| self.pointer(index, f))
            .collect()
    }

    #[must_use]
    pub fn next_wales(&self, index: usize) -> Vec<usize> {
        STITCH_FIELDS
            .nw
            .iter()
            .filter_map(|&f| self.pointer(index, f))
            .collect()
    }

    fn wale_capacity(&self, index: usize) -> usize {
        if self.is_short_row(index) { 1 } else { 2 }
    }

    /// Connects `source` to the next-course stitch `target`.
    pub fn add_wale(&mut self, source: usize, target: usize) -> Result<(), SamplingError> {
        let invalid = |reason| SamplingError::InvalidWale {
            source_stitch: source,
            target,
            reason,
        };
        if source >= self.len() || target >= self.len() {
            return Err(invalid("stitch out of range"));
        }
        if source == target {
            return Err(invalid("self wale"));
        }
        if self.next_wales(source).contains(&target) {
            return Err(invalid("duplicate wale"));
        }
        let f = STITCH_FIELDS;
        let capacity = self.wale_capacity(source);
        let next_slot = f.nw[..capacity]
            .iter()
            .copied()
            .find(|&slot| self.pointer(source, slot).is_none())
            .ok_or_else(|| invalid("source has no free next wale"))?;
        let capacity = self.wale_capacity(target);
        let prev_slot = f.pw[..capacity]
            .iter()
            .copied()
            .find(|&slot| self.pointer(target, slot).is_none())
            .ok_or_else(|| invalid("target has no free previous wale"))?;
        self.stitches.set(source as isize, next_slot, encode_pointer(Some(target)));
        self.stitches.set(target as isize, prev_slot, encode_pointer(Some(source)));
        Ok(())
    }

    /// Disconnects the wale `source → target`.
    pub fn remove_wale(&mut self, source: usize, target: usize) -> Result<(), SamplingError> {
        let f = STITCH_FIELDS;
        let next_slot = f
            .nw
            .iter()
            .copied()
            .find(|&slot| self.pointer(source, slot) == Some(target));
        let prev_slot = f
            .pw
            .iter()
            .copied()
            .find(|&slot| self.pointer(target, slot) == Some(source));
        let (Some(next_slot), Some(prev_slot)) = (next_slot, prev_slot) else {
            return Err(SamplingError::InvalidWale {
                source_stitch: source,
                target,
                reason: "no such wale",
            });
        };
        self.stitches.set(source as isize, next_slot, 0u32);
        self.stitches.set(target as isize, prev_slot, 0u32);
        self.compact_wales(source);
        self.compact_wales(target);
        Ok(())
    }

    /// Removes every next wale of `source`; returns the former targets.
    pub fn clear_next_wales(&mut self, source: usize) -> Result<Vec<usize>, SamplingError> {
        let targets = self.next_wales(source);
        for &target in &targets {
            self.remove_wale(source, target)?;
        }
        Ok(targets)
    }

    // keep slot 0 filled before slot 1
    fn compact_wales(&mut self, index: usize) {
        for slots in [STITCH_FIELDS.pw, STITCH_FIELDS.nw] {
            let i = index as isize;
            if self.stitches.get::<u32>(i, slots[0]) == 0 {
                let second = self.stitches.get::<u32>(i, slots[1]);
                self.stitches.set(i, slots[0], second);
                self.stitches.set(i, slots[1], 0u32);
            }
        }
    }

    /// Checks the pointer and group invariants; reports the first violation.
    pub fn validate(&self) -> Result<(), SamplingError> {
        let n = self.len();
        let fail = |message: String| Err(SamplingError::Invariant(message));
        for i in 0..n {
            if let Some(next) = self.next_course(i) {
                if next >= n || next == i || self.prev_course(next) != Some(i) {
                    return fail(format!("course pointer {i} -> {next} is not symmetric"));
                }
            }
            if let Some(prev) = self.prev_course(i) {
                if prev >= n || prev == i || self.next_course(prev) != Some(i) {
                    return fail(format!("course pointer {prev} <- {i} is not symmetric"));
                }
            }
            let (next, prev) = (self.next_wales(i), self.prev_wales(i));
            for &t in &next {
                if t >= n || t == i || !self.prev_wales(t).contains(&i) {
                    return fail(format!("wale {i} -> {t} is not symmetric"));
                }
            }
            for &s in &prev {
                if s >= n || s == i || !self.next_wales(s).contains(&i) {
                    return fail(format!("wale {s} -> {i} is not symmetric"));
                }
            }
            if self.is_short_row(i) && (next.len() != 1 || prev.len() != 1) {
                return fail(format!(
                    "short-row stitch {i} has {} previous and {} next wales",
                    prev.len(),
                    next.len()
                ));
            }
        }

        let mut expected = 0usize;
        for (k, group) in self.courses.iter().chain(&self.short_rows).enumerate() {
            if group.is_empty() || group.start as usize != expected {
                return fail(format!("group {k} does not continue the stitch ranges"));
            }
            expected = group.end as usize;
        }
        if expected != n {
            return fail(format!("groups cover {expected} of {n} stitches"));
        }
        for (c, course) in self.courses.iter().enumerate() {
            if course.indices().any(|i| self.group(i) != (c, false)) {
                return fail(format!("course {c} holds foreign stitches"));
            }
        }
        for (r, row) in self.short_rows.iter().enumerate() {
            if row.indices().any(|i| self.group(i) != (r, true)) {
                return fail(format!("short row {r} holds foreign stitches"));
            }
        }
        Ok(())
    }

    /// Drops every short row and reconnects the wales they interrupted.
    pub fn clear_short_rows(&mut self) -> Result<(), SamplingError> {
        let boundary = self.course_stitch_count();
        if boundary == self.len() {
            return Ok(());
        }
        let mut bridges = Vec::new();
        for source in 0..boundary {
            for first in self.next_wales(source).into_iter().filter(|&w| w >= boundary) {
                let mut last = first;
                while let Some(&next) = self.next_wales(last).first() {
                    if next < boundary {
                        break;
                    }
                    last = next;
                }
                let targets: Vec<usize> = self
                    .next_wales(last)
                    .into_iter()
                    .filter(|&t| t < boundary)
                    .collect();
                bridges.push((source, first, last, targets));
            }
        }
        for (source, first, last, targets) in &bridges {
            self.remove_wale(*source, *first)?;
            for &target in targets {
                self.remove_wale(*last, target)?;
            }
        }
        self.stitches.truncate(boundary);
        self.short_rows.clear();
        for (source, _, _, targets) in bridges {
            for target in targets {
                self.add_wale(source, target)?;
            }
        }
        debug!("cleared short rows down to {boundary} stitches");
        Ok(())
    }

    /// Persists the packed stitches and both group indices.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.stitches.as_bytes();
        let mut out = Vec::with_capacity(24 + body.len() + 16 * (self.courses.len() + self.short_rows.len()));
        out.extend_from_slice(MAGIC);
        for value in [
            VERSION,
            self.len() as u32,
            self.courses.len() as u32,
            self.short_rows.len() as u32,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(body);
        for (k, group) in self.courses.iter().chain(&self.short_rows).enumerate() {
            out.extend_from_slice(&group.start.to_le_bytes());
            out.extend_from_slice(&group.end.to_le_bytes());
            out.extend_from_slice(&group.time.to_le_bytes());
            // circular flag rides in the top bit of course regions
            let flag = k < self.courses.len() && self.circular[k];
            let region = group.region | if flag { 1 << 31 } else { 0 };
            out.extend_from_slice(&region.to_le_bytes());
        }
        out
    }

    /// Reloads a set written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StitchDecodeError> {
        let mut reader = Reader { bytes, at: 0 };
        if reader.take(4)? != MAGIC {
            return Err(StitchDecodeError::BadHeader);
        }
        let version = reader.u32()?;
        if version != VERSION {
            return Err(StitchDecodeError::Version(version));
        }
        let len = reader.u32()? as usize;
        let course_count = reader.u32()? as usize;
        let short_row_count = reader.u32()? as usize;
        let layout = stitch_layout();
        let body = reader.take(len * layout.stride())?;
        let stitches = PackedArray::from_bytes(layout, body)?;

        let mut set = Self::new();
        set.stitches = stitches;
        for k in 0..course_count + short_row_count {
            let start = reader.u32()?;
            let end = reader.u32()?;
            let time = f32::from_bits(reader.u32()?);
            let raw = reader.u32()?;
            let group = StitchGroup {
                start,
                end,
                time,
                region: raw & !(1 << 31),
            };
            if k < course_count {
                set.courses.push(group);
                set.circular.push(raw >> 31 == 1);
            } else {
                set.short_rows.push(group);
            }
        }
        Ok(set)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StitchDecodeError> {
        let slice = self
            .bytes
            .get(self.at..self.at + n)
            .ok_or(StitchDecodeError::Truncated(self.at))?;
        self.at += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, StitchDecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }
}
