//! Time-labeled sample lattice of a sketch.
//!
//! Each sketch layer is sampled on a regular grid. A sample stores the time
//! function value and the auxiliary fields the sampler needs (curvature, flow,
//! time-stretch), the region it belongs to, and an optional link to the
//! coincident sample of another layer (or of the same layer, for seams that
//! wrap around).

use crate::core::Vec2;

use super::region::{RegionGraph, RegionId};

/// Address of a sample: layer index plus data index inside the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SampleRef {
    pub layer: usize,
    pub index: usize,
}

impl SampleRef {
    #[must_use]
    pub const fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Index of the sample inside its layer.
    pub data_index: usize,
    /// Lattice cell coordinates.
    pub cell: (usize, usize),
    pub position: Vec2,
    pub time: f64,
    pub curvature: f64,
    pub flow: Vec2,
    pub stretch: f64,
    pub region: Option<RegionId>,
    /// Coincident sample across a layer border.
    pub link: Option<SampleRef>,
}

/// One sketch layer sampled on a regular lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLayer {
    index: usize,
    sketch_id: u32,
    origin: Vec2,
    spacing: f64,
    width: usize,
    height: usize,
    cells: Vec<Option<usize>>,
    samples: Vec<Sample>,
}

impl MeshLayer {
    /// Creates an empty lattice of `width × height` cells.
    #[must_use]
    pub fn new(
        index: usize,
        sketch_id: u32,
        origin: Vec2,
        spacing: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            index,
            sketch_id,
            origin,
            spacing,
            width,
            height,
            cells: vec![None; width * height],
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn sketch_id(&self) -> u32 {
        self.sketch_id
    }

    #[must_use]
    pub const fn spacing(&self) -> f64 {
        self.spacing
    }

    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Adds (or replaces) the sample of a lattice cell and returns its data index.
    ///
    /// # Panics
    /// Panics if the cell lies outside the lattice.
    pub fn add_sample(&mut self, cx: usize, cy: usize, time: f64) -> usize {
        assert!(cx < self.width && cy < self.height, "cell ({cx},{cy}) outside lattice");
        let position = self.cell_position(cx, cy);
        let sample = Sample {
            data_index: 0,
            cell: (cx, cy),
            position,
            time,
            curvature: 1.0,
            flow: Vec2::ZERO,
            stretch: 1.0,
            region: None,
            link: None,
        };
        let slot = cy * self.width + cx;
        if let Some(existing) = self.cells[slot] {
            self.samples[existing] = Sample {
                data_index: existing,
                ..sample
            };
            return existing;
        }
        let data_index = self.samples.len();
        self.samples.push(Sample { data_index, ..sample });
        self.cells[slot] = Some(data_index);
        data_index
    }

    #[must_use]
    pub fn cell_position(&self, cx: usize, cy: usize) -> Vec2 {
        self.origin + Vec2::new(cx as f64, cy as f64) * self.spacing
    }

    #[must_use]
    pub fn sample_at_cell(&self, cx: isize, cy: isize) -> Option<usize> {
        if cx < 0 || cy < 0 || cx as usize >= self.width || cy as usize >= self.height {
            return None;
        }
        self.cells[cy as usize * self.width + cx as usize]
    }

    #[must_use]
    pub fn sample(&self, index: usize) -> &Sample {
        &self.samples[index]
    }

    pub fn sample_mut(&mut self, index: usize) -> &mut Sample {
        &mut self.samples[index]
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// 4-connected lattice neighbors of a sample.
    #[must_use]
    pub fn neighbors(&self, index: usize) -> Vec<usize> {
        let (cx, cy) = self.samples[index].cell;
        let (cx, cy) = (cx as isize, cy as isize);
        [(cx + 1, cy), (cx, cy + 1), (cx - 1, cy), (cx, cy - 1)]
            .into_iter()
            .filter_map(|(x, y)| self.sample_at_cell(x, y))
            .collect()
    }

    #[must_use]
    pub fn are_neighbors(&self, a: usize, b: usize) -> bool {
        let (ax, ay) = self.samples[a].cell;
        let (bx, by) = self.samples[b].cell;
        ax.abs_diff(bx) + ay.abs_diff(by) == 1
    }

    /// A sample is on the border when it misses a lattice neighbor or is linked.
    #[must_use]
    pub fn is_border(&self, index: usize) -> bool {
        self.samples[index].link.is_some() || self.neighbors(index).len() < 4
    }

    /// Lattice cell containing `p` (lower-left corner), possibly outside the grid.
    #[must_use]
    pub fn cell_of(&self, p: Vec2) -> (isize, isize) {
        let local = (p - self.origin) / self.spacing;
        (local.x.floor() as isize, local.y.floor() as isize)
    }
}

/// Sketch mesh: the sampled layers plus the region graph built over them.
#[derive(Debug, Clone, Default)]
pub struct TimeMesh {
    pub layers: Vec<MeshLayer>,
    pub graph: RegionGraph,
}

impl TimeMesh {
    #[must_use]
    pub fn new(layers: Vec<MeshLayer>, graph: RegionGraph) -> Self {
        let mut mesh = Self { layers, graph };
        mesh.recount_regions();
        mesh
    }

    #[must_use]
    pub fn layer(&self, index: usize) -> &MeshLayer {
        &self.layers[index]
    }

    #[must_use]
    pub fn sample(&self, sample: SampleRef) -> &Sample {
        self.layers[sample.layer].sample(sample.index)
    }

    /// Links two coincident samples in both directions.
    pub fn link(&mut self, a: SampleRef, b: SampleRef) {
        self.layers[a.layer].sample_mut(a.index).link = Some(b);
        self.layers[b.layer].sample_mut(b.index).link = Some(a);
    }

    /// Samples on layer borders, in layer then data order.
    #[must_use]
    pub fn border_samples(&self) -> Vec<SampleRef> {
        self.samples_where(true)
    }

    /// Samples strictly inside their layer.
    #[must_use]
    pub fn inner_samples(&self) -> Vec<SampleRef> {
        self.samples_where(false)
    }

    fn samples_where(&self, border: bool) -> Vec<SampleRef> {
        self.layers
            .iter()
            .flat_map(|layer| {
                (0..layer.samples().len())
                    .filter(move |&i| layer.is_border(i) == border)
                    .map(move |i| SampleRef::new(layer.index(), i))
            })
            .collect()
    }

    /// Recomputes the per-region sample counts stored on the region graph.
    pub fn recount_regions(&mut self) {
        let mut counts = vec![0usize; self.graph.node_count()];
        for layer in &self.layers {
            for sample in layer.samples() {
                if let Some(region) = sample.region {
                    if let Some(count) = counts.get_mut(region.0) {
                        *count += 1;
                    }
                }
            }
        }
        for (index, count) in counts.into_iter().enumerate() {
            self.graph.set_sample_count(RegionId(index), count);
        }
    }

    /// Sketch identifiers indexed by layer index.
    #[must_use]
    pub fn sketch_refs(&self) -> Vec<u32> {
        self.layers.iter().map(MeshLayer::sketch_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> MeshLayer {
        let mut layer = MeshLayer::new(0, 7, Vec2::ZERO, 2.0, width, height);
        for cy in 0..height {
            for cx in 0..width {
                layer.add_sample(cx, cy, cy as f64);
            }
        }
        layer
    }

    #[test]
    fn lattice_neighbors_and_borders() {
        let layer = grid(3, 3);
        let center = layer.sample_at_cell(1, 1).unwrap();
        assert_eq!(layer.neighbors(center).len(), 4);
        assert!(!layer.is_border(center));
        let corner = layer.sample_at_cell(0, 0).unwrap();
        assert_eq!(layer.neighbors(corner).len(), 2);
        assert!(layer.is_border(corner));
        assert_eq!(layer.sample(center).position, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn re_adding_a_cell_keeps_its_index() {
        let mut layer = grid(2, 2);
        let before = layer.sample_at_cell(1, 0).unwrap();
        let after = layer.add_sample(1, 0, 5.0);
        assert_eq!(before, after);
        assert_eq!(layer.sample(after).time, 5.0);
        assert_eq!(layer.samples().len(), 4);
    }

    #[test]
    fn cell_of_floors_positions() {
        let layer = grid(3, 3);
        assert_eq!(layer.cell_of(Vec2::new(3.9, 0.1)), (1, 0));
        assert_eq!(layer.cell_of(Vec2::new(-0.5, 0.0)), (-1, 0));
    }
}
