use image::RgbImage;

use binge_common::utils::workers::scoped_workers;

use crate::episode::Episode;
use crate::error::{CoreError, CoreResult};
use crate::frame_source::Resolution;

/// Which frames of an episode to load for one axis of a distance matrix.
#[derive(Clone, Debug)]
pub enum FrameList {
    /// Seek to each index independently.
    Indexed(Vec<u64>),
    /// Decode `count` frames in stream order starting at `start`, without reseeking.
    Consecutive { start: u64, count: u64 },
}

impl FrameList {
    pub fn len(&self) -> usize {
        match self {
            FrameList::Indexed(v) => v.len(),
            FrameList::Consecutive { count, .. } => *count as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The episode-native frame index each position in this list corresponds to.
    pub fn index_at(&self, position: usize) -> u64 {
        match self {
            FrameList::Indexed(v) => v[position],
            FrameList::Consecutive { start, .. } => start + position as u64,
        }
    }
}

/// One axis of a planned distance-matrix computation: which episode, which frames, and
/// whether the loaded buffer should be reversed afterward (used by the boundary
/// finder's right-edge zoom, which walks a window from its far corner inward).
#[derive(Clone, Debug)]
pub struct LoadSpec {
    pub episode: Episode,
    pub frames: FrameList,
    pub reversed: bool,
}

impl LoadSpec {
    pub fn new(episode: Episode, frames: FrameList) -> Self {
        Self {
            episode,
            frames,
            reversed: false,
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    fn load(&self, resolution: Resolution) -> CoreResult<Vec<RgbImage>> {
        let mut thumbs = match &self.frames {
            FrameList::Indexed(indexes) => {
                self.episode.read_thumbnails(indexes, resolution)?
            }
            FrameList::Consecutive { start, count } => {
                self.episode.read_consecutive(*start, *count, resolution)?
            }
        };
        if self.reversed {
            thumbs.reverse();
        }
        Ok(thumbs)
    }
}

/// A pixel-distance aggregation over a pair of equally-sized thumbnails, normalized by
/// its theoretical maximum so every kernel's output lives in `[0,1]`.
pub trait DistanceKernel: Send + Sync {
    fn distance(&self, a: &RgbImage, b: &RgbImage) -> f64;
}

/// Sum of absolute per-channel differences, normalized by `h*w*3*255`.
pub struct L1Distance;

impl DistanceKernel for L1Distance {
    fn distance(&self, a: &RgbImage, b: &RgbImage) -> f64 {
        debug_assert_eq!(a.dimensions(), b.dimensions());
        let (w, h) = a.dimensions();
        let max = (h as f64) * (w as f64) * 3.0 * 255.0;
        if max == 0.0 {
            return 0.0;
        }
        let sum: i64 = a
            .pixels()
            .zip(b.pixels())
            .flat_map(|(pa, pb)| pa.0.iter().zip(pb.0.iter()))
            .map(|(&x, &y)| (x as i64 - y as i64).abs())
            .sum();
        (sum as f64 / max).clamp(0.0, 1.0)
    }
}

/// Euclidean (L2) distance over the flattened pixel tensor, normalized by
/// `sqrt(h*w*3*255^2)`.
pub struct L2Distance;

impl DistanceKernel for L2Distance {
    fn distance(&self, a: &RgbImage, b: &RgbImage) -> f64 {
        debug_assert_eq!(a.dimensions(), b.dimensions());
        let (w, h) = a.dimensions();
        let max = ((h as f64) * (w as f64) * 3.0 * 255.0 * 255.0).sqrt();
        if max == 0.0 {
            return 0.0;
        }
        let sum_sq: f64 = a
            .pixels()
            .zip(b.pixels())
            .flat_map(|(pa, pb)| pa.0.iter().zip(pb.0.iter()))
            .map(|(&x, &y)| {
                let d = x as f64 - y as f64;
                d * d
            })
            .sum();
        (sum_sq.sqrt() / max).clamp(0.0, 1.0)
    }
}

/// A dense rows x cols matrix of normalized distances, paired with an exclusion mask.
/// The reference algorithm this is grounded on marks an already-examined cell by
/// overwriting its value with the sentinel `2`, outside the matrix's own `[0,1]`
/// domain; this carries the same "don't consider this cell again" intent as an
/// explicit boolean instead, keeping every stored value a meaningful distance.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    excluded: Vec<bool>,
}

impl DistanceMatrix {
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), rows * cols);
        Self {
            rows,
            cols,
            values,
            excluded: vec![false; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        assert!(i < self.rows && j < self.cols);
        i * self.cols + j
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[self.idx(i, j)]
    }

    pub fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.excluded[self.idx(i, j)]
    }

    pub fn mark_excluded(&mut self, i: usize, j: usize) {
        let idx = self.idx(i, j);
        self.excluded[idx] = true;
    }

    /// The globally smallest non-excluded cell, or `None` if every cell has been
    /// excluded (or the matrix is empty).
    pub fn min_unexcluded(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..self.rows {
            for j in 0..self.cols {
                if self.is_excluded(i, j) {
                    continue;
                }
                let v = self.get(i, j);
                if best.map(|(_, _, bv)| v < bv).unwrap_or(true) {
                    best = Some((i, j, v));
                }
            }
        }
        best
    }

    /// Builds the diagonal-mean matrix: `Diag[i,j]` is the average of `values[i+k,j+k]`
    /// for `k` in `0..min(rows-i, cols-j)`. This rewards cells that start a long run of
    /// low distances along the diagonal, which is what a correctly time-aligned pair
    /// of episodes produces, over a single coincidentally-similar frame pair.
    pub fn diagonal_means(&self) -> DistanceMatrix {
        let mut out = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                let run = (self.rows - i).min(self.cols - j);
                let sum: f64 = (0..run).map(|k| self.get(i + k, j + k)).sum();
                out[i * self.cols + j] = sum / run as f64;
            }
        }
        DistanceMatrix::new(self.rows, self.cols, out)
    }

    /// The value at `(i,i)` for `i` in `0..min(rows,cols)`, for callers that compared
    /// two equal-length paired probe lists and only care about the matched pairs.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }
}

/// Loads both axes in parallel (one scoped worker per episode, since decoding is
/// sequential seek-heavy I/O) and computes the full distance matrix between them.
pub fn compute_matrix(
    kernel: &dyn DistanceKernel,
    a: &LoadSpec,
    b: &LoadSpec,
    resolution: Resolution,
) -> CoreResult<DistanceMatrix> {
    let shape_a = a.episode.frame_shape();
    let shape_b = b.episode.frame_shape();
    if shape_a != shape_b {
        return Err(CoreError::ShapeMismatch(shape_a, shape_b));
    }

    if a.frames.is_empty() || b.frames.is_empty() {
        return Ok(DistanceMatrix::new(a.frames.len(), b.frames.len(), vec![]));
    }

    let results = scoped_workers(|scope| {
        scope.spawn("distance-a", || a.load(resolution));
        scope.spawn("distance-b", || b.load(resolution));
    });

    let mut iter = results.into_iter();
    let thumbs_a = iter
        .next()
        .unwrap()
        .result
        .map_err(|p| CoreError::WorkerPanic(p.to_string()))??;
    let thumbs_b = iter
        .next()
        .unwrap()
        .result
        .map_err(|p| CoreError::WorkerPanic(p.to_string()))??;

    let rows = thumbs_a.len();
    let cols = thumbs_b.len();
    let mut values = Vec::with_capacity(rows * cols);
    for ta in &thumbs_a {
        for tb in &thumbs_b {
            values.push(kernel.distance(ta, tb));
        }
    }

    Ok(DistanceMatrix::new(rows, cols, values))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame_source::synthetic::SyntheticSource;
    use std::{path::PathBuf, sync::Arc};

    fn episode(frame_count: u64, offset: i64) -> Episode {
        Episode::from_source(
            PathBuf::from(format!("synthetic-{offset}")),
            Arc::new(SyntheticSource::with_content_map(frame_count, 24.0, move |idx| {
                (idx as i64 - offset).max(0) as u64
            })),
        )
    }

    #[test]
    fn distances_are_bounded_and_zero_on_identical_content() {
        let e1 = episode(100, 0);
        let e2 = episode(100, 0);
        let spec1 = LoadSpec::new(e1, FrameList::Indexed(vec![10, 20, 30]));
        let spec2 = LoadSpec::new(e2, FrameList::Indexed(vec![10, 20, 30]));
        let resolution = Resolution::new(8, 8);

        for kernel in [&L1Distance as &dyn DistanceKernel, &L2Distance] {
            let m = compute_matrix(kernel, &spec1, &spec2, resolution).unwrap();
            for i in 0..3 {
                for j in 0..3 {
                    let v = m.get(i, j);
                    assert!((0.0..=1.0).contains(&v));
                    if i == j {
                        assert_eq!(v, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn diagonal_means_reward_long_runs() {
        // values: a 3x3 matrix where the (0,0) diagonal is all zero and the (0,1)
        // diagonal is all one.
        let values = vec![0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let m = DistanceMatrix::new(3, 3, values);
        let diag = m.diagonal_means();
        assert_eq!(diag.get(0, 0), 0.0);
        assert_eq!(diag.get(0, 1), 1.0);
    }

    #[test]
    fn min_unexcluded_skips_marked_cells() {
        let values = vec![0.5, 0.1, 0.9, 0.2];
        let mut m = DistanceMatrix::new(2, 2, values);
        assert_eq!(m.min_unexcluded(), Some((0, 1, 0.1)));
        m.mark_excluded(0, 1);
        assert_eq!(m.min_unexcluded(), Some((1, 1, 0.2)));
    }

    #[test]
    fn shape_mismatch_is_rejected_before_decoding() {
        let e1 = Episode::from_source(
            PathBuf::from("a"),
            Arc::new(SyntheticSource::new(10, 24.0)),
        );
        struct Wide(SyntheticSource);
        impl crate::frame_source::FrameSource for Wide {
            fn frame_count(&self) -> u64 {
                self.0.frame_count()
            }
            fn fps(&self) -> f64 {
                self.0.fps()
            }
            fn frame_shape(&self) -> crate::frame_source::FrameShape {
                crate::frame_source::FrameShape {
                    height: 480,
                    width: 854,
                    channels: 3,
                }
            }
            fn read_thumbnails(
                &self,
                indexes: &[u64],
                resolution: Resolution,
            ) -> Result<Vec<RgbImage>, crate::frame_source::SourceError> {
                self.0.read_thumbnails(indexes, resolution)
            }
            fn read_consecutive(
                &self,
                start: u64,
                count: u64,
                resolution: Resolution,
            ) -> Result<Vec<RgbImage>, crate::frame_source::SourceError> {
                self.0.read_consecutive(start, count, resolution)
            }
        }
        let e2 = Episode::from_source(
            PathBuf::from("b"),
            Arc::new(Wide(SyntheticSource::new(10, 24.0))),
        );

        let spec1 = LoadSpec::new(e1, FrameList::Indexed(vec![0]));
        let spec2 = LoadSpec::new(e2, FrameList::Indexed(vec![0]));
        let err = compute_matrix(&L1Distance, &spec1, &spec2, Resolution::new(8, 8))
            .unwrap_err();
        assert!(matches!(err, CoreError::ShapeMismatch(_, _)));
    }
}
