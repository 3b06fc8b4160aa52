use crate::{
    error::{Error, Result},
    pose::PoseSequence,
};
use ndarray::{Array2, ArrayView1};
use num_traits::cast::ToPrimitive;
use serde::Serialize;
use tracing::{debug, instrument};

/// Euclidean norm of the difference between two frames.
pub fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Cosine distance `1 - cos(a, b)`, or `None` when either frame has zero norm.
pub fn cosine_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(1.0 - a.dot(&b) / (norm_a * norm_b))
}

/// Distance between equally indexed frames, over the shorter of the two
/// sequences. No resampling is done.
pub fn frame_distances(a: &PoseSequence, b: &PoseSequence) -> Result<Vec<f64>> {
    a.check_same_dim(b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| euclidean(x, y)).collect())
}

/// Mean cosine distance over equally indexed frames.
///
/// Returns `Ok(None)` when the sequences share no frames or when any frame
/// pair contains a zero vector, so callers can pick a fallback measure.
pub fn mean_cosine_distance(a: &PoseSequence, b: &PoseSequence) -> Result<Option<f64>> {
    a.check_same_dim(b)?;
    let distances = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| cosine_distance(x, y))
        .collect::<Option<Vec<_>>>();
    match distances {
        Some(distances) if !distances.is_empty() => {
            let n = distances.len().to_f64().ok_or(Error::ConvertToF64)?;
            Ok(Some(distances.iter().sum::<f64>() / n))
        }
        _ => Ok(None),
    }
}

/// The outcome of aligning two sequences with dynamic time warping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DtwAlignment {
    /// Accumulated cost of the optimal warping path.
    pub cost: f64,
    /// `cost` divided by the summed sequence lengths.
    pub normalized: f64,
    /// Matched `(a, b)` frame indices from the first frames to the last.
    pub path: Vec<(usize, usize)>,
}

impl DtwAlignment {
    fn empty() -> Self {
        Self {
            cost: 0.0,
            normalized: 0.0,
            path: Vec::new(),
        }
    }
}

/// Dynamic time warping over Euclidean frame distances.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dtw {
    /// Sakoe-Chiba band half-width. `None` searches the full matrix.
    ///
    /// The band is widened to the length difference of the inputs so that
    /// the final cell stays reachable.
    pub window: Option<usize>,
}

impl Dtw {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: Some(window),
        }
    }

    #[instrument(
        name = "Dtw::align",
        skip(self, a, b),
        fields(len_a = a.len(), len_b = b.len()),
        level = "debug"
    )]
    pub fn align(&self, a: &PoseSequence, b: &PoseSequence) -> Result<DtwAlignment> {
        a.check_same_dim(b)?;
        let (len_a, len_b) = (a.len(), b.len());
        if len_a == 0 || len_b == 0 {
            return Ok(DtwAlignment::empty());
        }

        let band = self
            .window
            .map_or(usize::MAX, |w| w.max(len_a.max(len_b) - len_a.min(len_b)));

        let mut cost = Array2::from_elem((len_a + 1, len_b + 1), f64::INFINITY);
        cost[(0, 0)] = 0.0;
        for i in 1..=len_a {
            let lo = i.saturating_sub(band).max(1);
            let hi = i.saturating_add(band).min(len_b);
            for j in lo..=hi {
                let d = euclidean(a.frame(i - 1), b.frame(j - 1));
                let best = cost[(i - 1, j)]
                    .min(cost[(i, j - 1)])
                    .min(cost[(i - 1, j - 1)]);
                cost[(i, j)] = d + best;
            }
        }

        let total = cost[(len_a, len_b)];
        let normalized = total / (len_a + len_b).to_f64().ok_or(Error::ConvertToF64)?;
        let path = backtrack(&cost);
        debug!(message = "aligned", cost = total, normalized, steps = path.len());

        Ok(DtwAlignment {
            cost: total,
            normalized,
            path,
        })
    }
}

/// Walk the accumulated cost matrix back from the final cell.
fn backtrack(cost: &Array2<f64>) -> Vec<(usize, usize)> {
    let (mut i, mut j) = (cost.nrows() - 1, cost.ncols() - 1);
    let mut path = Vec::with_capacity(i + j);
    while i > 0 && j > 0 {
        path.push((i - 1, j - 1));
        let diagonal = cost[(i - 1, j - 1)];
        let up = cost[(i - 1, j)];
        let left = cost[(i, j - 1)];
        if diagonal <= up && diagonal <= left {
            i -= 1;
            j -= 1;
        } else if up <= left {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    path.reverse();
    path
}
