//! Reduce a group of performers to one representative pose sequence.
//!
//! Performer slots are assigned by detection order within each frame, so the
//! average is an ensemble approximation: it describes the shape of the group
//! as a whole and says nothing about any single dancer.

use crate::{
    error::{check_dim, Error, Result},
    pose::{MultiPersonSequences, PoseSequence},
};
use ndarray::Array2;
use num_traits::cast::ToPrimitive;
use tracing::debug;

/// Elementwise mean over all non-empty performers, trimmed to the shortest
/// of them.
///
/// With no usable performer this is a single zero frame of width `dim`.
pub fn average_group_pose(people: &MultiPersonSequences, dim: usize) -> Result<PoseSequence> {
    let performers = people
        .values()
        .filter(|seq| !seq.is_empty())
        .collect::<Vec<_>>();

    let len = match performers.iter().map(|seq| seq.len()).min() {
        Some(len) => len,
        None => return Ok(PoseSequence::zeros(1, dim)),
    };
    let dim = performers[0].dim();
    let mut sum = Array2::<f64>::zeros((len, dim));
    for seq in &performers {
        check_dim(dim, seq.dim())?;
        sum += &seq.frames().slice(ndarray::s![..len, ..]);
    }
    let count = performers.len().to_f64().ok_or(Error::ConvertToF64)?;
    debug!(
        message = "averaged group",
        performers = performers.len(),
        frames = len
    );
    PoseSequence::new(sum / count)
}

/// Mean over performers of the variance of each performer's keypoint values.
pub fn motion_variance(people: &MultiPersonSequences) -> Result<f64> {
    let variances = people
        .values()
        .filter(|seq| !seq.is_empty())
        .map(PoseSequence::variance)
        .collect::<Vec<_>>();
    if variances.is_empty() {
        return Ok(0.0);
    }
    let count = variances.len().to_f64().ok_or(Error::ConvertToF64)?;
    Ok(variances.iter().sum::<f64>() / count)
}

#[cfg(test)]
mod tests {
    use super::{average_group_pose, motion_variance};
    use crate::{
        error::Error,
        pose::{MultiPersonSequences, PoseSequence},
    };
    use assert_approx_eq::assert_approx_eq;
    use ndarray::{array, Array2};

    fn constant(len: usize, dim: usize, value: f64) -> PoseSequence {
        PoseSequence::new(Array2::from_elem((len, dim), value)).unwrap()
    }

    #[test]
    fn trims_to_shortest_performer() {
        let people: MultiPersonSequences = vec![
            (0, constant(8, 4, 0.3)),
            (1, constant(10, 4, 0.3)),
            (2, constant(12, 4, 0.3)),
        ]
        .into_iter()
        .collect();
        let avg = average_group_pose(&people, 4).unwrap();
        assert_eq!(avg.len(), 8);
        for &v in avg.frames().iter() {
            assert_approx_eq!(v, 0.3);
        }
    }

    #[test]
    fn averages_elementwise() {
        let people: MultiPersonSequences = vec![
            (0, PoseSequence::new(array![[0.0, 1.0], [2.0, 3.0]]).unwrap()),
            (3, PoseSequence::new(array![[2.0, 3.0], [4.0, 5.0], [9.0, 9.0]]).unwrap()),
        ]
        .into_iter()
        .collect();
        let avg = average_group_pose(&people, 2).unwrap();
        assert_eq!(avg.into_inner(), array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn empty_performers_are_ignored() {
        let people: MultiPersonSequences = vec![
            (0, PoseSequence::empty(2)),
            (1, constant(5, 2, 1.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(average_group_pose(&people, 2).unwrap().len(), 5);
    }

    #[test]
    fn no_performers_yield_single_zero_frame() {
        let avg = average_group_pose(&MultiPersonSequences::new(), 99).unwrap();
        assert_eq!(avg.into_inner(), Array2::<f64>::zeros((1, 99)));
    }

    #[test]
    fn mixed_widths_are_rejected() {
        let people: MultiPersonSequences = vec![(0, constant(2, 99, 0.0)), (1, constant(2, 34, 0.0))]
            .into_iter()
            .collect();
        assert!(matches!(
            average_group_pose(&people, 99),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn motion_variance_is_mean_of_performers() {
        let people: MultiPersonSequences = vec![
            (0, PoseSequence::new(array![[0.0, 2.0]]).unwrap()),
            (1, constant(3, 2, 0.7)),
            (2, PoseSequence::empty(2)),
        ]
        .into_iter()
        .collect();
        assert_approx_eq!(motion_variance(&people).unwrap(), 0.5);
        assert_approx_eq!(motion_variance(&MultiPersonSequences::new()).unwrap(), 0.0);
    }
}
