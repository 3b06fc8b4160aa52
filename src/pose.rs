use crate::error::{check_dim, Error, Result};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use num_traits::cast::ToPrimitive;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Range};

/// Body landmarks, numbered the way MediaPipe Pose emits them.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    num_derive::ToPrimitive,
)]
pub enum Landmark {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl Landmark {
    pub fn idx(self) -> Result<usize> {
        self.to_usize().ok_or(Error::LandmarkVariantToUSize(self))
    }
}

pub const NUM_MEDIAPIPE_LANDMARKS: usize = 33;
pub const NUM_COCO_KEYPOINTS: usize = 17;

/// The flattened keypoint layout produced by the upstream pose model.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// 33 landmarks with x, y, z.
    MediaPipe33,
    /// 17 COCO keypoints with x, y.
    Coco17,
}

impl Default for Layout {
    fn default() -> Self {
        Self::MediaPipe33
    }
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mediapipe" | "mediapipe33" | "media_pipe33" => Ok(Self::MediaPipe33),
            "coco" | "coco17" => Ok(Self::Coco17),
            other => Err(format!("unknown keypoint layout: {}", other)),
        }
    }
}

impl Layout {
    pub fn num_joints(self) -> usize {
        match self {
            Self::MediaPipe33 => NUM_MEDIAPIPE_LANDMARKS,
            Self::Coco17 => NUM_COCO_KEYPOINTS,
        }
    }

    pub fn coords_per_joint(self) -> usize {
        match self {
            Self::MediaPipe33 => 3,
            Self::Coco17 => 2,
        }
    }

    /// Number of values in one flattened frame.
    pub fn dim(self) -> usize {
        self.num_joints() * self.coords_per_joint()
    }

    /// Position of `landmark` among this layout's joints.
    pub fn joint_index(self, landmark: Landmark) -> Result<usize> {
        use Landmark::*;

        match self {
            Self::MediaPipe33 => landmark.idx(),
            Self::Coco17 => match landmark {
                Nose => Ok(0),
                LeftEye => Ok(1),
                RightEye => Ok(2),
                LeftEar => Ok(3),
                RightEar => Ok(4),
                LeftShoulder => Ok(5),
                RightShoulder => Ok(6),
                LeftElbow => Ok(7),
                RightElbow => Ok(8),
                LeftWrist => Ok(9),
                RightWrist => Ok(10),
                LeftHip => Ok(11),
                RightHip => Ok(12),
                LeftKnee => Ok(13),
                RightKnee => Ok(14),
                LeftAnkle => Ok(15),
                RightAnkle => Ok(16),
                other => Err(Error::LandmarkNotInLayout(other, self)),
            },
        }
    }

    /// The flattened dimensions holding `landmark`'s coordinates.
    pub fn dims(self, landmark: Landmark) -> Result<Range<usize>> {
        let coords = self.coords_per_joint();
        let start = self.joint_index(landmark)? * coords;
        Ok(start..start + coords)
    }
}

fn not_nan(value: f64) -> Result<f64> {
    Ok(NotNan::new(value)
        .map_err(|e| Error::ConstructNotNan(e, value))?
        .into_inner())
}

/// Per-frame keypoint vectors for one performer, one row per frame.
///
/// An empty sequence still knows its frame width so that fallbacks can
/// produce correctly sized frames.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSequence {
    frames: Array2<f64>,
}

impl PoseSequence {
    /// Wrap a `(frames, dim)` array, rejecting NaN coordinates.
    pub fn new(frames: Array2<f64>) -> Result<Self> {
        frames.iter().try_for_each(|&v| not_nan(v).map(drop))?;
        Ok(Self { frames })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            frames: Array2::zeros((0, dim)),
        }
    }

    pub fn zeros(len: usize, dim: usize) -> Self {
        Self {
            frames: Array2::zeros((len, dim)),
        }
    }

    /// Build a sequence from flattened rows that must all be `dim` wide.
    pub fn from_rows(rows: Vec<Vec<f64>>, dim: usize) -> Result<Self> {
        let len = rows.len();
        let mut flat = Vec::with_capacity(len * dim);
        for (frame, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(Error::RaggedFrame {
                    frame,
                    expected: dim,
                    actual: row.len(),
                });
            }
            for value in row {
                flat.push(not_nan(value)?);
            }
        }
        let frames = Array2::from_shape_vec((len, dim), flat).map_err(Error::ConstructSequence)?;
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values per frame.
    pub fn dim(&self) -> usize {
        self.frames.ncols()
    }

    pub fn frames(&self) -> ArrayView2<'_, f64> {
        self.frames.view()
    }

    pub fn frame(&self, index: usize) -> ArrayView1<'_, f64> {
        self.frames.row(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> + '_ {
        self.frames.axis_iter(Axis(0))
    }

    /// The first `len` frames (or all of them if there are fewer).
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.len());
        Self {
            frames: self.frames.slice(s![..len, ..]).to_owned(),
        }
    }

    /// Population variance over every value of every frame, 0 when empty.
    pub fn variance(&self) -> f64 {
        if self.frames.is_empty() {
            0.0
        } else {
            self.frames.var(0.0)
        }
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.frames
    }

    pub(crate) fn check_same_dim(&self, other: &Self) -> Result<()> {
        check_dim(self.dim(), other.dim())
    }
}

/// Per-performer sequences keyed by detection slot.
///
/// Slots are positional: slot 0 is whichever body the detector listed first
/// in each frame, so a slot is not guaranteed to follow one individual.
pub type MultiPersonSequences = BTreeMap<usize, PoseSequence>;

/// Distribute per-frame detections into performer slots by detection order.
///
/// `detections[f]` holds the bodies found in frame `f`. Bodies beyond
/// `max_people` are ignored and slots that never receive a body are omitted.
pub fn assign_slots(
    detections: &[Vec<Vec<f64>>],
    max_people: usize,
    dim: usize,
) -> Result<MultiPersonSequences> {
    let mut slots: BTreeMap<usize, Vec<Vec<f64>>> = BTreeMap::new();
    for bodies in detections {
        for (slot, body) in bodies.iter().take(max_people).enumerate() {
            slots.entry(slot).or_default().push(body.clone());
        }
    }
    slots
        .into_iter()
        .map(|(slot, rows)| Ok((slot, PoseSequence::from_rows(rows, dim)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{assign_slots, Landmark, Layout, PoseSequence};
    use crate::error::Error;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    #[test]
    fn landmark_indices_follow_mediapipe_order() {
        assert_eq!(Landmark::Nose.idx().unwrap(), 0);
        assert_eq!(Landmark::LeftShoulder.idx().unwrap(), 11);
        assert_eq!(Landmark::RightAnkle.idx().unwrap(), 28);
        assert_eq!(Landmark::RightFootIndex.idx().unwrap(), 32);
    }

    #[test]
    fn layout_dims() {
        assert_eq!(Layout::MediaPipe33.dim(), 99);
        assert_eq!(Layout::Coco17.dim(), 34);
        assert_eq!(Layout::MediaPipe33.dims(Landmark::LeftElbow).unwrap(), 39..42);
        assert_eq!(Layout::Coco17.dims(Landmark::LeftElbow).unwrap(), 14..16);
        assert!(matches!(
            Layout::Coco17.dims(Landmark::LeftHeel),
            Err(Error::LandmarkNotInLayout(Landmark::LeftHeel, Layout::Coco17))
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let result = PoseSequence::from_rows(vec![vec![0.0, 1.0], vec![0.0]], 2);
        assert!(matches!(
            result,
            Err(Error::RaggedFrame {
                frame: 1,
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn nan_coordinates_are_rejected() {
        let result = PoseSequence::from_rows(vec![vec![0.0, f64::NAN]], 2);
        assert!(matches!(result, Err(Error::ConstructNotNan(..))));
        assert!(PoseSequence::new(array![[f64::NAN]]).is_err());
    }

    #[test]
    fn empty_sequence_keeps_width() {
        let seq = PoseSequence::from_rows(vec![], 99).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.dim(), 99);
        assert_approx_eq!(seq.variance(), 0.0);
    }

    #[test]
    fn truncated_never_grows() {
        let seq = PoseSequence::new(array![[1.0], [2.0], [3.0]]).unwrap();
        assert_eq!(seq.truncated(2).into_inner(), array![[1.0], [2.0]]);
        assert_eq!(seq.truncated(10).len(), 3);
    }

    #[test]
    fn variance_covers_all_values() {
        let seq = PoseSequence::new(array![[0.0, 2.0], [0.0, 2.0]]).unwrap();
        assert_approx_eq!(seq.variance(), 1.0);
    }

    #[test]
    fn slots_are_assigned_by_detection_order() {
        let detections = vec![
            vec![vec![0.0, 0.0], vec![1.0, 1.0]],
            vec![vec![2.0, 2.0]],
            vec![vec![3.0, 3.0], vec![4.0, 4.0], vec![5.0, 5.0]],
        ];
        let people = assign_slots(&detections, 2, 2).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(
            people[&0].clone().into_inner(),
            array![[0.0, 0.0], [2.0, 2.0], [3.0, 3.0]]
        );
        assert_eq!(people[&1].clone().into_inner(), array![[1.0, 1.0], [4.0, 4.0]]);
    }
}
