use crate::{
    error::{Error, Result},
    pose::{Landmark, Layout, PoseSequence},
};
use ndarray::Axis;
use num_traits::cast::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deviation above which a body region gets a targeted suggestion.
pub const DEFAULT_REGION_THRESHOLD: f64 = 0.04;

/// Anatomical regions that feedback is written for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BodyRegion {
    #[serde(rename = "tay")]
    Arms,
    #[serde(rename = "chan")]
    Legs,
    #[serde(rename = "than_tren")]
    UpperBody,
}

impl BodyRegion {
    pub const ALL: [BodyRegion; 3] = [Self::Arms, Self::Legs, Self::UpperBody];

    /// Stable key used in reports.
    pub fn key(self) -> &'static str {
        match self {
            Self::Arms => "tay",
            Self::Legs => "chan",
            Self::UpperBody => "than_tren",
        }
    }

    fn landmarks(self) -> &'static [Landmark] {
        use Landmark::*;

        match self {
            Self::Arms => &[LeftElbow, RightElbow, LeftWrist, RightWrist],
            Self::Legs => &[LeftKnee, RightKnee, LeftAnkle, RightAnkle],
            Self::UpperBody => &[LeftShoulder, RightShoulder, LeftHip, RightHip],
        }
    }
}

/// A body region and the flattened frame dimensions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointGroup {
    pub region: BodyRegion,
    pub dims: Vec<usize>,
}

impl JointGroup {
    pub fn new(region: BodyRegion, dims: Vec<usize>) -> Self {
        Self { region, dims }
    }

    /// Collect every coordinate of `landmarks` under `layout`.
    pub fn from_landmarks(
        region: BodyRegion,
        landmarks: &[Landmark],
        layout: Layout,
    ) -> Result<Self> {
        let mut dims = Vec::with_capacity(landmarks.len() * layout.coords_per_joint());
        for &landmark in landmarks {
            dims.extend(layout.dims(landmark)?);
        }
        Ok(Self { region, dims })
    }
}

/// Mean absolute deviation per body region.
pub type RegionDeviations = BTreeMap<BodyRegion, f64>;

/// The joint groups configured for one keypoint layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointGroups {
    groups: Vec<JointGroup>,
}

/// MediaPipe landmark indices of each region, in `BodyRegion::landmarks` order.
const MEDIAPIPE_GROUPS: [(BodyRegion, [usize; 4]); 3] = [
    (BodyRegion::Arms, [13, 14, 15, 16]),
    (BodyRegion::Legs, [25, 26, 27, 28]),
    (BodyRegion::UpperBody, [11, 12, 23, 24]),
];

impl Default for JointGroups {
    /// The MediaPipe groups.
    fn default() -> Self {
        let coords = Layout::MediaPipe33.coords_per_joint();
        Self::new(
            MEDIAPIPE_GROUPS
                .iter()
                .map(|(region, joints)| {
                    let dims = joints
                        .iter()
                        .flat_map(|&joint| joint * coords..(joint + 1) * coords)
                        .collect();
                    JointGroup::new(*region, dims)
                })
                .collect(),
        )
    }
}

impl JointGroups {
    pub fn new(groups: Vec<JointGroup>) -> Self {
        Self { groups }
    }

    /// The standard arm, leg and upper body groups for `layout`.
    pub fn for_layout(layout: Layout) -> Result<Self> {
        BodyRegion::ALL
            .iter()
            .map(|&region| JointGroup::from_landmarks(region, region.landmarks(), layout))
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    pub fn groups(&self) -> &[JointGroup] {
        &self.groups
    }

    /// Mean absolute difference between `standard` and `user` for each group,
    /// taken over all frames and all of the group's dimensions.
    ///
    /// Both sequences are expected to have been brought to the same length
    /// with [`align_lengths`](crate::resample::align_lengths). Frames past the
    /// shorter one are ignored. Returns `Ok(None)` if either sequence is empty.
    pub fn analyze(
        &self,
        standard: &PoseSequence,
        user: &PoseSequence,
    ) -> Result<Option<RegionDeviations>> {
        standard.check_same_dim(user)?;
        let len = standard.len().min(user.len());
        if len == 0 {
            return Ok(None);
        }

        let dim = standard.dim();
        let diff = (&standard.truncated(len).frames() - &user.truncated(len).frames())
            .mapv(f64::abs);

        let mut deviations = RegionDeviations::new();
        for group in &self.groups {
            if let Some(&index) = group.dims.iter().find(|&&index| index >= dim) {
                return Err(Error::IndexOutOfRange {
                    group: group.region.key().to_owned(),
                    index,
                    dim,
                });
            }
            let selected = diff.select(Axis(1), &group.dims);
            let count = selected.len().to_f64().ok_or(Error::ConvertToF64)?;
            let mean = if selected.is_empty() {
                0.0
            } else {
                selected.sum() / count
            };
            deviations.insert(group.region, mean);
        }
        Ok(Some(deviations))
    }
}

/// Regions whose deviation exceeds `threshold`, in region order.
pub fn flagged_regions(deviations: &RegionDeviations, threshold: f64) -> Vec<BodyRegion> {
    deviations
        .iter()
        .filter(|(_, deviation)| **deviation > threshold)
        .map(|(&region, _)| region)
        .collect()
}
