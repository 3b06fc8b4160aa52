//! Scoring dance performances from pose keypoint sequences.
//!
//! A performance is a [`PoseSequence`]: one row of flattened keypoint
//! coordinates per frame. An [`Analyzer`] compares a performer (or a group of
//! performers) against a reference and produces a [`Report`] with an overall
//! score, a per-frame timeline, per-region deviations and written feedback.

pub mod compare;
pub mod distance;
pub mod error;
pub mod feedback;
pub mod group;
pub mod io;
pub mod joints;
pub mod pose;
pub mod resample;
pub mod score;

pub use compare::{compare_dance_group, compare_dances, frame_similarity, Analyzer, Report};
pub use error::{Error, Result};
pub use feedback::{FeedbackBackend, FeedbackChain, FeedbackConfig};
pub use joints::{BodyRegion, JointGroups};
pub use pose::{Landmark, Layout, MultiPersonSequences, PoseSequence};
pub use score::ScoreConfig;
