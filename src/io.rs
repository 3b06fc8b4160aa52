//! Reading keypoint sequences written by the pose extractor.
//!
//! A solo file is a JSON array of frames, each an array of numbers. A group
//! file is an object holding either `performers`, one frame array per
//! performer, or `detections`, the bodies found in each frame in detection
//! order.

use crate::{
    error::{check_dim, Error, Result},
    pose::{assign_slots, MultiPersonSequences, PoseSequence},
};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

type Frames = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GroupFile {
    Performers(Vec<Frames>),
    Detections(Vec<Vec<Vec<f64>>>),
}

fn read<T, P>(path: P) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::ReadSequence(e, path.to_owned()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::ParseSequence(e, path.to_owned()))
}

/// Width of the first frame, or `dim` when there are none.
fn frame_width<'a, I>(mut rows: I, dim: usize) -> usize
where
    I: Iterator<Item = &'a Vec<f64>>,
{
    rows.next().map_or(dim, Vec::len)
}

/// Parse a solo sequence whose frames must be `dim` values wide.
pub fn parse_sequence(json: &str, dim: usize) -> Result<PoseSequence> {
    let rows: Frames = serde_json::from_str(json).map_err(Error::ParseJson)?;
    sequence_from_rows(rows, dim)
}

fn sequence_from_rows(rows: Frames, dim: usize) -> Result<PoseSequence> {
    check_dim(dim, frame_width(rows.iter(), dim))?;
    PoseSequence::from_rows(rows, dim)
}

pub fn load_sequence<P>(path: P, dim: usize) -> Result<PoseSequence>
where
    P: AsRef<Path>,
{
    let rows: Frames = read(path.as_ref())?;
    let seq = sequence_from_rows(rows, dim)?;
    debug!(message = "loaded sequence", path = ?path.as_ref(), frames = seq.len(), dim = seq.dim());
    Ok(seq)
}

fn group_from_file(file: GroupFile, dim: usize, max_people: usize) -> Result<MultiPersonSequences> {
    match file {
        GroupFile::Performers(performers) => {
            let mut people = MultiPersonSequences::new();
            for (slot, rows) in performers.into_iter().take(max_people).enumerate() {
                if rows.is_empty() {
                    continue;
                }
                people.insert(slot, sequence_from_rows(rows, dim)?);
            }
            Ok(people)
        }
        GroupFile::Detections(detections) => {
            check_dim(dim, frame_width(detections.iter().flatten(), dim))?;
            assign_slots(&detections, max_people, dim)
        }
    }
}

pub fn parse_group(json: &str, dim: usize, max_people: usize) -> Result<MultiPersonSequences> {
    let file: GroupFile = serde_json::from_str(json).map_err(Error::ParseJson)?;
    group_from_file(file, dim, max_people)
}

pub fn load_group<P>(path: P, dim: usize, max_people: usize) -> Result<MultiPersonSequences>
where
    P: AsRef<Path>,
{
    let file: GroupFile = read(path.as_ref())?;
    let people = group_from_file(file, dim, max_people)?;
    debug!(message = "loaded group", path = ?path.as_ref(), performers = people.len());
    Ok(people)
}

#[cfg(test)]
mod tests {
    use super::{parse_group, parse_sequence};
    use crate::error::Error;
    use ndarray::array;

    #[test]
    fn solo_sequence() {
        let seq = parse_sequence("[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]", 3).unwrap();
        assert_eq!(seq.into_inner(), array![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]);
    }

    #[test]
    fn empty_solo_sequence_uses_layout_width() {
        let seq = parse_sequence("[]", 34).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.dim(), 34);
    }

    #[test]
    fn frames_must_match_layout_width() {
        let row = serde_json::to_string(&vec![0.5; 99]).unwrap();
        let wide = format!("[{}, {}]", row, row);
        assert!(matches!(
            parse_sequence(&wide, 34),
            Err(Error::DimensionMismatch {
                expected: 34,
                actual: 99
            })
        ));
        assert!(matches!(
            parse_group(r#"{"performers": [[[1.0, 2.0, 3.0]]]}"#, 2, 5),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(matches!(
            parse_group(r#"{"detections": [[[1.0, 2.0, 3.0]]]}"#, 2, 5),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn ragged_solo_sequence() {
        assert!(matches!(
            parse_sequence("[[0.1, 0.2], [0.3]]", 2),
            Err(Error::RaggedFrame { frame: 1, .. })
        ));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            parse_sequence("[[0.1, \"x\"]]", 2),
            Err(Error::ParseJson(..))
        ));
    }

    #[test]
    fn group_of_performers_skips_empty_slots() {
        let people = parse_group(
            r#"{"performers": [[[1.0, 2.0]], [], [[3.0, 4.0], [5.0, 6.0]]]}"#,
            2,
            5,
        )
        .unwrap();
        assert_eq!(people.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(people[&2].len(), 2);
    }

    #[test]
    fn group_of_detections_limits_people() {
        let people = parse_group(
            r#"{"detections": [[[1.0], [2.0], [3.0]], [[4.0]], []]}"#,
            1,
            2,
        )
        .unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[&0].clone().into_inner(), array![[1.0], [4.0]]);
        assert_eq!(people[&1].clone().into_inner(), array![[2.0]]);
    }
}
