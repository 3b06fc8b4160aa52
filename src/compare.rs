use crate::{
    distance::{frame_distances, mean_cosine_distance, Dtw},
    error::{check_dim, Result},
    feedback::{
        region_feedback, FeedbackChain, FeedbackMetrics, INSUFFICIENT_DATA, NO_COMPARISON_DATA,
    },
    group::{average_group_pose, motion_variance},
    joints::{JointGroups, RegionDeviations, DEFAULT_REGION_THRESHOLD},
    pose::{MultiPersonSequences, PoseSequence},
    resample::align_lengths,
    score::ScoreConfig,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Whole-performance score from the accumulated DTW cost. 0 when either side
/// has no frames.
pub fn compare_dances(
    standard: &PoseSequence,
    user: &PoseSequence,
    config: &ScoreConfig,
) -> Result<f64> {
    whole_sequence_score(&Dtw::default(), standard, user, config)
}

fn whole_sequence_score(
    dtw: &Dtw,
    standard: &PoseSequence,
    user: &PoseSequence,
    config: &ScoreConfig,
) -> Result<f64> {
    standard.check_same_dim(user)?;
    if standard.is_empty() || user.is_empty() {
        return Ok(0.0);
    }
    let alignment = dtw.align(standard, user)?;
    Ok(config.whole_sequence_score(alignment.cost))
}

/// Per-frame scores over the frames both sequences share.
pub fn frame_similarity(
    standard: &PoseSequence,
    user: &PoseSequence,
    config: &ScoreConfig,
) -> Result<Vec<f64>> {
    Ok(config.timeline_scores(&frame_distances(standard, user)?))
}

/// The intermediate values behind a group score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupScore {
    pub score: f64,
    /// Dissimilarity of the averaged sequences.
    pub diff: f64,
    /// Whether `diff` came from DTW because cosine distance was undefined.
    pub dtw_fallback: bool,
    pub var_standard: f64,
    pub var_user: f64,
}

fn first_dim(people: &MultiPersonSequences) -> Option<usize> {
    people.values().find(|seq| !seq.is_empty()).map(PoseSequence::dim)
}

/// Group score, or `None` when either side has no performer with frames.
pub fn score_group(
    standard: &MultiPersonSequences,
    user: &MultiPersonSequences,
    config: &ScoreConfig,
) -> Result<Option<(GroupScore, PoseSequence, PoseSequence)>> {
    score_group_with(&Dtw::default(), standard, user, config)
}

fn score_group_with(
    dtw: &Dtw,
    standard: &MultiPersonSequences,
    user: &MultiPersonSequences,
    config: &ScoreConfig,
) -> Result<Option<(GroupScore, PoseSequence, PoseSequence)>> {
    let (dim, user_dim) = match (first_dim(standard), first_dim(user)) {
        (Some(dim), Some(user_dim)) => (dim, user_dim),
        _ => return Ok(None),
    };
    check_dim(dim, user_dim)?;

    let seq_standard = average_group_pose(standard, dim)?;
    let seq_user = average_group_pose(user, dim)?;
    let len = seq_standard.len().min(seq_user.len());
    let (seq_standard, seq_user) = (seq_standard.truncated(len), seq_user.truncated(len));

    let (diff, dtw_fallback) = match mean_cosine_distance(&seq_standard, &seq_user)? {
        Some(diff) => (diff, false),
        None => {
            let alignment = dtw.align(&seq_standard, &seq_user)?;
            debug!(
                message = "cosine distance undefined, using DTW",
                normalized = alignment.normalized
            );
            (alignment.normalized / config.fallback_divisor, true)
        }
    };

    let var_standard = motion_variance(standard)?;
    let var_user = motion_variance(user)?;
    let score = config.group_score(diff, var_standard, var_user);
    Ok(Some((
        GroupScore {
            score,
            diff,
            dtw_fallback,
            var_standard,
            var_user,
        },
        seq_standard,
        seq_user,
    )))
}

/// Group score from every performer on each side. 0 when either side has no
/// performer with frames.
pub fn compare_dance_group(
    standard: &MultiPersonSequences,
    user: &MultiPersonSequences,
    config: &ScoreConfig,
) -> Result<f64> {
    Ok(score_group(standard, user, config)?.map_or(0.0, |(group, ..)| group.score))
}

/// Everything known about one comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Headline score, 0 to 100.
    pub score: f64,
    /// Per-frame scores, 0 to 100.
    pub timeline: Vec<f64>,
    /// Mean absolute deviation per body region.
    pub regions: Option<RegionDeviations>,
    pub metrics: Option<FeedbackMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupScore>,
    /// Suggestions derived from the body-region deviations.
    pub region_feedback: Vec<String>,
    /// Overall feedback from the configured generators.
    pub feedback: Vec<String>,
}

impl Report {
    /// The report for a comparison that had nothing to compare.
    pub fn insufficient_data() -> Self {
        Self {
            score: 0.0,
            timeline: Vec::new(),
            regions: None,
            metrics: None,
            group: None,
            region_feedback: vec![NO_COMPARISON_DATA.to_owned()],
            feedback: vec![INSUFFICIENT_DATA.to_owned()],
        }
    }

    /// Replace a failed comparison with the insufficient-data report.
    ///
    /// Layout mismatches are passed through since no other input of the run
    /// can succeed either.
    pub fn recover(result: Result<Report>) -> Result<Report> {
        match result {
            Err(error) if !error.is_layout_mismatch() => {
                warn!(message = "comparison failed, reporting insufficient data", %error);
                Ok(Self::insufficient_data())
            }
            other => other,
        }
    }
}

/// Scores performances and writes feedback with a fixed configuration.
pub struct Analyzer {
    scoring: ScoreConfig,
    joint_groups: JointGroups,
    region_threshold: f64,
    dtw: Dtw,
    feedback: FeedbackChain,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(
            ScoreConfig::default(),
            JointGroups::default(),
            FeedbackChain::default(),
        )
    }
}

impl Analyzer {
    pub fn new(scoring: ScoreConfig, joint_groups: JointGroups, feedback: FeedbackChain) -> Self {
        Self {
            scoring,
            joint_groups,
            region_threshold: DEFAULT_REGION_THRESHOLD,
            dtw: Dtw::default(),
            feedback,
        }
    }

    pub fn with_region_threshold(mut self, threshold: f64) -> Self {
        self.region_threshold = threshold;
        self
    }

    pub fn with_dtw(mut self, dtw: Dtw) -> Self {
        self.dtw = dtw;
        self
    }

    pub fn scoring(&self) -> &ScoreConfig {
        &self.scoring
    }

    /// Compare one performer against the reference.
    #[instrument(
        name = "Analyzer::analyze_solo",
        skip(self, standard, user),
        fields(standard = standard.len(), user = user.len())
    )]
    pub fn analyze_solo(&self, standard: &PoseSequence, user: &PoseSequence) -> Result<Report> {
        standard.check_same_dim(user)?;
        if standard.is_empty() || user.is_empty() {
            info!(message = "not enough frames to compare");
            return Ok(Report::insufficient_data());
        }

        let score = whole_sequence_score(&self.dtw, standard, user, &self.scoring)?;
        let timeline = frame_similarity(standard, user, &self.scoring)?;
        info!(message = "scored performance", score);
        self.report(standard, user, score, timeline, None)
    }

    /// Compare a group of performers against a reference group.
    #[instrument(
        name = "Analyzer::analyze_group",
        skip(self, standard, user),
        fields(standard = standard.len(), user = user.len())
    )]
    pub fn analyze_group(
        &self,
        standard: &MultiPersonSequences,
        user: &MultiPersonSequences,
    ) -> Result<Report> {
        let scored = score_group_with(&self.dtw, standard, user, &self.scoring)?;
        let (group, seq_standard, seq_user) = match scored {
            Some(scored) => scored,
            None => {
                info!(message = "no performers to compare");
                return Ok(Report::insufficient_data());
            }
        };
        let timeline = frame_similarity(&seq_standard, &seq_user, &self.scoring)?;
        info!(
            message = "scored group performance",
            score = group.score,
            diff = group.diff,
            dtw_fallback = group.dtw_fallback
        );
        self.report(&seq_standard, &seq_user, group.score, timeline, Some(group))
    }

    fn report(
        &self,
        standard: &PoseSequence,
        user: &PoseSequence,
        score: f64,
        timeline: Vec<f64>,
        group: Option<GroupScore>,
    ) -> Result<Report> {
        let (standard, user) = align_lengths(standard, user)?;
        let regions = self.joint_groups.analyze(&standard, &user)?;
        let metrics = FeedbackMetrics::from_sequences(&standard, &user, score)?;
        let feedback = match &metrics {
            Some(metrics) => self.feedback.generate(metrics),
            None => vec![INSUFFICIENT_DATA.to_owned()],
        };
        Ok(Report {
            score,
            timeline,
            region_feedback: region_feedback(regions.as_ref(), self.region_threshold)?,
            regions,
            metrics,
            group,
            feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        compare_dance_group, compare_dances, frame_similarity, score_group, Analyzer, Report,
    };
    use crate::{
        error::Error,
        feedback::INSUFFICIENT_DATA,
        joints::BodyRegion,
        pose::{MultiPersonSequences, PoseSequence},
        score::ScoreConfig,
    };
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array2;

    fn dance(len: usize, dim: usize) -> PoseSequence {
        PoseSequence::new(Array2::from_shape_fn((len, dim), |(i, d)| {
            0.5 + 0.3 * ((i as f64) * 0.4 + (d as f64) * 0.7).sin()
        }))
        .unwrap()
    }

    fn perturbed(seq: &PoseSequence, amount: f64) -> PoseSequence {
        PoseSequence::new(seq.frames().mapv(|v| v + amount)).unwrap()
    }

    fn group(sequences: Vec<PoseSequence>) -> MultiPersonSequences {
        sequences.into_iter().enumerate().collect()
    }

    mod solo_tests {
        use super::*;

        #[test]
        fn identical_sequences_score_perfectly() {
            let seq = dance(10, 99);
            assert_approx_eq!(compare_dances(&seq, &seq, &ScoreConfig::default()).unwrap(), 100.0);
        }

        #[test]
        fn empty_reference_scores_zero() {
            let config = ScoreConfig::default();
            let user = dance(10, 99);
            let empty = PoseSequence::empty(99);
            assert_approx_eq!(compare_dances(&empty, &user, &config).unwrap(), 0.0);
            assert_approx_eq!(compare_dances(&user, &empty, &config).unwrap(), 0.0);
            assert!(frame_similarity(&empty, &user, &config).unwrap().is_empty());
        }

        #[test]
        fn larger_perturbation_never_scores_higher() {
            let config = ScoreConfig::default();
            let seq = PoseSequence::new(Array2::from_shape_fn((40, 99), |(i, d)| {
                i as f64 + 0.01 * d as f64
            }))
            .unwrap();
            let mut previous = 100.0;
            for amount in [0.01, 0.05, 0.1, 0.2, 0.4] {
                let shifted = perturbed(&seq, amount);
                let score = compare_dances(&seq, &shifted, &config).unwrap();
                assert!(score <= previous, "{} > {}", score, previous);
                assert!((0.0..=100.0).contains(&score));
                previous = score;

                let timeline = frame_similarity(&seq, &shifted, &config).unwrap();
                assert!(timeline.iter().all(|s| (0.0..=100.0).contains(s)));
            }
            assert!(previous < 100.0);
        }

        #[test]
        fn timeline_matches_frame_count() {
            let config = ScoreConfig::default();
            let timeline = frame_similarity(&dance(12, 6), &dance(9, 6), &config).unwrap();
            assert_eq!(timeline.len(), 9);
            for score in timeline {
                assert_approx_eq!(score, 100.0);
            }
        }

        #[test]
        fn dimension_mismatch_is_an_error() {
            let result = compare_dances(&dance(5, 99), &dance(5, 34), &ScoreConfig::default());
            assert!(matches!(
                result,
                Err(Error::DimensionMismatch {
                    expected: 99,
                    actual: 34
                })
            ));
        }
    }

    mod group_tests {
        use super::*;

        #[test]
        fn identical_groups_score_perfectly() {
            let people = group(vec![dance(8, 6), dance(10, 6)]);
            assert_approx_eq!(
                compare_dance_group(&people, &people, &ScoreConfig::default()).unwrap(),
                100.0
            );
        }

        #[test]
        fn missing_performers_score_zero() {
            let config = ScoreConfig::default();
            let people = group(vec![dance(8, 6)]);
            let nobody = MultiPersonSequences::new();
            assert_approx_eq!(compare_dance_group(&nobody, &people, &config).unwrap(), 0.0);
            assert_approx_eq!(compare_dance_group(&people, &nobody, &config).unwrap(), 0.0);
            let empty_slot = group(vec![PoseSequence::empty(6)]);
            assert_approx_eq!(compare_dance_group(&people, &empty_slot, &config).unwrap(), 0.0);
        }

        #[test]
        fn zero_frames_fall_back_to_dtw() {
            let config = ScoreConfig::default();
            let standard = group(vec![PoseSequence::zeros(4, 3)]);
            let user = group(vec![PoseSequence::new(Array2::from_elem((4, 3), 0.1)).unwrap()]);
            let (scored, ..) = score_group(&standard, &user, &config).unwrap().unwrap();
            assert!(scored.dtw_fallback);
            // every frame pair is sqrt(0.03) apart over 4 diagonal steps
            let expected_diff = 4.0 * 0.03_f64.sqrt() / 8.0 / 100.0;
            assert_approx_eq!(scored.diff, expected_diff);
            assert!((0.0..=100.0).contains(&scored.score));
        }

        #[test]
        fn energy_mismatch_is_penalized() {
            let config = ScoreConfig::default();
            let calm = group(vec![PoseSequence::new(Array2::from_shape_fn((6, 4), |(i, _)| {
                1.0 + 0.01 * i as f64
            }))
            .unwrap()]);
            let wild = group(vec![PoseSequence::new(Array2::from_shape_fn((6, 4), |(i, _)| {
                1.0 + 0.3 * i as f64
            }))
            .unwrap()]);
            let (scored, ..) = score_group(&calm, &wild, &config).unwrap().unwrap();
            assert!(scored.var_user > scored.var_standard);
            assert_approx_eq!(scored.diff, 0.0);
            // the synchrony penalty bottoms out at 20%
            assert_approx_eq!(scored.score, 80.0);
        }
    }

    mod analyzer_tests {
        use super::*;

        #[test]
        fn insufficient_data_report() {
            let report = Analyzer::default()
                .analyze_solo(&PoseSequence::empty(99), &dance(10, 99))
                .unwrap();
            assert_approx_eq!(report.score, 0.0);
            assert_eq!(report.feedback, vec![INSUFFICIENT_DATA.to_owned()]);
            assert!(!report.region_feedback.is_empty());
            assert!(report.regions.is_none());
        }

        #[test]
        fn empty_groups_report_insufficient_data() {
            let analyzer = Analyzer::default();
            let people = group(vec![dance(8, 99)]);
            let only_empty = group(vec![PoseSequence::empty(99), PoseSequence::empty(99)]);
            for (standard, user) in [
                (&MultiPersonSequences::new(), &people),
                (&people, &MultiPersonSequences::new()),
                (&only_empty, &people),
                (&people, &only_empty),
            ] {
                let report = analyzer.analyze_group(standard, user).unwrap();
                assert_approx_eq!(report.score, 0.0);
                assert_eq!(report.feedback, vec![INSUFFICIENT_DATA.to_owned()]);
                assert!(report.group.is_none());
                assert!(report.regions.is_none());
            }
        }

        #[test]
        fn regions_compare_the_same_point_in_time() {
            // the same movement recorded at two frame rates
            let ramp = |len: usize| {
                PoseSequence::new(Array2::from_shape_fn((len, 99), |(i, d)| {
                    0.2 + 0.5 * i as f64 / (len - 1) as f64 + 0.001 * d as f64
                }))
                .unwrap()
            };
            let report = Analyzer::default()
                .analyze_solo(&ramp(20), &ramp(10))
                .unwrap();
            for deviation in report.regions.unwrap().values() {
                assert!(deviation.abs() < 1e-9, "deviation {}", deviation);
            }
            assert_eq!(report.region_feedback.len(), 2);
            assert!(report.region_feedback[0].starts_with("✨"));
            assert!(report.region_feedback[1].starts_with("Tuyệt vời"));
        }

        #[test]
        fn failed_inputs_become_insufficient_data() {
            let missing = Error::ReadSequence(
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                "user.json".into(),
            );
            let report = Report::recover(Err(missing)).unwrap();
            assert_approx_eq!(report.score, 0.0);
            assert_eq!(report.feedback, vec![INSUFFICIENT_DATA.to_owned()]);

            let seq = dance(4, 99);
            let scored = Report::recover(Analyzer::default().analyze_solo(&seq, &seq)).unwrap();
            assert_approx_eq!(scored.score, 100.0);
        }

        #[test]
        fn layout_mismatch_is_not_recovered() {
            let result = Analyzer::default().analyze_solo(&dance(4, 99), &dance(4, 34));
            assert!(matches!(
                Report::recover(result),
                Err(Error::DimensionMismatch { .. })
            ));
        }

        #[test]
        fn solo_report_is_complete() {
            let standard = dance(30, 99);
            let user = perturbed(&dance(24, 99), 0.02);
            let report = Analyzer::default().analyze_solo(&standard, &user).unwrap();
            assert!((0.0..=100.0).contains(&report.score));
            assert_eq!(report.timeline.len(), 24);
            let regions = report.regions.unwrap();
            assert_eq!(
                regions.keys().copied().collect::<Vec<_>>(),
                vec![BodyRegion::Arms, BodyRegion::Legs, BodyRegion::UpperBody]
            );
            assert_eq!(report.feedback.len(), 3);
            let metrics = report.metrics.unwrap();
            assert_approx_eq!(metrics.avg_score, report.score);
        }

        #[test]
        fn group_report_carries_group_details() {
            let people = group(vec![dance(8, 99), dance(12, 99)]);
            let report = Analyzer::default().analyze_group(&people, &people).unwrap();
            assert_approx_eq!(report.score, 100.0);
            assert_eq!(report.timeline.len(), 8);
            assert!(!report.group.unwrap().dtw_fallback);
        }

        #[test]
        fn report_serializes_region_keys() {
            let seq = dance(5, 99);
            let report = Analyzer::default().analyze_solo(&seq, &seq).unwrap();
            let json = serde_json::to_value(&report).unwrap();
            assert!(json["regions"]["tay"].is_number());
            assert!(json.get("group").is_none());
        }
    }
}
