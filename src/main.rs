use anyhow::{anyhow, Context, Result};
use dance_score::{
    distance::Dtw,
    feedback::{FeedbackBackend, FeedbackConfig},
    io,
    joints::JointGroups,
    pose::Layout,
    Analyzer, Report, ScoreConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use num_traits::cast::ToPrimitive;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use structopt::StructOpt;
use tracing::{info, info_span};
use tracing_subscriber::layer::SubscriberExt;

#[derive(structopt::StructOpt)]
enum Mode {
    /// Compare single performers against a reference performance.
    Solo {
        /// Reference keypoint sequence (JSON array of frames).
        standard: PathBuf,

        /// Keypoint sequences to score.
        #[structopt(required = true)]
        users: Vec<PathBuf>,
    },
    /// Compare groups of performers against a reference group.
    Group {
        /// Reference group file (JSON object with `performers` or `detections`).
        standard: PathBuf,

        /// Group files to score.
        #[structopt(required = true)]
        users: Vec<PathBuf>,

        /// Maximum number of performers read from a `detections` file.
        #[structopt(short, long, default_value = "5")]
        max_people: usize,
    },
}

#[derive(structopt::StructOpt)]
struct AnalysisOpt {
    /// Keypoint layout of the input files: mediapipe or coco.
    #[structopt(short = "L", long, default_value = "mediapipe")]
    layout: Layout,

    /// Accumulated DTW cost worth one point of the overall score.
    #[structopt(long, default_value = "50")]
    divisor: f64,

    /// Points lost per unit of per-frame distance on the timeline.
    #[structopt(long, default_value = "10")]
    sensitivity: f64,

    /// Body-region deviation above which a suggestion is written.
    #[structopt(short, long, default_value = "0.04")]
    threshold: f64,

    /// Sakoe-Chiba band half-width for DTW.
    #[structopt(short, long)]
    window: Option<usize>,

    /// Feedback generator: auto, rule-based, openai or gemini.
    #[structopt(short, long, default_value = "auto")]
    feedback: FeedbackBackend,

    #[structopt(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[structopt(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Timeout in seconds for remote feedback requests.
    #[structopt(long)]
    timeout: Option<u64>,
}

impl AnalysisOpt {
    fn analyzer(&self) -> Result<Analyzer> {
        let scoring = ScoreConfig {
            calibration_divisor: self.divisor,
            timeline_sensitivity: self.sensitivity,
            ..ScoreConfig::default()
        };
        scoring.validate().context("invalid scoring options")?;
        let joint_groups = JointGroups::for_layout(self.layout)
            .context("failed constructing joint groups")?;
        let feedback = FeedbackConfig {
            backend: self.feedback,
            openai_api_key: self.openai_api_key.clone(),
            google_api_key: self.google_api_key.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        };
        info!(message = "feedback backend", backend = ?feedback.resolve());

        let analyzer = Analyzer::new(scoring, joint_groups, feedback.build())
            .with_region_threshold(self.threshold);
        Ok(match self.window {
            Some(window) => analyzer.with_dtw(Dtw::with_window(window)),
            None => analyzer,
        })
    }
}

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(subcommand)]
    mode: Mode,

    #[structopt(flatten)]
    analysis: AnalysisOpt,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    /// Print reports as JSON.
    #[structopt(short, long)]
    json: bool,

    #[structopt(short, long)]
    show_progress: bool,
}

/// Load and score every user file on its own thread, keeping input order.
///
/// A file that cannot be read or scored gets the insufficient-data report.
/// Inputs that do not fit the configured layout abort the run.
fn score_all<T, L, A>(users: &[PathBuf], load: L, analyze: A) -> Result<Vec<Report>>
where
    L: Fn(&Path) -> dance_score::Result<T> + Sync,
    A: Fn(&T) -> dance_score::Result<Report> + Sync,
{
    let load = &load;
    let analyze = &analyze;
    crossbeam::thread::scope(|scope| {
        let handles = users
            .iter()
            .map(|path| {
                scope.spawn(move |_| {
                    let _span = info_span!("score", path = %path.display()).entered();
                    let outcome = load(path.as_path()).and_then(|user| analyze(&user));
                    Report::recover(outcome)
                        .with_context(|| format!("failed scoring {}", path.display()))
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("comparison thread panicked"))?
            })
            .collect::<Result<Vec<_>>>()
    })
    .map_err(|_| anyhow!("comparison thread panicked"))?
}

fn print_report(path: &Path, report: &Report, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed serializing report")?
        );
        return Ok(());
    }

    println!("{}: {:.2}/100", path.display(), report.score);
    if !report.timeline.is_empty() {
        let frames = report
            .timeline
            .len()
            .to_f64()
            .ok_or(dance_score::Error::ConvertToF64)?;
        let mean = report.timeline.iter().sum::<f64>() / frames;
        println!("  timeline: {} frames, mean {:.1}", report.timeline.len(), mean);
    }
    if let Some(group) = &report.group {
        println!(
            "  group: diff {:.4}{}, variance {:.4} vs {:.4}",
            group.diff,
            if group.dtw_fallback { " (dtw)" } else { "" },
            group.var_standard,
            group.var_user
        );
    }
    if let Some(regions) = &report.regions {
        for (region, deviation) in regions {
            println!("  {}: {:.4}", region.key(), deviation);
        }
    }
    for line in report.region_feedback.iter().chain(&report.feedback) {
        println!("  {}", line);
    }
    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(opt.log_level),
    )?;

    let analyzer = opt.analysis.analyzer()?;
    let dim = opt.analysis.layout.dim();

    let spinner = if opt.show_progress {
        let pb = ProgressBar::new_spinner().with_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
        );
        pb.enable_steady_tick(100);
        pb.set_message("comparing performances");
        Some(pb)
    } else {
        None
    };

    let (users, reports) = match &opt.mode {
        Mode::Solo { standard, users } => {
            let standard = io::load_sequence(standard, dim)
                .with_context(|| format!("failed loading {}", standard.display()))?;
            let reports = score_all(
                users,
                |path| io::load_sequence(path, dim),
                |user| analyzer.analyze_solo(&standard, user),
            )?;
            (users, reports)
        }
        Mode::Group {
            standard,
            users,
            max_people,
        } => {
            let max_people = *max_people;
            let standard = io::load_group(standard, dim, max_people)
                .with_context(|| format!("failed loading {}", standard.display()))?;
            let reports = score_all(
                users,
                |path| io::load_group(path, dim, max_people),
                |user| analyzer.analyze_group(&standard, user),
            )?;
            (users, reports)
        }
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    for (path, report) in users.iter().zip(&reports) {
        print_report(path, report, opt.json)?;
    }
    Ok(())
}
