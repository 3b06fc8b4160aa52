use crate::{
    error::{Error, Result},
    pose::PoseSequence,
    resample::align_lengths,
};
use num_traits::cast::ToPrimitive;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

mod prompt;
#[cfg(feature = "remote")]
mod remote;
mod rules;

pub use prompt::Prompt;
#[cfg(feature = "remote")]
pub use remote::{GeminiClient, OpenAiClient};
pub use rules::{region_feedback, RuleBasedFeedback, NO_COMPARISON_DATA};

/// Shown whenever one side of a comparison has no frames.
pub const INSUFFICIENT_DATA: &str =
    "⚠️ Không đủ dữ liệu để tạo phản hồi. Hãy thử lại với video khác.";

/// Summary numbers handed to feedback generators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeedbackMetrics {
    /// Mean absolute difference between the length-aligned sequences.
    pub mean_diff: f64,
    /// Variance of every value of the user's sequence.
    pub motion_var: f64,
    /// The overall score, 0 to 100.
    pub avg_score: f64,
}

impl FeedbackMetrics {
    /// Compute metrics after bringing both sequences to a common length.
    ///
    /// Returns `Ok(None)` if either sequence is empty.
    pub fn from_sequences(
        standard: &PoseSequence,
        user: &PoseSequence,
        avg_score: f64,
    ) -> Result<Option<Self>> {
        standard.check_same_dim(user)?;
        if standard.is_empty() || user.is_empty() {
            return Ok(None);
        }
        let (standard, user) = align_lengths(standard, user)?;
        let diff = &standard.frames() - &user.frames();
        let count = diff.len().to_f64().ok_or(Error::ConvertToF64)?;
        let mean_diff = if diff.is_empty() {
            0.0
        } else {
            diff.mapv(f64::abs).sum() / count
        };
        Ok(Some(Self {
            mean_diff,
            motion_var: user.variance(),
            avg_score,
        }))
    }
}

/// Turns metrics into an ordered list of feedback lines.
pub trait FeedbackStrategy: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    fn generate(&self, metrics: &FeedbackMetrics) -> Result<Vec<String>>;
}

/// An external text-generation service.
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the request for `metrics`.
    fn prompt(&self, metrics: &FeedbackMetrics) -> Prompt {
        Prompt::coaching(metrics)
    }

    /// Send `prompt` and return the generated text.
    fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Adapts a [`TextGenerator`] into a [`FeedbackStrategy`].
pub struct ExternalFeedback<G> {
    generator: G,
}

impl<G> ExternalFeedback<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G> FeedbackStrategy for ExternalFeedback<G>
where
    G: TextGenerator,
{
    fn name(&self) -> &'static str {
        self.generator.name()
    }

    fn generate(&self, metrics: &FeedbackMetrics) -> Result<Vec<String>> {
        let prompt = self.generator.prompt(metrics);
        let text = self.generator.complete(&prompt)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyTextGeneration(self.generator.name()));
        }
        Ok(vec![text.to_owned()])
    }
}

/// Strategies tried in order, ending in the rule-based generator.
pub struct FeedbackChain {
    strategies: Vec<Box<dyn FeedbackStrategy>>,
    fallback: RuleBasedFeedback,
}

impl Default for FeedbackChain {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl FeedbackChain {
    pub fn rule_based() -> Self {
        Self {
            strategies: Vec::new(),
            fallback: RuleBasedFeedback,
        }
    }

    /// Append `strategy`, tried after those already added and before the fallback.
    pub fn with<S>(mut self, strategy: S) -> Self
    where
        S: FeedbackStrategy + 'static,
    {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }

    /// Feedback from the first strategy that succeeds with a non-empty result.
    pub fn generate(&self, metrics: &FeedbackMetrics) -> Vec<String> {
        for strategy in &self.strategies {
            match strategy.generate(metrics) {
                Ok(lines) if !lines.is_empty() => {
                    debug!(message = "generated feedback", strategy = strategy.name());
                    return lines;
                }
                Ok(_) => warn!(message = "strategy returned no feedback", strategy = strategy.name()),
                Err(error) => warn!(
                    message = "feedback strategy failed, trying next",
                    strategy = strategy.name(),
                    %error
                ),
            }
        }
        debug!(message = "using rule-based feedback");
        self.fallback.feedback(metrics)
    }
}

/// Which feedback generator to put in front of the rule-based fallback.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeedbackBackend {
    /// Pick a remote service from whichever API key is configured.
    Auto,
    RuleBased,
    OpenAi,
    Gemini,
}

impl Default for FeedbackBackend {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::str::FromStr for FeedbackBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "rule" | "rules" | "rule-based" => Ok(Self::RuleBased),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown feedback backend: {}", other)),
        }
    }
}

/// Settings for building a [`FeedbackChain`].
#[derive(Debug, Clone, Default)]
pub struct FeedbackConfig {
    pub backend: FeedbackBackend,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl FeedbackConfig {
    /// The backend that will actually be used given the configured keys.
    pub fn resolve(&self) -> FeedbackBackend {
        match self.backend {
            FeedbackBackend::Auto if self.openai_api_key.is_some() => FeedbackBackend::OpenAi,
            FeedbackBackend::Auto if self.google_api_key.is_some() => FeedbackBackend::Gemini,
            FeedbackBackend::Auto => FeedbackBackend::RuleBased,
            other => other,
        }
    }

    #[cfg(feature = "remote")]
    pub fn build(&self) -> FeedbackChain {
        let chain = FeedbackChain::rule_based();
        let timeout = self.timeout.unwrap_or(remote::DEFAULT_TIMEOUT);
        let client = match (self.resolve(), &self.openai_api_key, &self.google_api_key) {
            (FeedbackBackend::OpenAi, Some(key), _) => OpenAiClient::new(key.clone(), timeout)
                .map(|client| chain.with(ExternalFeedback::new(client))),
            (FeedbackBackend::Gemini, _, Some(key)) => GeminiClient::new(key.clone(), timeout)
                .map(|client| chain.with(ExternalFeedback::new(client))),
            (FeedbackBackend::RuleBased, ..) => return chain,
            (backend, ..) => {
                warn!(message = "no API key for feedback backend", ?backend);
                return chain;
            }
        };
        client.unwrap_or_else(|error| {
            warn!(message = "failed to construct feedback client", %error);
            FeedbackChain::rule_based()
        })
    }

    #[cfg(not(feature = "remote"))]
    pub fn build(&self) -> FeedbackChain {
        let backend = self.resolve();
        if backend != FeedbackBackend::RuleBased {
            warn!(
                message = "built without the `remote` feature, using rule-based feedback",
                ?backend
            );
        }
        FeedbackChain::rule_based()
    }
}
