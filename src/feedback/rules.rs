use super::{FeedbackMetrics, FeedbackStrategy};
use crate::{
    error::{Error, Result},
    joints::{flagged_regions, BodyRegion, RegionDeviations},
};
use num_traits::cast::ToPrimitive;

/// Region feedback when there were no frames to compare.
pub const NO_COMPARISON_DATA: &str = "Không có dữ liệu để so sánh.";

/// Feedback from fixed score and motion thresholds. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedFeedback;

impl RuleBasedFeedback {
    pub fn feedback(&self, metrics: &FeedbackMetrics) -> Vec<String> {
        let verdict = if metrics.avg_score > 90.0 {
            "🌟 Rất xuất sắc! Các động tác của bạn gần như hoàn hảo."
        } else if metrics.avg_score > 75.0 {
            "👍 Bài múa rất tốt, chỉ cần mượt hơn ở phần tay hoặc hông."
        } else if metrics.avg_score > 50.0 {
            "⚡ Cần cải thiện thêm về độ đều và cảm xúc. Hãy xem lại phần mở đầu."
        } else {
            "😅 Cần điều chỉnh lại nhịp và tư thế, hãy tập chậm hơn để kiểm soát động tác."
        };

        let movement = if metrics.motion_var < 0.03 {
            "Động tác hơi cứng, bạn nên di chuyển mềm mại hơn."
        } else {
            "Chuyển động tự nhiên và có cảm xúc, rất tốt!"
        };

        vec![
            verdict.to_owned(),
            movement.to_owned(),
            "💪 Tiếp tục luyện tập nhé! Mỗi lần bạn lại tiến bộ thêm.".to_owned(),
        ]
    }
}

impl FeedbackStrategy for RuleBasedFeedback {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    fn generate(&self, metrics: &FeedbackMetrics) -> Result<Vec<String>> {
        Ok(self.feedback(metrics))
    }
}

fn region_suggestion(region: BodyRegion) -> &'static str {
    match region {
        BodyRegion::Arms => "🖐 Tay: Biên độ vung tay hơi hẹp, thử nâng tay cao và duỗi thẳng hơn.",
        BodyRegion::Legs => "🦵 Chân: Nhịp di chuyển chưa đều, tập giữ thăng bằng và nhịp đều.",
        BodyRegion::UpperBody => "💃 Thân trên: Tư thế hơi nghiêng, cần giữ vai và eo thẳng hơn.",
    }
}

/// Body-region feedback: an overall verdict, one suggestion per region whose
/// deviation exceeds `threshold`, and praise when no region does.
pub fn region_feedback(
    deviations: Option<&RegionDeviations>,
    threshold: f64,
) -> Result<Vec<String>> {
    let deviations = match deviations {
        Some(deviations) if !deviations.is_empty() => deviations,
        _ => return Ok(vec![NO_COMPARISON_DATA.to_owned()]),
    };

    let count = deviations.len().to_f64().ok_or(Error::ConvertToF64)?;
    let mean = deviations.values().sum::<f64>() / count;
    let verdict = if mean < 0.02 {
        "✨ Rất tốt! Động tác của bạn gần như khớp hoàn toàn với bài mẫu."
    } else if mean < 0.05 {
        "👍 Động tác nhìn rất ổn, chỉ cần tinh chỉnh thêm một chút để đạt chuẩn."
    } else {
        "👀 Cần chú ý hơn, có một số phần lệch đáng kể so với bài mẫu."
    };

    let mut feedback = vec![verdict.to_owned()];
    feedback.extend(
        flagged_regions(deviations, threshold)
            .into_iter()
            .map(|region| region_suggestion(region).to_owned()),
    );
    if feedback.len() == 1 {
        feedback.push("Tuyệt vời! Bạn đã thực hiện đúng toàn bộ động tác 🎉".to_owned());
    }
    Ok(feedback)
}
