use super::FeedbackMetrics;

const COACH_PERSONA: &str = "Bạn là huấn luyện viên múa Việt Nam, nói ngắn gọn, khích lệ.";

/// A request for a text-generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Instructions for chat-style services that take a separate system role.
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    /// Chat prompt asking for three to four short coaching suggestions.
    pub fn coaching(metrics: &FeedbackMetrics) -> Self {
        let user = format!(
            "Bạn là huấn luyện viên múa Việt Nam.\n\
             Hãy đánh giá bài múa dựa trên thông tin sau:\n\
             - Độ lệch tư thế trung bình: {:.3}\n\
             - Độ mượt chuyển động: {:.3}\n\
             - Điểm trung bình: {:.1}/100\n\
             \n\
             Viết 3–4 gợi ý ngắn gọn, thân thiện bằng tiếng Việt:\n\
             - Nhận xét tổng thể (giống hay khác mẫu)\n\
             - Gợi ý cải thiện động tác tay/chân\n\
             - Gợi ý về nhịp và cảm xúc\n\
             - Câu động viên cuối",
            metrics.mean_diff, metrics.motion_var, metrics.avg_score
        );
        Self {
            system: Some(COACH_PERSONA.to_owned()),
            user,
        }
    }

    /// Single-turn prompt asking for an overall comment, a suggestion and
    /// encouragement.
    pub fn review(metrics: &FeedbackMetrics) -> Self {
        let user = format!(
            "Bạn là huấn luyện viên múa Việt Nam.\n\
             Dưới đây là dữ liệu:\n\
             - Độ lệch tư thế: {:.3}\n\
             - Độ mượt chuyển động: {:.3}\n\
             - Điểm trung bình: {:.1}/100\n\
             \n\
             Hãy viết nhận xét ngắn gọn, dễ hiểu, thân thiện bằng tiếng Việt:\n\
             - Nhận xét tổng thể\n\
             - Gợi ý cải thiện\n\
             - Câu động viên",
            metrics.mean_diff, metrics.motion_var, metrics.avg_score
        );
        Self { system: None, user }
    }
}
