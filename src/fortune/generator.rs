//! Fortune generator: builds the narrative request and maps failures to a
//! fixed fallback reply.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::onboarding::UserProfile;

/// Reply used whenever the provider fails or returns nothing usable.
pub const FALLBACK_MESSAGE: &str =
    "申し訳ありません。ただいま占い結果を作成できませんでした。しばらくしてからもう一度お試しください。";

const SYSTEM_PROMPT: &str = "あなたは経験豊富な占い師です。\
     西洋占星術、四柱推命、数秘術、姓名判断の知識を組み合わせ、\
     相談者のプロフィールに基づいて、温かく前向きな語り口で占い結果を日本語で伝えてください。\
     断定的な医療・法律・投資の助言は避けてください。";

/// Decoding parameters for fortune generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Max tokens for LLM response.
    pub max_tokens: u32,
    /// Low temperature keeps readings consistent between requests.
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.3,
        }
    }
}

/// Produces fortune narratives from a completed profile and a topic.
pub struct FortuneGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl FortuneGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }

    /// Compose the single completion request for `profile` and `topic`.
    pub fn build_request(&self, profile: &UserProfile, topic: &str) -> CompletionRequest {
        let instruction = format!(
            "以下の相談者のプロフィールをもとに「{topic}」を占ってください。\n\n\
             【プロフィール】\n{profile}\n\n\
             各占術からの見立てを簡潔にまとめたうえで、総合的なアドバイスで締めくくってください。",
            topic = topic,
            profile = profile.to_prompt_section(),
        );

        CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(instruction),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
    }

    /// Generate a fortune. Always returns text; failures become
    /// [`FALLBACK_MESSAGE`].
    pub async fn generate(&self, profile: &UserProfile, topic: &str) -> String {
        info!(
            user_id = %profile.user_id,
            topic,
            model = self.llm.model_name(),
            "Generating fortune"
        );

        let request = self.build_request(profile, topic);
        match self.llm.complete(request).await {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    warn!(user_id = %profile.user_id, "Provider returned empty fortune");
                    return FALLBACK_MESSAGE.to_string();
                }
                info!(
                    user_id = %profile.user_id,
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Fortune generated"
                );
                text.to_string()
            }
            Err(e) => {
                warn!(user_id = %profile.user_id, error = %e, "Fortune generation failed");
                FALLBACK_MESSAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, Role};

    /// Returns a canned reply and records every request it receives.
    struct RecordingProvider {
        reply: Result<String, ()>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 10,
                    output_tokens: 20,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "connection reset".into(),
                }),
            }
        }
    }

    fn complete_profile() -> UserProfile {
        let mut p = UserProfile::new("U1");
        p.birth_date = Some("1990-01-01".into());
        p.birth_time = Some("14:30".into());
        p.birth_place = Some("東京都".into());
        p.full_name = Some("山田太郎".into());
        p
    }

    #[test]
    fn request_embeds_profile_and_topic() {
        let generator = FortuneGenerator::new(
            Arc::new(RecordingProvider::replying("x")),
            GeneratorConfig::default(),
        );
        let req = generator.build_request(&complete_profile(), "恋愛運");

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        let body = &req.messages[1].content;
        for needle in ["恋愛運", "1990-01-01", "14:30", "東京都", "山田太郎"] {
            assert!(body.contains(needle), "missing {needle}");
        }
        assert_eq!(req.max_tokens, Some(1500));
        assert_eq!(req.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn generate_returns_trimmed_output_from_one_call() {
        let provider = Arc::new(RecordingProvider::replying("\n  今日は良い日です。  \n"));
        let generator = FortuneGenerator::new(provider.clone(), GeneratorConfig::default());

        let text = generator.generate(&complete_profile(), "総合運").await;
        assert_eq!(text, "今日は良い日です。");
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provider_error_maps_to_fallback() {
        let provider = Arc::new(RecordingProvider::failing());
        let generator = FortuneGenerator::new(provider.clone(), GeneratorConfig::default());

        let text = generator.generate(&complete_profile(), "仕事運").await;
        assert_eq!(text, FALLBACK_MESSAGE);
        assert_eq!(provider.requests.lock().unwrap().len(), 1, "no retry");
    }

    #[tokio::test]
    async fn blank_output_maps_to_fallback() {
        let generator = FortuneGenerator::new(
            Arc::new(RecordingProvider::replying("   ")),
            GeneratorConfig::default(),
        );
        assert_eq!(
            generator.generate(&complete_profile(), "総合運").await,
            FALLBACK_MESSAGE
        );
    }
}
