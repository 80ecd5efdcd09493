//! LLM - Gemini `generateContent` 텍스트 생성

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GeminiClient;
use crate::config::LlmSettings;

// ============================================================================
// LlmProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더 트레이트
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 프롬프트에 대한 응답 텍스트 생성
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn model(&self) -> &str;
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini 텍스트 생성 구현체
#[derive(Debug, Clone)]
pub struct GeminiLlm {
    client: GeminiClient,
    settings: LlmSettings,
}

impl GeminiLlm {
    pub fn new(client: GeminiClient, settings: LlmSettings) -> Self {
        Self { client, settings }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// 첫 번째 후보의 텍스트 파트를 이어 붙임
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                tracing::debug!("Generation finished with reason: {}", reason);
            }
        }

        let text: String = candidate
            .content?
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();

        Some(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_output_tokens,
            },
        };

        let response: GenerateResponse = self
            .client
            .call(&self.settings.model, "generateContent", &request)
            .await?;

        let text = response.into_text().unwrap_or_default();
        if text.trim().is_empty() {
            tracing::warn!("Empty completion from {}", self.settings.model);
        }

        Ok(text.trim().to_string())
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

// ============================================================================
// Tests
// ============================================================================
