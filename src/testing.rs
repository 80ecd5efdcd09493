//! 테스트용 프로바이더
//!
//! - `ScriptedLlm`: 프롬프트를 기록하고 클로저로 응답을 만듦
//! - `HashEmbedding`: 단어 해시 기반 결정적 임베딩 (API 호출 없음)

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::context::ServiceContext;
use crate::gemini::{EmbedTask, EmbeddingProvider, LlmProvider};

type Handler = Box<dyn Fn(&str) -> String + Send + Sync>;

/// 스크립트 LLM
pub struct ScriptedLlm {
    handler: Handler,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(handler: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 항상 같은 응답
    pub fn constant(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_| answer.clone())
    }

    /// 지금까지 받은 프롬프트
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok((self.handler)(prompt))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// 테스트 임베딩 차원
pub const TEST_DIMENSION: usize = 32;

/// 단어 해시 임베딩
pub struct HashEmbedding;

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            vector[u16::from_le_bytes([digest[0], digest[1]]) as usize % TEST_DIMENSION] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// 테스트용 서비스 컨텍스트
pub fn service_context(llm: Arc<ScriptedLlm>) -> ServiceContext {
    service_context_with(llm, Settings::default())
}

/// 설정을 지정한 테스트용 서비스 컨텍스트
pub fn service_context_with(llm: Arc<ScriptedLlm>, settings: Settings) -> ServiceContext {
    ServiceContext::new(llm, Arc::new(HashEmbedding), settings).unwrap()
}
