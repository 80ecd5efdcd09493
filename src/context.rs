//! Service Context - LLM, 임베딩, 노드 파서, 프롬프트 설정 묶음
//!
//! 인덱스 빌드/질의 함수는 이 컨텍스트 하나만 받아서 필요한 구성요소를 꺼내 씁니다.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Settings;
use crate::gemini::{EmbeddingProvider, GeminiClient, GeminiEmbedding, GeminiLlm, LlmProvider};
use crate::knowledge::{NodeParser, PromptHelper, PromptTemplates, ResponseMode, ResponseSynthesizer};

/// 서비스 컨텍스트
#[derive(Clone)]
pub struct ServiceContext {
    llm: Arc<dyn LlmProvider>,
    embed_model: Arc<dyn EmbeddingProvider>,
    node_parser: Arc<NodeParser>,
    templates: Arc<PromptTemplates>,
    prompt_helper: PromptHelper,
    settings: Settings,
}

impl ServiceContext {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embed_model: Arc<dyn EmbeddingProvider>,
        settings: Settings,
    ) -> Result<Self> {
        Ok(Self {
            llm,
            embed_model,
            node_parser: Arc::new(NodeParser::from_settings(&settings.splitter)),
            templates: Arc::new(PromptTemplates::new()?),
            prompt_helper: PromptHelper::new(&settings.prompt),
            settings,
        })
    }

    /// Gemini 클라이언트로 구성 (API 키 필요)
    pub fn from_env(settings: Settings) -> Result<Self> {
        tracing::info!("Get service context (llm: {})", settings.llm.model);

        let client = GeminiClient::from_env()?;
        let llm = GeminiLlm::new(client.clone(), settings.llm.clone());
        let embed_model = GeminiEmbedding::new(client)?;

        Self::new(Arc::new(llm), Arc::new(embed_model), settings)
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn embed_model(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embed_model
    }

    pub fn node_parser(&self) -> &NodeParser {
        &self.node_parser
    }

    pub fn templates(&self) -> &Arc<PromptTemplates> {
        &self.templates
    }

    pub fn prompt_helper(&self) -> &PromptHelper {
        &self.prompt_helper
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 응답 합성기 생성
    pub fn synthesizer(&self, mode: ResponseMode) -> ResponseSynthesizer {
        ResponseSynthesizer::new(
            self.llm.clone(),
            self.templates.clone(),
            self.prompt_helper.clone(),
            mode,
            self.settings.retrieval.concurrency,
        )
    }
}
