//! CLI 모듈
//!
//! router-rag CLI 정의 및 실행
//!
//! - `-u files`: 문서 폴더로 인덱스를 새로 만듦
//! - `-u rss` / `-u url`: RSS 피드의 새 기사를 기존 인덱스에 추가
//! - 플래그 없음: 대화형 질의 (`exit`로 종료)

use std::fmt::{self, Display};
use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::Settings;
use crate::context::ServiceContext;
use crate::gemini::has_api_key;
use crate::knowledge::{meta, IndexIds, QueryEngine, Response, SELECTED_TOOL_KEY};
use crate::loader::{ArticleLoader, RssReader};
use crate::pipeline::{self, CollectOutcome, UrlIndexOutcome};

/// 대화형 질의 종료 명령
const EXIT_COMMAND: &str = "exit";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "router-rag")]
#[command(version, about = "요약/벡터 인덱스 라우팅 RAG 어시스턴트", long_about = None)]
pub struct Cli {
    /// 인덱스를 갱신하고 종료 (files, rss, url)
    #[arg(short = 'u', long = "update_index", value_enum)]
    pub update_index: Option<UpdateSource>,
}

/// 인덱스 갱신 소스
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpdateSource {
    /// 문서 폴더로 새로 빌드
    Files,
    /// RSS 피드 기사 추가
    Rss,
    /// `rss`와 같음
    Url,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env();
    let ids = IndexIds::load(&settings.paths.variables_file)?;

    match cli.update_index {
        Some(UpdateSource::Files) => cmd_build_files(settings).await,
        Some(UpdateSource::Rss | UpdateSource::Url) => cmd_update_rss(settings, ids).await,
        None => cmd_query_loop(settings, ids).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 폴더로 인덱스 빌드 (`-u files`)
async fn cmd_build_files(settings: Settings) -> Result<()> {
    require_api_key()?;

    println!("[*] 문서 폴더: {}", settings.paths.documents_dir.display());
    let service = ServiceContext::from_env(settings).context("서비스 컨텍스트 생성 실패")?;

    let report = pipeline::construct_index_with_file(&service)
        .await
        .context("파일 인덱스 빌드 실패")?;

    println!(
        "[OK] 인덱스 생성 완료: 문서 {}개, 노드 {}개",
        report.documents, report.nodes
    );
    println!("     list_id:   {}", report.ids.list_id);
    println!("     vector_id: {}", report.ids.vector_id);
    println!("     저장소: {}", report.stats.db_path.display());
    println!();

    println!("{:?}", report.summary_refreshed);
    println!(
        "Number of newly inserted/refreshed SummaryRefreshed docs: {}",
        count_true(&report.summary_refreshed)
    );
    println!("{:?}", report.vector_refreshed);
    println!(
        "Number of newly inserted/refreshed VectorRefreshed docs: {}",
        count_true(&report.vector_refreshed)
    );

    Ok(())
}

/// RSS 기사로 인덱스 갱신 (`-u rss`, `-u url`)
async fn cmd_update_rss(settings: Settings, ids: Option<IndexIds>) -> Result<()> {
    // 저장소가 없으면 JSON 파일을 건드리기 전에 종료
    pipeline::ensure_index_dir(&settings.paths)?;

    let Some(ids) = ids else {
        bail!(
            "인덱스 ID 파일이 없습니다: {}\n먼저 `router-rag -u files`로 인덱스를 만드세요.",
            settings.paths.variables_file.display()
        );
    };

    require_api_key()?;
    let service = ServiceContext::from_env(settings).context("서비스 컨텍스트 생성 실패")?;
    let feeds = RssReader::new()?;
    let articles = ArticleLoader::new()?;

    println!("[*] RSS 피드에서 새 기사 수집 중...");
    let report = pipeline::update_index_with_rss(&service, &ids, &feeds, &articles)
        .await
        .context("RSS 인덱스 갱신 실패")?;

    let paths = &service.settings().paths;
    match report.collected {
        CollectOutcome::MissingFeedList => {
            println!("[!] RSS URL 파일이 없습니다: {}", paths.rss_urls.display())
        }
        CollectOutcome::MalformedFeedList => {
            println!("[!] RSS URL 파일 JSON 오류: {}", paths.rss_urls.display())
        }
        CollectOutcome::NoLinks => println!("[!] 피드에서 기사 링크를 찾지 못했습니다."),
        CollectOutcome::MalformedStaging => {
            println!("[!] 기사 URL 파일 JSON 오류: {}", paths.article_urls.display())
        }
        CollectOutcome::Appended { links, staged } => {
            println!("[OK] 기사 링크 {}개 추가 (대기 중 {}개)", links, staged)
        }
    }

    match report.indexed {
        UrlIndexOutcome::NothingNew => println!("[*] 새 기사가 없습니다."),
        UrlIndexOutcome::Indexed { urls, skipped, nodes } => {
            println!("[OK] 새 기사 {}개 색인 완료 (노드 {}개)", urls.len(), nodes);
            for url in urls {
                println!("     {}", url);
            }
            if !skipped.is_empty() {
                println!("[!] 응답이 없어 건너뛴 기사 {}개", skipped.len());
                for url in skipped {
                    println!("     {}", url);
                }
            }
        }
        UrlIndexOutcome::StoreMalformed => {
            println!("[!] 저장된 URL 파일 JSON 오류: {}", paths.stored_urls.display())
        }
    }

    Ok(())
}

/// 대화형 질의
async fn cmd_query_loop(settings: Settings, ids: Option<IndexIds>) -> Result<()> {
    let Some(ids) = ids else {
        println!(
            "[!] 인덱스 ID 파일이 없습니다: {}",
            settings.paths.variables_file.display()
        );
        println!();
        println!("먼저 인덱스를 만드세요:");
        println!("  router-rag -u files   # data/documents 폴더로 빌드");
        println!("  router-rag -u rss     # RSS 기사 추가");
        return Ok(());
    };

    require_api_key()?;
    let service = ServiceContext::from_env(settings).context("서비스 컨텍스트 생성 실패")?;
    let engine = pipeline::load_query_engine(&service, &ids)
        .await
        .context("질의 엔진 로드 실패")?;

    let stdin = BufReader::new(tokio::io::stdin());
    run_query_loop(&engine, stdin, &mut std::io::stdout()).await
}

/// 질의 루프 본체
///
/// 줄 단위로 읽어 질의합니다. 정확히 `exit`인 줄이나 입력 끝에서 멈춥니다.
/// 질의 하나가 실패하면 `[!]` 줄을 찍고 다음 입력을 기다립니다.
/// 입력을 읽거나 출력을 쓰지 못하면 에러를 반환합니다.
async fn run_query_loop<R, W>(engine: &dyn QueryEngine, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "Input query:")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match engine.query(&line).await {
            Ok(response) => write!(out, "{}", format_response(&line, &response))?,
            Err(e) => {
                tracing::warn!("Query failed: {:#}", e);
                writeln!(out, "[!] 질의 실패: {:#}", e)?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// API 키 확인
fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// 종료 명령인지 (줄 끝 개행만 무시)
fn is_exit_command(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']) == EXIT_COMMAND
}

fn count_true(flags: &[bool]) -> usize {
    flags.iter().filter(|&&f| f).count()
}

fn display_or_none<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

/// 질의 응답 출력 형식
///
/// 질의/답변, 소스 노드 ID와 점수, 노드별 출처(file_name, URL, link)와
/// 문자 위치, 점수가 있으면 코사인 유사도를 차례로 적습니다.
pub fn format_response(query: &str, response: &Response) -> String {
    ResponseReport { query, response }.to_string()
}

/// 질의 하나의 출력 블록
struct ResponseReport<'a> {
    query: &'a str,
    response: &'a Response,
}

impl Display for ResponseReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.response;

        writeln!(f, "==========")?;
        writeln!(f, "Query:")?;
        writeln!(f, "{}", self.query)?;
        writeln!(f, "Answer:")?;
        writeln!(f, "{}", response)?;
        if let Some(tool) = response.metadata.get(SELECTED_TOOL_KEY) {
            writeln!(f, "(tool: {})", tool)?;
        }
        writeln!(f, "==========\n")?;

        for node in &response.source_nodes {
            writeln!(
                f,
                "node.node.id_={}, node.score={}",
                node.node.node_id,
                display_or_none(node.score)
            )?;
        }

        for node in &response.source_nodes {
            writeln!(f, "----------")?;

            let metadata = &node.node.metadata;
            for (key, label) in [
                (meta::FILE_NAME, "Reference source:"),
                (meta::URL, "Reference URL:"),
                (meta::LINK, "Reference Link:"),
            ] {
                if let Some(value) = metadata.get(key) {
                    writeln!(f, "{}", label)?;
                    writeln!(f, "{}\n", value)?;
                }
            }

            writeln!(f, "Index position:")?;
            writeln!(
                f,
                "start_char_idx={}, end_char_idx={}\n",
                display_or_none(node.node.start_char_idx),
                display_or_none(node.node.end_char_idx)
            )?;

            if let Some(score) = node.score {
                writeln!(f, "Cosine Similarity:")?;
                writeln!(f, "{}\n", score)?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
