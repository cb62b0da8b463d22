//! CLI 모듈
//!
//! story-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{AppConfig, StoreBackend};
use crate::context::{ContextAssembler, ContextRequest, GenerationContext};
use crate::embedding::{has_api_key, EmbeddingAdapter, EmbeddingCache};
use crate::graph::{RelationWeightResolver, RelationshipGraph, TraversalConfig};
use crate::knowledge::{
    get_data_dir, ContentHashCache, HybridRetriever, IndexOptions, IndexStatus, Indexer,
    LanceVectorStore, MatchType, Project, SqliteVectorStore, VectorStore,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "story-rag")]
#[command(version, about = "소설 집필용 컨텍스트 엔진", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 프로젝트의 모든 엔티티 색인 (변경분만)
    Index {
        /// 프로젝트 JSON 파일
        #[arg(short, long)]
        project: PathBuf,

        /// 변경 여부와 관계없이 다시 임베딩
        #[arg(long)]
        force: bool,

        /// 긴 챕터도 청크로 나누지 않음
        #[arg(long)]
        no_chunking: bool,
    },

    /// 생성 컨텍스트 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 프로젝트 JSON 파일
        #[arg(short, long)]
        project: PathBuf,

        /// 작성 중인 챕터 ID (후보에서 제외)
        #[arg(short, long)]
        chapter: Option<String>,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 인물 관계 그래프
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },

    /// 상태 확인
    Status,

    /// 저장된 벡터 전체 삭제
    Clear,
}

#[derive(Subcommand)]
pub enum GraphCommands {
    /// 시드 인물에서 관계 탐색
    Traverse {
        /// 시드 인물 ID
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(short, long)]
        project: PathBuf,

        /// 최대 깊이
        #[arg(short, long)]
        depth: Option<usize>,

        /// 탐색 전략 (bfs | best_first)
        #[arg(short, long)]
        strategy: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 두 인물 사이의 최단 관계 경로
    Path {
        source: String,
        target: String,

        #[arg(short, long)]
        project: PathBuf,

        /// 최대 간선 수
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// 인물 관계 요약
    Summary {
        id: String,

        #[arg(short, long)]
        project: PathBuf,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = get_data_dir();
    let config = AppConfig::load(&data_dir).context("설정 로드 실패")?;

    match cli.command {
        Commands::Index {
            project,
            force,
            no_chunking,
        } => cmd_index(&config, &data_dir, &project, force, no_chunking).await,
        Commands::Query {
            query,
            project,
            chapter,
            json,
        } => cmd_query(&config, &data_dir, &query, &project, chapter, json).await,
        Commands::Graph { command } => cmd_graph(&config, command),
        Commands::Status => cmd_status(&config, &data_dir).await,
        Commands::Clear => cmd_clear(&config, &data_dir).await,
    }
}

/// 설정된 백엔드로 벡터 저장소 열기
async fn open_store(config: &AppConfig, data_dir: &Path) -> Result<Arc<dyn VectorStore>> {
    let path = config.store_path(data_dir);

    let store: Arc<dyn VectorStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(
            SqliteVectorStore::open(&path).context("SQLite 벡터 저장소 열기 실패")?,
        ),
        StoreBackend::Lance => Arc::new(
            LanceVectorStore::open(&path)
                .await
                .context("LanceDB 벡터 저장소 열기 실패")?,
        ),
    };
    Ok(store)
}

fn load_project(path: &Path) -> Result<Project> {
    Project::load(path).context("프로젝트 로드 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 색인 명령어 (index)
///
/// 프로젝트의 챕터, 인물, 위키 항목을 순서대로 색인합니다.
/// 내용이 바뀌지 않은 엔티티는 건너뜁니다.
async fn cmd_index(
    config: &AppConfig,
    data_dir: &Path,
    project_path: &Path,
    force: bool,
    no_chunking: bool,
) -> Result<()> {
    let adapter = EmbeddingAdapter::from_config(&config.provider);
    if !adapter.is_available() {
        bail!(
            "임베딩 프로바이더를 사용할 수 없습니다: {}\n\n\
             설정 방법:\n  \
             export STORY_RAG_PROVIDER=gemini\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export STORY_RAG_PROVIDER=openai\n  \
             export OPENAI_API_KEY=your-api-key",
            adapter.unavailable_reason().unwrap_or("unknown")
        );
    }

    let project = load_project(project_path)?;
    let store = open_store(config, data_dir).await?;
    let cache = Arc::new(EmbeddingCache::new(config.cache.ttl(), config.cache.max_entries));

    let indexer = Indexer::new(
        store,
        adapter,
        cache,
        Arc::new(ContentHashCache::new()),
        &config.index,
    );

    if indexer.ensure_provider().await.context("프로바이더 확인 실패")? {
        println!("[!] 다른 프로바이더로 만든 벡터를 삭제했습니다. 전체를 다시 색인합니다.");
    }
    indexer
        .seed_hashes_from_store()
        .await
        .context("기존 색인 상태 읽기 실패")?;

    let entities = project.entities();
    if entities.is_empty() {
        println!("[!] 색인할 엔티티가 없습니다.");
        return Ok(());
    }

    println!("[*] 색인 대상: {} 엔티티", entities.len());
    println!(
        "    챕터: {}, 인물: {}, 위키: {}",
        project.chapters.len(),
        project.characters.len(),
        project.wiki_entries.len()
    );
    println!();

    let options = IndexOptions {
        chunking: config.index.chunking && !no_chunking,
        force,
    };

    let report = indexer
        .index_batch(&entities, &options, |progress| match progress.status {
            IndexStatus::Indexing => print!(
                "[{}/{}] {}... ",
                progress.current, progress.total, progress.label
            ),
            IndexStatus::Completed => println!("완료"),
            IndexStatus::Error => println!("실패"),
        })
        .await;

    println!();
    println!(
        "[OK] 완료: 색인 {}, 변경 없음 {}, 실패 {} (레코드 {})",
        report.indexed,
        report.unchanged,
        report.unavailable + report.failed,
        report.records
    );
    for (id, reason) in &report.errors {
        println!("     {}: {}", id, reason);
    }

    Ok(())
}

/// 검색 명령어 (query)
///
/// 챕터/인물/위키를 하이브리드 검색하고 관계 요약을 붙여 출력합니다.
async fn cmd_query(
    config: &AppConfig,
    data_dir: &Path,
    query: &str,
    project_path: &Path,
    chapter: Option<String>,
    json: bool,
) -> Result<()> {
    let project = load_project(project_path)?;
    let store = open_store(config, data_dir).await?;
    let adapter = EmbeddingAdapter::from_config(&config.provider);
    let cache = Arc::new(EmbeddingCache::new(config.cache.ttl(), config.cache.max_entries));

    let retriever = HybridRetriever::new(store, adapter, cache, config.retrieval.clone())
        .with_graph(
            RelationWeightResolver::default(),
            TraversalConfig::from(&config.graph),
        );
    let assembler = ContextAssembler::new(retriever);

    let request = ContextRequest {
        current_chapter_id: chapter,
        ..ContextRequest::new(query)
    };

    if !json {
        println!("[*] 검색 중: \"{}\"", query);
    }

    let context = assembler.assemble(&request, &project).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&context).context("결과 직렬화 실패")?
        );
        return Ok(());
    }

    print_context(&context);
    Ok(())
}

fn print_context(context: &GenerationContext) {
    println!();
    println!("[OK] 모드: {:?}", context.retrieval_mode);
    for reason in &context.reasons {
        println!("[!] {}", reason);
    }

    if context.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return;
    }

    println!("\n챕터 ({} 건):", context.relevant_chapters.len());
    for r in &context.relevant_chapters {
        println!(
            "  [{}] [점수: {:.4}] Chapter {}: {}",
            match_label(r.match_type),
            r.relevance_score,
            r.entity.order,
            r.entity.title
        );
        let preview = if r.entity.summary.is_empty() {
            &r.entity.content
        } else {
            &r.entity.summary
        };
        if !preview.is_empty() {
            println!("        {}", truncate_text(preview, 120));
        }
    }

    println!("\n인물 ({} 건):", context.relevant_characters.len());
    for r in &context.relevant_characters {
        println!(
            "  [{}] [점수: {:.4}] {}",
            match_label(r.match_type),
            r.relevance_score,
            r.entity.name
        );
    }

    println!("\n위키 ({} 건):", context.relevant_wiki_entries.len());
    for r in &context.relevant_wiki_entries {
        println!(
            "  [{}] [점수: {:.4}] {} ({})",
            match_label(r.match_type),
            r.relevance_score,
            r.entity.name,
            r.entity.category
        );
    }

    if !context.relationship_summaries.is_empty() {
        println!("\n관계:");
        println!("{}", context.render_relationships());
    }
}

/// 그래프 명령어 (graph)
fn cmd_graph(config: &AppConfig, command: GraphCommands) -> Result<()> {
    let resolver = RelationWeightResolver::default();
    let mut traversal = TraversalConfig::from(&config.graph);

    match command {
        GraphCommands::Traverse {
            ids,
            project,
            depth,
            strategy,
            limit,
        } => {
            let project = load_project(&project)?;
            let graph = RelationshipGraph::build(&project.characters, &resolver);

            if let Some(strategy) = strategy {
                traversal.strategy = strategy.parse()?;
            }
            let depth = depth.unwrap_or(traversal.max_depth);

            let results = graph.enhance(&ids, depth, limit, &traversal);
            if results.is_empty() {
                println!("[!] 시드 인물을 찾을 수 없습니다.");
                return Ok(());
            }

            println!("[OK] 탐색 결과 ({} 건):\n", results.len());
            for r in results {
                println!(
                    "  [깊이 {}] [관련도: {:.4}] {}",
                    r.depth, r.relevance_score, r.character.name
                );
                if !r.relation_chain.is_empty() {
                    println!(
                        "        {} ({})",
                        r.path.join(" → "),
                        r.relation_chain.join(" → ")
                    );
                }
            }
        }
        GraphCommands::Path {
            source,
            target,
            project,
            max_depth,
        } => {
            let project = load_project(&project)?;
            let graph = RelationshipGraph::build(&project.characters, &resolver);
            let max_depth = max_depth.unwrap_or(config.graph.path_max_depth);

            match graph.find_path(&source, &target, max_depth) {
                Some(path) => {
                    println!("[OK] 경로 (간선 {}개):", path.len());
                    println!("     {}", path.nodes.join(" → "));
                    if !path.relations.is_empty() {
                        println!("     ({})", path.relations.join(" → "));
                    }
                }
                None => println!("[!] {} → {} 경로가 없습니다.", source, target),
            }
        }
        GraphCommands::Summary { id, project } => {
            let project = load_project(&project)?;
            let graph = RelationshipGraph::build(&project.characters, &resolver);

            match graph.summarize(&id, &traversal) {
                Some(summary) => println!("{}", summary.render()),
                None => bail!("ID '{}'인 인물을 찾을 수 없습니다", id),
            }
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &AppConfig, data_dir: &Path) -> Result<()> {
    println!("story-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", data_dir.display());
    println!("[*] 프로바이더: {}", config.provider.kind);

    if !config.provider.kind.supports_embeddings() {
        println!("[!] 임베딩 미지원 프로바이더 - 키워드 검색만 사용합니다");
    } else if config.provider.api_key.is_some() || has_api_key(config.provider.kind) {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        for var in config.provider.kind.api_key_vars() {
            println!("    설정: export {}=your-key", var);
        }
    }

    match open_store(config, data_dir).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("[OK] 벡터 저장소 ({}): {} 레코드", store.name(), count),
            Err(e) => println!("[!] 레코드 수 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 벡터 저장소 열기 실패: {:#}", e),
    }

    Ok(())
}

/// 삭제 명령어 (clear)
async fn cmd_clear(config: &AppConfig, data_dir: &Path) -> Result<()> {
    let store = open_store(config, data_dir).await?;
    let count = store.count().await.unwrap_or(0);

    store.clear_all().await.context("벡터 삭제 실패")?;
    println!("[OK] 벡터 {} 레코드 삭제됨", count);

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn match_label(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::Vector => "VEC",
        MatchType::Keyword => "KEY",
        MatchType::Hybrid => "HYB",
        MatchType::Graph => "GRF",
        MatchType::Fallback => "FBK",
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
