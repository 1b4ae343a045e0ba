use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use docsift::annotator::{PdfAnnotator, NEGATIVE_PREFIX, POSITIVE_PREFIX};
use docsift::config::{AppConfig, SETTINGS_PATH};
use docsift::llm::{LlmClient, PromptKind};
use docsift::models::ModelServices;
use docsift::parser::ExtractionPipeline;
use docsift::ranking::{parse_payloads, Candidate, QueryService, RankedOutput, TextQueryOutput};
use docsift::storage::Database;
use docsift::tts::TtsClient;
use docsift::utils::files::{upload_filename, validate_upload};
use docsift::utils::{logger, DocsiftError};

#[derive(Parser)]
#[command(name = "docsift")]
#[command(about = "PDF 章节提取、相关性排序与高亮标注", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化目录、配置和数据库
    Init,
    /// 上传并解析 PDF
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 列出已上传的文档
    Files,
    /// 输出已上传文档的大纲
    Outline {
        /// uploads 目录下的文件名
        filename: String,
    },
    /// 自由文本查询，输出正向和负相关两组结果
    Query {
        #[arg(short, long)]
        text: String,
        #[command(flatten)]
        source: CandidateSource,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// 角色 + 任务查询
    Role {
        #[arg(long)]
        persona: String,
        #[arg(long)]
        job: String,
        #[command(flatten)]
        source: CandidateSource,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// 只查找与文本负相关的章节
    Contra {
        #[arg(short, long)]
        text: String,
        #[command(flatten)]
        source: CandidateSource,
    },
    /// 生成摘要
    Summary(GenerateArgs),
    /// 生成 "Did you know" 知识点
    DidYouKnow(GenerateArgs),
    /// 生成播客脚本并合成音频
    Podcast(GenerateArgs),
    /// 清理上传文件、音频和数据库记录
    Clean,
}

#[derive(Args)]
struct CandidateSource {
    /// 逗号分隔的文件名，默认使用全部已上传文档
    #[arg(long, value_delimiter = ',')]
    docs: Vec<String>,
    /// 文档列表 JSON（含 sections 或 outline）
    #[arg(long, conflicts_with = "docs")]
    input: Option<PathBuf>,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(short, long, conflicts_with = "file")]
    text: Option<String>,
    /// 文本文件，或 query 命令输出的 JSON
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// 覆盖默认提示词
    #[arg(long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Upload { files } => {
            upload_command(files).await?;
        }
        Commands::Files => {
            files_command().await?;
        }
        Commands::Outline { filename } => {
            outline_command(&filename).await?;
        }
        Commands::Query { text, source, top_k } => {
            query_command(&text, source, top_k).await?;
        }
        Commands::Role { persona, job, source, top_k } => {
            role_command(&persona, &job, source, top_k).await?;
        }
        Commands::Contra { text, source } => {
            contra_command(&text, source).await?;
        }
        Commands::Summary(args) => {
            generate_command(PromptKind::Summary, args).await?;
        }
        Commands::DidYouKnow(args) => {
            generate_command(PromptKind::DidYouKnow, args).await?;
        }
        Commands::Podcast(args) => {
            generate_command(PromptKind::Podcast, args).await?;
        }
        Commands::Clean => {
            clean_command().await?;
        }
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    let app_config = AppConfig::load()?;
    tokio::fs::create_dir_all(&app_config.storage.uploads_dir).await?;
    tokio::fs::create_dir_all(&app_config.storage.audio_dir).await?;
    tokio::fs::create_dir_all("config").await?;

    if Path::new(SETTINGS_PATH).exists() {
        info!("配置文件已存在，保持不变: {}", SETTINGS_PATH);
    } else {
        AppConfig::default().save(SETTINGS_PATH)?;
        info!("已生成配置文件: {}", SETTINGS_PATH);
    }

    let db = open_database(&app_config).await?;
    db.init_schema().await?;

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 编辑 {} 配置模型和 API 密钥", SETTINGS_PATH);
    info!("  2. 运行 'docsift upload <PDF>' 上传文档");
    info!("  3. 运行 'docsift query --text <问题>' 查询");

    Ok(())
}

async fn upload_command(files: Vec<PathBuf>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let services = ModelServices::load(&app_config);
    let classifier = services.classifier()?;
    let db = open_database(&app_config).await?;
    db.init_schema().await?;

    let uploads_dir = PathBuf::from(&app_config.storage.uploads_dir);
    tokio::fs::create_dir_all(&uploads_dir).await?;

    let pipeline = ExtractionPipeline::new();
    let mut results = Vec::new();

    for path in &files {
        let original = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let stored = match store_upload(&app_config, &uploads_dir, path).await {
            Ok(name) => name,
            Err(e) => {
                warn!("跳过 {}: {}", path.display(), e);
                results.push(json!({ "file": original, "error": e.to_string() }));
                continue;
            }
        };

        let stored_path = uploads_dir.join(&stored);
        let layout = pipeline.analyze(&stored_path);
        if layout.is_empty() {
            warn!("{} 中没有可提取的文本，删除副本", original);
            tokio::fs::remove_file(&stored_path).await.ok();
            results.push(json!({ "file": original, "error": "No extractable text found in PDF" }));
            continue;
        }

        let document = pipeline.classify(&layout, classifier.as_ref());
        db.save_document(&stored, &original, &document).await?;
        info!(
            "{} 处理完成: {} 个标题, {} 个章节",
            stored,
            document.outline.outline.len(),
            document.sections.len()
        );

        results.push(json!({
            "file": original,
            "filename": stored,
            "outline": document.outline,
            "sections": document.sections,
            "message": format!(
                "Successfully processed PDF and found {} headings and {} sections",
                document.outline.outline.len(),
                document.sections.len()
            ),
        }));
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// 校验并复制到 uploads 目录，返回存储文件名
async fn store_upload(config: &AppConfig, uploads_dir: &Path, path: &Path) -> Result<String> {
    validate_upload(path, &config.upload.allowed_extensions, config.max_upload_bytes())?;
    let original = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stored = upload_filename(&original, Utc::now())?;
    tokio::fs::copy(path, uploads_dir.join(&stored))
        .await
        .with_context(|| format!("复制文件失败: {}", path.display()))?;
    Ok(stored)
}

async fn files_command() -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;

    let listings = db
        .list_documents()
        .await?
        .iter()
        .map(|d| d.listing())
        .collect::<Result<Vec<_>, _>>()?;
    info!("共 {} 个文档", listings.len());
    println!("{}", serde_json::to_string_pretty(&listings)?);
    Ok(())
}

async fn outline_command(filename: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;

    let document = db
        .get_document(filename)
        .await?
        .ok_or_else(|| DocsiftError::InvalidInput(format!("文档不存在: {}", filename)))?;
    println!("{}", serde_json::to_string_pretty(&document.outline()?)?);
    Ok(())
}

async fn query_command(text: &str, source: CandidateSource, top_k: Option<usize>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let services = ModelServices::load(&app_config);
    let service = QueryService::new(services.embedder()?, &app_config.ranking);
    let db = open_database(&app_config).await?;

    let (documents, candidates) = gather_candidates(&db, &source).await?;
    info!("从 {} 个文档收集到 {} 个候选章节", documents.len(), candidates.len());

    let TextQueryOutput { mut positive, mut negative } =
        service.text_query(text, &documents, &candidates, top_k).await?;
    annotate(&app_config, &mut positive, POSITIVE_PREFIX);
    annotate(&app_config, &mut negative, NEGATIVE_PREFIX);

    let output = TextQueryOutput { positive, negative };
    let output_json = serde_json::to_string_pretty(&output)?;
    db.save_query_run("text", text, &output_json).await?;
    println!("{}", output_json);
    Ok(())
}

async fn role_command(persona: &str, job: &str, source: CandidateSource, top_k: Option<usize>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let services = ModelServices::load(&app_config);
    let service = QueryService::new(services.embedder()?, &app_config.ranking);
    let db = open_database(&app_config).await?;

    let (documents, candidates) = gather_candidates(&db, &source).await?;
    let mut output = service
        .persona_query(persona, job, &documents, &candidates, top_k)
        .await?;
    annotate(&app_config, &mut output, POSITIVE_PREFIX);

    let output_json = serde_json::to_string_pretty(&output)?;
    db.save_query_run("persona", &format!("{} {}", job, persona), &output_json)
        .await?;
    println!("{}", output_json);
    Ok(())
}

async fn contra_command(text: &str, source: CandidateSource) -> Result<()> {
    let app_config = AppConfig::load()?;
    let services = ModelServices::load(&app_config);
    let service = QueryService::new(services.embedder()?, &app_config.ranking);
    let db = open_database(&app_config).await?;

    let (documents, candidates) = gather_candidates(&db, &source).await?;
    let mut output = service
        .contradiction_query(text, &documents, &candidates)
        .await?;
    annotate(&app_config, &mut output, NEGATIVE_PREFIX);
    info!("找到 {} 个负相关章节", output.extracted_sections.len());

    let output_json = serde_json::to_string_pretty(&output)?;
    db.save_query_run("contradiction", text, &output_json).await?;
    println!("{}", output_json);
    Ok(())
}

async fn generate_command(kind: PromptKind, args: GenerateArgs) -> Result<()> {
    let app_config = AppConfig::load()?;
    let body = read_body(&args).await?;
    let prompt = kind.build_prompt(&body, args.prompt.as_deref());

    let llm = LlmClient::new(app_config.llm.clone())?;
    info!("调用 LLM ({:?})...", llm.provider());
    let generated = llm.generate(&prompt).await?;

    let output = match kind {
        PromptKind::Summary => json!({ "summary": generated }),
        PromptKind::DidYouKnow => json!({ "didYouKnow": generated }),
        PromptKind::Podcast => {
            let tts = TtsClient::new(app_config.tts.clone())?;
            let filename = format!("podcast_{}.mp3", Utc::now().timestamp());
            let audio_path = Path::new(&app_config.storage.audio_dir).join(filename);
            tts.synthesize(&generated, tts.default_language(), &audio_path).await?;
            json!({ "script": generated, "audio_path": audio_path })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn clean_command() -> Result<()> {
    info!("开始清理缓存数据...");
    let app_config = AppConfig::load()?;

    for dir in [&app_config.storage.uploads_dir, &app_config.storage.audio_dir] {
        let removed = clear_directory(Path::new(dir)).await?;
        info!("已删除 {} 中的 {} 个文件", dir, removed);
    }

    if Path::new(&app_config.storage.database_path).exists() {
        let db = open_database(&app_config).await?;
        db.init_schema().await?;
        db.clear_all_tables().await?;
    }

    info!("✅ 清理完成");
    Ok(())
}

/// 删除目录下的文件，保留目录本身
async fn clear_directory(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn open_database(config: &AppConfig) -> Result<Database> {
    let db_path = Path::new(&config.storage.database_path);
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db = Database::new(&format!("sqlite:{}", db_path.display())).await?;
    Ok(db)
}

/// 候选章节来源：--input JSON，--docs 指定文档，或全部已上传文档
async fn gather_candidates(db: &Database, source: &CandidateSource) -> Result<(Vec<String>, Vec<Candidate>)> {
    if let Some(input) = &source.input {
        let content = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("读取文档列表失败: {}", input.display()))?;
        let payloads = parse_payloads(&content)?;
        let documents = payloads.iter().map(|p| p.filename.clone()).collect();
        let candidates = payloads.iter().flat_map(|p| p.candidates()).collect();
        return Ok((documents, candidates));
    }

    db.init_schema().await?;
    let stored = if source.docs.is_empty() {
        db.list_documents().await?
    } else {
        let mut stored = Vec::with_capacity(source.docs.len());
        for name in &source.docs {
            let document = db
                .get_document(name)
                .await?
                .ok_or_else(|| DocsiftError::InvalidInput(format!("文档不存在: {}", name)))?;
            stored.push(document);
        }
        stored
    };

    let mut documents = Vec::with_capacity(stored.len());
    let mut candidates = Vec::new();
    for document in &stored {
        documents.push(document.filename.clone());
        match document.sections() {
            Ok(sections) => candidates.extend(
                sections
                    .iter()
                    .map(|s| Candidate::from_section(&document.filename, s)),
            ),
            Err(e) => error!("读取 {} 的章节失败: {}", document.filename, e),
        }
    }
    Ok((documents, candidates))
}

fn annotate(config: &AppConfig, output: &mut RankedOutput, prefix: &str) {
    let annotator = PdfAnnotator::new(&config.storage.uploads_dir, prefix);
    output.metadata.annotated_files = annotator.annotate(&output.selected_regions());
}

/// 生成任务的正文：--text，或文件内容；query 输出的 JSON 取其 sections_formatted
async fn read_body(args: &GenerateArgs) -> Result<String> {
    let body = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(file)) => {
            let content = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("读取文件失败: {}", file.display()))?;
            formatted_sections(&content).unwrap_or(content)
        }
        (None, None) => String::new(),
    };

    if body.trim().is_empty() {
        return Err(DocsiftError::InvalidInput("缺少正文，请使用 --text 或 --file".to_string()).into());
    }
    Ok(body)
}

fn formatted_sections(content: &str) -> Option<String> {
    if let Ok(output) = serde_json::from_str::<TextQueryOutput>(content) {
        return Some(output.positive.sections_formatted);
    }
    serde_json::from_str::<RankedOutput>(content)
        .ok()
        .map(|o| o.sections_formatted)
}
