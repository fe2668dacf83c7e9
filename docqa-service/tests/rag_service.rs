use async_trait::async_trait;
use docqa_embed::{EmbeddingBackend, EmbeddingProvider, FeatureHashProvider};
use docqa_retriever::storage::sqlite_store::SqliteVectorIndex;
use docqa_service::generator::NO_CONTEXT_ANSWER;
use docqa_service::{
    AnswerGenerator, DocqaConfig, ExtractiveGenerator, GenerationError, GenerationParams,
    GeneratorBackend, IndexAccess, QueryError, RagService, ServiceError,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

const SOLAR: &str = "Solar panels usually last twenty five years before their output \
drops noticeably. Panel warranties cover manufacturing defects for the same period.";

const GARDEN: &str = "Tomatoes need full sun and regular watering. Mulch keeps the soil \
moist through the summer and suppresses weeds.";

fn offline_config(root: &Path) -> DocqaConfig {
    let mut config = DocqaConfig::default();
    config.paths.index_dir = root.join("vectorstore");
    config.paths.intake_dir = root.join("data");
    config.embedding.provider = EmbeddingBackend::FeatureHash;
    config.generation.backend = GeneratorBackend::Extractive;
    config
}

async fn write_intake(root: &Path) -> anyhow::Result<()> {
    let intake = root.join("data");
    tokio::fs::create_dir_all(&intake).await?;
    tokio::fs::write(intake.join("solar.txt"), SOLAR).await?;
    tokio::fs::write(intake.join("garden.txt"), GARDEN).await?;
    Ok(())
}

/// Records what it was asked and answers with a fixed string.
#[derive(Default)]
struct ScriptedGenerator {
    calls: Mutex<Vec<(String, String, GenerationParams)>>,
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        question: &str,
        context: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_string(), *params));
        Ok("scripted answer".to_string())
    }
}

struct StalledGenerator;

#[async_trait]
impl AnswerGenerator for StalledGenerator {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(
        &self,
        _question: &str,
        _context: &str,
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
    }
}

struct ExhaustedGenerator;

#[async_trait]
impl AnswerGenerator for ExhaustedGenerator {
    fn name(&self) -> &str {
        "exhausted"
    }

    async fn generate(
        &self,
        _question: &str,
        _context: &str,
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Exhausted("quota used up".to_string()))
    }
}

async fn service_with(
    root: &Path,
    generator: Arc<dyn AnswerGenerator>,
    configure: impl FnOnce(&mut DocqaConfig),
) -> anyhow::Result<RagService> {
    let mut config = offline_config(root);
    configure(&mut config);
    let index = Arc::new(SqliteVectorIndex::open(&config.paths.index_dir).await?);
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(FeatureHashProvider::new(config.embedding.dimension)?);
    Ok(RagService::from_parts(config, index, embedder, generator).await?)
}

#[tokio::test]
async fn test_ingest_then_answer_with_sources() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;

    let service = RagService::open(offline_config(dir.path()), IndexAccess::CreateIfMissing).await?;
    let report = service.ingest_intake().await?;
    assert_eq!(report.counts(), (2, 2));

    let record = service.answer("How long do solar panels last?").await?;
    assert_eq!(record.question, "How long do solar panels last?");
    assert!(!record.answer_text.is_empty());
    assert_eq!(record.sources.len(), 2);
    assert!(record.sources[0].title.ends_with("solar.txt"));
    assert!(record.sources[0].score >= record.sources[1].score);
    assert_eq!(
        record.sources[0].snippet,
        SOLAR.chars().take(200).collect::<String>()
    );
    assert!(record.answer_text.starts_with("Solar panels usually last"));
    Ok(())
}

#[tokio::test]
async fn test_empty_index_still_answers() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let service = RagService::open(offline_config(dir.path()), IndexAccess::CreateIfMissing).await?;

    let record = service.answer("Is anything indexed?").await?;
    assert_eq!(record.answer_text, NO_CONTEXT_ANSWER);
    assert!(record.sources.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_index_passes_empty_context() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let generator = Arc::new(ScriptedGenerator::default());
    let service = service_with(dir.path(), generator.clone(), |_| {}).await?;

    let record = service.answer("anything?").await?;
    assert_eq!(record.answer_text, "scripted answer");
    assert!(record.sources.is_empty());

    let calls = generator.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "");
    Ok(())
}

#[tokio::test]
async fn test_generator_receives_ranked_context() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;
    let generator = Arc::new(ScriptedGenerator::default());
    let service = service_with(dir.path(), generator.clone(), |_| {}).await?;
    service.ingest_intake().await?;

    service
        .answer("  Do tomatoes need full sun and regular watering?  ")
        .await?;

    let calls = generator.calls.lock().unwrap();
    let (question, context, params) = &calls[0];
    assert_eq!(question, "Do tomatoes need full sun and regular watering?");
    assert_eq!(context, &format!("{GARDEN}\n\n{SOLAR}"));
    assert_eq!(params.max_tokens, 200);
    assert_eq!(params.temperature, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_context_budget_applies() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;
    let generator = Arc::new(ScriptedGenerator::default());
    let service = service_with(dir.path(), generator.clone(), |config| {
        config.query.max_context_chars = 40;
        config.query.top_k = 1;
    })
    .await?;
    service.ingest_intake().await?;

    let record = service.answer("solar panel warranties").await?;
    assert_eq!(record.sources.len(), 1);

    let calls = generator.calls.lock().unwrap();
    assert_eq!(calls[0].1.chars().count(), 40);
    assert!(SOLAR.starts_with(calls[0].1.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_answers_are_deterministic_across_reopen() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;
    let config = offline_config(dir.path());
    let question = "What do panel warranties cover?";

    let first = {
        let service = RagService::open(config.clone(), IndexAccess::CreateIfMissing).await?;
        service.ingest_intake().await?;
        let a = service.answer(question).await?;
        let b = service.answer(question).await?;
        assert_eq!(a, b);
        a
    };

    let reopened = RagService::open(config, IndexAccess::ExistingOnly).await?;
    let again = reopened.answer(question).await?;
    assert_eq!(again.answer_text, first.answer_text);
    assert_eq!(again.sources, first.sources);
    Ok(())
}

#[tokio::test]
async fn test_reingest_reports_duplicates() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;
    let service = RagService::open(offline_config(dir.path()), IndexAccess::CreateIfMissing).await?;

    let first = service.ingest_intake().await?;
    let second = service.ingest_intake().await?;

    assert_eq!(first.chunks_inserted, 2);
    assert_eq!(second.counts(), (2, 2));
    assert_eq!(second.chunks_inserted, 0);
    assert_eq!(second.duplicates_skipped, 2);
    assert_eq!(service.stats().await?.chunks, 2);
    Ok(())
}

#[tokio::test]
async fn test_ingest_explicit_paths_with_unsupported_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;
    let slides = dir.path().join("data/deck.pptx");
    tokio::fs::write(&slides, b"not really slides").await?;

    let service = RagService::open(offline_config(dir.path()), IndexAccess::CreateIfMissing).await?;
    let report = service
        .ingest(&[dir.path().join("data/solar.txt"), slides.clone()])
        .await?;

    assert_eq!(report.counts(), (1, 1));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, slides);
    Ok(())
}

#[tokio::test]
async fn test_empty_question_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let generator = Arc::new(ScriptedGenerator::default());
    let service = service_with(dir.path(), generator.clone(), |_| {}).await?;

    assert!(matches!(
        service.answer("   ").await,
        Err(QueryError::EmptyQuestion)
    ));
    assert!(generator.calls.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_generator_timeout_is_typed() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let service = service_with(dir.path(), Arc::new(StalledGenerator), |config| {
        config.generation.timeout_secs = 1;
    })
    .await?;

    let result = service.answer("will this finish?").await;
    assert!(matches!(
        result,
        Err(QueryError::Generation(GenerationError::Timeout { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn test_generator_exhaustion_is_not_retried() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let service = service_with(dir.path(), Arc::new(ExhaustedGenerator), |_| {}).await?;

    let result = service.answer("anyone there?").await;
    assert!(matches!(
        result,
        Err(QueryError::Generation(GenerationError::Exhausted(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_query_requires_existing_index() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let result = RagService::open(offline_config(dir.path()), IndexAccess::ExistingOnly).await;
    assert!(matches!(result, Err(ServiceError::Index(_))));
    assert!(!dir.path().join("vectorstore").exists());
    Ok(())
}

#[tokio::test]
async fn test_extractive_generator_through_service() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_intake(dir.path()).await?;
    let service = service_with(dir.path(), Arc::new(ExtractiveGenerator::new(1)), |config| {
        config.query.top_k = 1;
    })
    .await?;
    service.ingest_intake().await?;

    let record = service.answer("mulch and soil in summer").await?;
    assert_eq!(record.answer_text, "Tomatoes need full sun and regular watering.");
    assert!(record.sources[0].title.ends_with("garden.txt"));
    Ok(())
}
