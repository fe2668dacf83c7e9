//! Embeds a few sentences with the configured provider and prints their similarities.
//!
//! Uses the offline hashing provider unless `--fastembed` is passed.

use docqa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider, FeatureHashProvider};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let provider: Arc<dyn EmbeddingProvider> = if std::env::args().any(|a| a == "--fastembed") {
        Arc::new(FastEmbedProvider::create(EmbedConfig::default().with_batch_size(2)).await?)
    } else {
        Arc::new(FeatureHashProvider::default())
    };

    println!("Provider: {}", provider.model_id());

    let texts = vec![
        "Rust is a systems programming language.".to_string(),
        "Systems programming in Rust avoids data races.".to_string(),
        "Sourdough needs a long, slow fermentation.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            let sim: f32 = result.embeddings[i]
                .iter()
                .zip(&result.embeddings[j])
                .map(|(a, b)| a.to_f32() * b.to_f32())
                .sum();
            println!("{sim:.3}  {:?} <-> {:?}", texts[i], texts[j]);
        }
    }

    Ok(())
}
