//! Embeds a few sentences with the local MiniLM model and prints their similarities.
//!
//! Run with: cargo run -p docsift-embed --example simple_embedding

use docsift_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EmbedConfig::default()
        .with_batch_size(2)
        .with_download_progress(true);

    println!("Model: {}", config.model_name());
    println!("Batch size: {}", config.batch_size);

    let provider = FastEmbedProvider::create(config).await?;
    println!(
        "Provider {} ready, dimension {}",
        provider.provider_name(),
        provider.embedding_dimension()
    );

    let texts = vec![
        "My pee has been pink for two days.".to_string(),
        "Hematuria is blood in the urine.".to_string(),
        "The library opens at nine.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    let query = &result.embeddings[0];
    for (text, embedding) in texts.iter().zip(result.embeddings.iter()).skip(1) {
        let cosine: f32 = query.iter().zip(embedding).map(|(a, b)| a * b).sum();
        println!("{cosine:.3}  {text}");
    }

    Ok(())
}
