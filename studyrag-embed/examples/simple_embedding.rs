//! Embed a query and a few documents with a real model and rank them by L2 distance

use studyrag_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let temp_dir = tempfile::tempdir()?;
    let config = EmbedConfig::new("BAAI/bge-small-en-v1.5")
        .with_cache_dir(temp_dir.path())
        .with_batch_size(2);

    println!("Model: {}", config.model_name);
    println!("Batch size: {}", config.batch_size);

    let provider = FastEmbedProvider::create(config).await?;

    let query = "How does a flat vector index search?";
    let query_vector = provider.embed_query(query).await?;
    println!("Query dimension: {}", query_vector.len());

    let texts = vec![
        "A flat index compares the query against every stored vector.".to_string(),
        "Sourdough needs a long, slow fermentation.".to_string(),
        "Euclidean distance measures straight-line separation.".to_string(),
    ];
    let vectors = provider.embed_documents(&texts).await?;

    let mut ranked: Vec<(f32, &String)> = vectors
        .iter()
        .zip(&texts)
        .map(|(v, text)| {
            let distance = v
                .iter()
                .zip(&query_vector)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>();
            (distance, text)
        })
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    println!("\nQuery: \"{query}\"");
    for (distance, text) in ranked {
        println!("  {distance:.4}  {text}");
    }

    Ok(())
}
