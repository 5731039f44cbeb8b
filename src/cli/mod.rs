pub mod doctor;
pub mod import;

use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use crate::config::{EmbeddingConfig, EndeeMcpConfig};
use crate::embedding::local::{LocalModelSpec, MODEL_CATALOGUE};

/// Download the ONNX model and tokenizer for `model` (or the configured local model).
pub async fn model_download(config: &EmbeddingConfig, model: Option<&str>) -> Result<()> {
    let spec = LocalModelSpec::find(model.unwrap_or(&config.local_model))?;
    let cache_dir = config.resolved_cache_dir();
    let model_dir = spec.model_dir(&cache_dir);
    tokio::fs::create_dir_all(&model_dir)
        .await
        .with_context(|| format!("failed to create cache dir: {}", model_dir.display()))?;

    for (label, url, path) in [
        ("model.onnx", spec.model_url(), spec.model_path(&cache_dir)),
        ("tokenizer.json", spec.tokenizer_url(), spec.tokenizer_path(&cache_dir)),
    ] {
        if path.exists() {
            println!("{label} already exists at {}", path.display());
            continue;
        }
        println!("Downloading {label} for {}...", spec.repo);
        download_file(&url, &path).await?;
        println!("Saved to {}", path.display());
    }

    println!("Model {} ready ({} dimensions).", spec.short_name(), spec.dimensions);
    Ok(())
}

/// Print the local model catalogue and which models are already downloaded.
pub fn model_list(config: &EmbeddingConfig) {
    let cache_dir = config.resolved_cache_dir();
    for spec in MODEL_CATALOGUE {
        let status = if spec.is_downloaded(&cache_dir) {
            "downloaded"
        } else {
            "not downloaded"
        };
        println!("{:<45} {:>4} dims  {status}", spec.repo, spec.dimensions);
    }
}

/// Print the sanitized configuration as JSON.
pub fn print_config(config: &EndeeMcpConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(&config.to_public_json())?;
    println!("{json}");
    Ok(())
}

/// Stream a URL to disk with a progress bar. Writes to a temp file, then renames.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("error reading response")?;
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
