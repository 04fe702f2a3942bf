use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use dnnface::models::{read_metadata, FACE_DETECTION};
use reqwest::blocking::get;
use sha2::{Digest, Sha256};

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fetch `model.onnx` for one catalog version. Returns false when skipped.
fn fetch_version(dir: &Path) -> Result<bool, Box<dyn Error>> {
    let meta_path = dir.join("metadata.json");
    if !meta_path.exists() {
        println!("metadata not found: {}", meta_path.display());
        return Ok(false);
    }
    let meta = read_metadata(&meta_path)?;
    if meta.url.is_empty() || meta.sha256.is_empty() || meta.sha256 == "<to-fill>" {
        println!("skip: provide valid url and sha256 in {}", meta_path.display());
        return Ok(false);
    }

    let model_path = dir.join("model.onnx");
    if model_path.exists() {
        let existing = sha256_hex(&fs::read(&model_path)?);
        if existing == meta.sha256 {
            println!("model up to date: {}", model_path.display());
            return Ok(false);
        }
        println!("checksum changed, refetching: {}", model_path.display());
    }

    println!("downloading {} -> {}", meta.url, model_path.display());
    let buf = get(&meta.url)?.error_for_status()?.bytes()?.to_vec();
    let digest = sha256_hex(&buf);
    if digest != meta.sha256 {
        return Err(format!("checksum mismatch for {}: {} != {}", meta.url, digest, meta.sha256).into());
    }
    fs::write(&model_path, &buf)?;
    println!("saved {} ({} bytes)", model_path.display(), buf.len());
    Ok(true)
}

fn main() -> Result<(), Box<dyn Error>> {
    let base = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models"));
    println!("models directory: {}", base.display());

    let kind_dir = base.join(FACE_DETECTION);
    if !kind_dir.exists() {
        fs::create_dir_all(&kind_dir)?;
        println!("created: {}", kind_dir.display());
    }

    let mut versions: Vec<PathBuf> = fs::read_dir(&kind_dir)?
        .flatten()
        .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    versions.sort();

    let mut fetched = 0;
    for dir in &versions {
        if fetch_version(dir)? {
            fetched += 1;
        }
    }
    println!("{} of {} versions downloaded", fetched, versions.len());
    Ok(())
}
