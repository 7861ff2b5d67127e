use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use niqe::{Niqe, Plane, ReferenceModel};
use rayon::prelude::*;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Parser)]
#[command(
    name = "niqe_rs",
    version,
    about = "No-reference image quality scoring; lower scores are better"
)]
struct Args {
    /// Image files or directories of images to score
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Reference model artifact to use instead of the bundled one
    #[arg(long)]
    model: Option<PathBuf>,

    /// Write the ascending-sorted scores as a JSON map to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Decimal places kept in reported scores
    #[arg(long, default_value_t = 2)]
    precision: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let model = match &args.model {
        Some(path) => ReferenceModel::from_path(path)
            .with_context(|| format!("cannot load reference model {}", path.display()))?,
        None => ReferenceModel::bundled(),
    };
    let scorer = Niqe::with_model(model);

    let files = collect_files(&args.input)?;
    if files.is_empty() {
        bail!("no image files found in the given inputs");
    }

    let progress = ProgressBar::new(files.len() as u64)
        .with_style(ProgressStyle::with_template("{wide_bar} {pos}/{len} {eta}")?);

    let mut results: Vec<(String, f64)> = files
        .par_iter()
        .filter_map(|path| {
            let outcome = score_file(&scorer, path);
            progress.inc(1);
            match outcome {
                Ok(score) => Some((display_name(path), score)),
                Err(err) => {
                    progress.println(format!("skipping {}: {err:#}", path.display()));
                    None
                }
            }
        })
        .collect();
    progress.finish_and_clear();

    if results.is_empty() {
        bail!("none of the {} input files could be scored", files.len());
    }

    let scale = 10f64.powi(args.precision as i32);
    for result in &mut results {
        result.1 = (result.1 * scale).round() / scale;
    }
    results.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let precision = args.precision as usize;
    for (name, score) in &results {
        println!("{score:>10.precision$}  {name}");
    }

    if let Some(path) = &args.json {
        let mut map = serde_json::Map::new();
        for (name, score) in &results {
            map.insert(name.clone(), (*score).into());
        }
        let body = serde_json::to_string_pretty(&serde_json::Value::Object(map))?;
        std::fs::write(path, body).with_context(|| format!("cannot write {}", path.display()))?;
    }

    Ok(())
}

fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let entries = std::fs::read_dir(input)
                .with_context(|| format!("cannot read directory {}", input.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path) {
                    files.push(path);
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn score_file(scorer: &Niqe, path: &Path) -> Result<f64> {
    let image = image::open(path).context("cannot decode image")?;
    let luma = image.to_luma8();
    let (width, height) = luma.dimensions();
    let frame = Plane::from_samples(luma.as_raw(), width as usize, height as usize);
    Ok(scorer.score(&frame)?)
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
