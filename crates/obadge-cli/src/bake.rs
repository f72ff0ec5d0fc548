//! # Bake / Extract: manual badge baking.
//!
//! ```bash
//! obadge bake svg --credential credential.json --template tsc.svg -o badge.svg
//! obadge bake png --credential credential.json --template tsc.png -o badge.png
//! obadge extract badge.png > credential.json
//! ```
//!
//! The credential bytes are embedded as-is, so a file signed elsewhere still
//! verifies after extraction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use obadge_bake::{BakeError, ImageKind};
use obadge_core::fsio::write_atomic;

use crate::{resolve_path, CliContext, EXIT_NEGATIVE, EXIT_OK};

/// Image format to bake into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BakeFormat {
    /// SVG with an `openbadges:credential` element.
    Svg,
    /// PNG with an `openbadges` iTXt chunk.
    Png,
}

impl From<BakeFormat> for ImageKind {
    fn from(f: BakeFormat) -> Self {
        match f {
            BakeFormat::Svg => ImageKind::Svg,
            BakeFormat::Png => ImageKind::Png,
        }
    }
}

/// `obadge bake` arguments.
#[derive(Args, Debug)]
pub struct BakeArgs {
    /// Output format.
    pub format: BakeFormat,

    /// Signed credential document to embed.
    #[arg(long, value_name = "FILE")]
    pub credential: PathBuf,

    /// Unbaked badge image.
    #[arg(long, value_name = "IMAGE")]
    pub template: PathBuf,

    /// Where to write the baked image.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Verification URL advertised in SVG output (default: configured `verify_url`).
    #[arg(long)]
    pub verify_url: Option<String>,
}

/// `obadge extract` arguments.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Baked SVG or PNG badge.
    pub file: PathBuf,

    /// Write the credential here instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Execute `obadge bake`.
pub fn run_bake(args: &BakeArgs, ctx: &CliContext) -> Result<u8> {
    let verify_url = match &args.verify_url {
        Some(url) => url.clone(),
        None => ctx.config()?.verify_url,
    };
    let credential = resolve_path(&args.credential, &ctx.repo_root);
    let template = resolve_path(&args.template, &ctx.repo_root);
    let document = std::fs::read(&credential)
        .with_context(|| format!("reading {}", credential.display()))?;
    serde_json::from_slice::<serde_json::Value>(&document)
        .with_context(|| format!("{} is not a JSON document", credential.display()))?;
    let image = std::fs::read(&template).with_context(|| format!("reading {}", template.display()))?;

    let baked = obadge_bake::bake(&document, &image, args.format.into(), &verify_url)
        .with_context(|| format!("baking into {}", template.display()))?;
    write_atomic(&args.output, &baked).with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(output = %args.output.display(), bytes = baked.len(), "badge baked");
    println!("Baked {}", args.output.display());
    Ok(EXIT_OK)
}

/// Execute `obadge extract`.
pub fn run_extract(args: &ExtractArgs, ctx: &CliContext) -> Result<u8> {
    let file = resolve_path(&args.file, &ctx.repo_root);
    let image = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let document = match obadge_bake::extract(&image) {
        Ok(doc) => doc,
        Err(BakeError::MissingPayload) => {
            eprintln!("{}: no baked credential", file.display());
            return Ok(EXIT_NEGATIVE);
        }
        Err(e) => return Err(e).with_context(|| format!("extracting from {}", file.display())),
    };
    match &args.output {
        Some(out) => {
            write_atomic(out, &document).with_context(|| format!("writing {}", out.display()))?;
            println!("Extracted to {}", out.display());
        }
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&document).context("writing to stdout")?;
            if !document.ends_with(b"\n") {
                stdout.write_all(b"\n").context("writing to stdout")?;
            }
        }
    }
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#;

    #[test]
    fn bake_then_extract_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext { repo_root: dir.path().to_path_buf(), config_path: None };
        let doc = br#"{"id":"https://credentials.cognipilot.org/profile/a/b"}"#;
        std::fs::write(dir.path().join("credential.json"), doc).unwrap();
        std::fs::write(dir.path().join("template.svg"), SVG).unwrap();

        let baked = dir.path().join("badge.svg");
        let args = BakeArgs {
            format: BakeFormat::Svg,
            credential: dir.path().join("credential.json"),
            template: dir.path().join("template.svg"),
            output: baked.clone(),
            verify_url: None,
        };
        assert_eq!(run_bake(&args, &ctx).unwrap(), EXIT_OK);

        let out = dir.path().join("out.json");
        let extract = ExtractArgs { file: baked, output: Some(out.clone()) };
        assert_eq!(run_extract(&extract, &ctx).unwrap(), EXIT_OK);
        assert_eq!(std::fs::read(out).unwrap(), doc.to_vec());
    }

    #[test]
    fn unbaked_image_is_negative() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext { repo_root: dir.path().to_path_buf(), config_path: None };
        std::fs::write(dir.path().join("plain.svg"), SVG).unwrap();
        let args = ExtractArgs { file: dir.path().join("plain.svg"), output: None };
        assert_eq!(run_extract(&args, &ctx).unwrap(), EXIT_NEGATIVE);
    }

    #[test]
    fn bake_rejects_non_json_credential() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext { repo_root: dir.path().to_path_buf(), config_path: None };
        std::fs::write(dir.path().join("c.json"), b"not json").unwrap();
        std::fs::write(dir.path().join("t.svg"), SVG).unwrap();
        let args = BakeArgs {
            format: BakeFormat::Svg,
            credential: dir.path().join("c.json"),
            template: dir.path().join("t.svg"),
            output: dir.path().join("o.svg"),
            verify_url: Some("https://example.org/verify".into()),
        };
        assert!(run_bake(&args, &ctx).is_err());
    }
}
