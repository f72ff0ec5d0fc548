//! # Keygen: generate the issuer's Ed25519 Multikey pair.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use obadge_engine::keys;

use crate::{CliContext, EXIT_OK};

/// `obadge keygen` arguments.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory for the key files (default: next to the configured private key).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Key fragment, used in the verification method id and file names.
    #[arg(long, default_value = "key-1")]
    pub key_id: String,

    /// Controller DID (default: the configured issuer id).
    #[arg(long)]
    pub issuer_id: Option<String>,

    /// Overwrite an existing private key.
    #[arg(long)]
    pub force: bool,
}

/// Execute `obadge keygen`.
pub fn run_keygen(args: &KeygenArgs, ctx: &CliContext) -> Result<u8> {
    let config = ctx.config()?;
    let out_dir = match &args.output_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => ctx.repo_root.join(dir),
        None => ctx
            .paths(&config)
            .private_key
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| ctx.repo_root.clone()),
    };
    let issuer = args.issuer_id.as_deref().unwrap_or(&config.issuer.id);
    let files = keys::generate(&out_dir, issuer, &args.key_id, args.force)
        .with_context(|| format!("generating key pair in {}", out_dir.display()))?;

    println!("Generated {}", files.verification_method);
    println!("  private: {}", files.private.display());
    println!("  public:  {}", files.public.display());
    println!();
    println!("Keep the private key out of version control; CI can supply it through");
    println!(
        "the {} environment variable instead.",
        config.signing_key_env.as_deref().unwrap_or("configured signing key")
    );
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_pair_under_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext { repo_root: dir.path().to_path_buf(), config_path: None };
        let args = KeygenArgs {
            output_dir: None,
            key_id: "key-1".into(),
            issuer_id: None,
            force: false,
        };
        assert_eq!(run_keygen(&args, &ctx).unwrap(), EXIT_OK);
        assert!(dir.path().join("keys/key-1-private.json").is_file());
        assert!(dir.path().join("keys/key-1-public.json").is_file());
        assert!(run_keygen(&args, &ctx).is_err());
    }
}
