//! Command handlers for the Crystalys CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use crystalys_core::{
    artifact_url, ArtifactKind, Bzip2Codec, Codec, HttpBlobStore, MatchRecord,
};
use crystalys_runtime::ArtifactPipeline;
use tracing::{debug, info};

use crate::cli::{Commands, ConfigAction};
use crate::config::CliAppConfig;
use crate::error::{CliError, Result};

/// Routes parsed commands to their handlers
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(command: Commands, config: &CliAppConfig) -> Result<()> {
        match command {
            Commands::Url {
                cluster,
                match_id,
                salt,
                kind,
            } => {
                let record = MatchRecord::locator(match_id, cluster, salt);
                println!(
                    "{}",
                    artifact_url(&record, kind, &config.coordinator.artifacts)
                );
                Ok(())
            }
            Commands::Fetch {
                cluster,
                match_id,
                salt,
                kind,
                out,
            } => {
                let record = MatchRecord::locator(match_id, cluster, salt);
                let path = out.unwrap_or_else(|| default_output_path(config, &record, kind));
                let written = fetch_artifact(config, &record, kind, &path).await?;
                println!("{} ({} bytes)", path.display(), written);
                Ok(())
            }
            Commands::Decompress { input, output } => {
                let written = decompress_file(&Bzip2Codec, &input, &output)?;
                println!("{} ({} bytes)", output.display(), written);
                Ok(())
            }
            Commands::Metadata { file, compressed } => {
                let bytes = std::fs::read(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let json =
                    metadata_json(&Bzip2Codec, &bytes, compressed, config.cli.pretty_json)?;
                println!("{}", json);
                Ok(())
            }
            Commands::Config { action } => Self::handle_config(action, config),
        }
    }

    fn handle_config(action: ConfigAction, config: &CliAppConfig) -> Result<()> {
        match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigAction::Save { path } => {
                let path = path
                    .or_else(CliAppConfig::default_config_path)
                    .ok_or_else(|| {
                        CliError::InvalidInput("no home directory, pass a path".to_string())
                    })?;
                config.save_to_file(&path)?;
                info!("Saved configuration to {}", path.display());
                println!("{}", path.display());
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

/// `<output_dir>/<match_id>_<salt>.<token>`
pub fn default_output_path(
    config: &CliAppConfig,
    record: &MatchRecord,
    kind: ArtifactKind,
) -> PathBuf {
    let dir = config
        .cli
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(format!(
        "{}_{}.{}",
        record.match_id,
        record.replay_salt,
        kind.token()
    ))
}

/// Download, decompress and write one artifact
pub async fn fetch_artifact(
    config: &CliAppConfig,
    record: &MatchRecord,
    kind: ArtifactKind,
    path: &Path,
) -> Result<usize> {
    let artifacts = config.coordinator.artifacts.clone();
    let store = HttpBlobStore::new(artifacts.fetch_timeout())?;
    let pipeline = ArtifactPipeline::new(Arc::new(store), Arc::new(Bzip2Codec), artifacts);

    info!(url = %pipeline.url_for(record, kind), "Fetching artifact");
    let bytes = pipeline.download(record, kind).await?;

    write_output(path, &bytes)?;
    Ok(bytes.len())
}

/// Decompress a local `.bz2` artifact into `output`
pub fn decompress_file(codec: &dyn Codec, input: &Path, output: &Path) -> Result<usize> {
    let compressed =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let bytes = codec.decompress(&compressed)?;
    debug!(
        input = %input.display(),
        compressed = compressed.len(),
        decompressed = bytes.len(),
        "Decompressed artifact"
    );

    write_output(output, &bytes)?;
    Ok(bytes.len())
}

/// Decode a metadata artifact and render it as JSON
pub fn metadata_json(
    codec: &dyn Codec,
    bytes: &[u8],
    compressed: bool,
    pretty: bool,
) -> Result<String> {
    let record = if compressed {
        codec.decode_metadata(&codec.decompress(bytes)?)?
    } else {
        codec.decode_metadata(bytes)?
    };

    let json = if pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    Ok(json)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystalys_core::CrystalysError;
    use crystalys_harness::fixtures::{
        compress_bzip2, encoded_metadata_artifact, sample_metadata_record,
    };

    #[test]
    fn test_default_output_path() {
        let mut config = CliAppConfig::default();
        let record = MatchRecord::locator(7_000_000_000, 5, 1234);

        assert_eq!(
            default_output_path(&config, &record, ArtifactKind::Replay),
            PathBuf::from("./7000000000_1234.dem")
        );

        config.cli.output_dir = Some(PathBuf::from("/tmp/replays"));
        assert_eq!(
            default_output_path(&config, &record, ArtifactKind::Metadata),
            PathBuf::from("/tmp/replays/7000000000_1234.meta")
        );
    }

    #[test]
    fn test_decompress_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("match.dem.bz2");
        let output = dir.path().join("out").join("match.dem");
        let replay = b"PBDEMS2\0".repeat(64);
        std::fs::write(&input, compress_bzip2(&replay)).unwrap();

        let written = decompress_file(&Bzip2Codec, &input, &output).unwrap();
        assert_eq!(written, replay.len());
        assert_eq!(std::fs::read(&output).unwrap(), replay);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.bz2");
        std::fs::write(&input, b"<html>not found</html>").unwrap();

        let result = decompress_file(&Bzip2Codec, &input, &dir.path().join("out"));
        assert!(matches!(
            result,
            Err(CliError::Crystalys(CrystalysError::CorruptArtifact { .. }))
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_decompress_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = decompress_file(
            &Bzip2Codec,
            &dir.path().join("missing.bz2"),
            &dir.path().join("out"),
        );
        match result {
            Err(CliError::Other(message)) => assert!(message.contains("missing.bz2")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_metadata_json() {
        let compressed = encoded_metadata_artifact(42);
        let json = metadata_json(&Bzip2Codec, &compressed, true, false).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let expected = serde_json::to_value(sample_metadata_record(42)).unwrap();
        assert_eq!(value, expected);
        assert!(!json.contains('\n'));

        let plain = Bzip2Codec.decompress(&compressed).unwrap();
        let pretty = metadata_json(&Bzip2Codec, &plain, false, true).unwrap();
        assert!(pretty.contains('\n'));
    }
}
