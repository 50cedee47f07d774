//! Threatmap CLI library
//!
//! This module contains the core CLI logic for the Threatmap tool.

pub mod error_adapter;

mod args;
mod config;

pub use args::{Args, Command, ShareCommand};

use std::{
    fs,
    io::{self, Write},
};

use log::{info, warn};

use threatmap::{DocumentBuilder, ThreatmapError, share::RepositoryMetadata};
use threatmap_yaml::error::ParseError;

/// Run the Threatmap CLI application
///
/// # Errors
///
/// Returns `ThreatmapError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Parsing errors, and validation warnings under `--deny-warnings`
/// - Share payloads that fail to decode
pub fn run(args: &Args) -> Result<(), ThreatmapError> {
    let app_config = config::load_config(args.config.as_ref())?;
    let builder = DocumentBuilder::new(app_config);

    match &args.command {
        Command::Graph { input, output } => {
            info!(input_path = input; "Deriving graph");
            let source = fs::read_to_string(input)?;
            let model = builder.parse(&source)?;
            let graph = builder.graph(&model);
            let json = serde_json::to_string_pretty(&graph)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            write_output(output.as_deref(), &json)?;
            info!(nodes = graph.nodes.len(), edges = graph.edges.len(); "Graph written");
        }
        Command::Validate {
            input,
            deny_warnings,
        } => {
            info!(input_path = input; "Validating document");
            let source = fs::read_to_string(input)?;
            let warnings = builder.validate(&source)?;
            if warnings.is_empty() {
                info!("No problems found");
            } else if *deny_warnings {
                return Err(ThreatmapError::new_parse_error(
                    ParseError::new(warnings),
                    source,
                ));
            } else {
                for rendered in error_adapter::render_diagnostics(&warnings, &source) {
                    warn!("{rendered}");
                }
            }
        }
        Command::Regenerate {
            input,
            output,
            in_place,
        } => {
            info!(input_path = input; "Regenerating refs");
            let source = fs::read_to_string(input)?;
            let regeneration = builder.regenerate(&source)?;
            let target = if *in_place {
                Some(input.as_str())
            } else {
                output.as_deref()
            };
            write_output(target, &regeneration.yaml)?;
            info!(changed = regeneration.changed().count(); "Refs regenerated");
        }
        Command::Share(ShareCommand::Encode {
            input,
            base_url,
            repository,
            branch,
            path,
            sha,
        }) => {
            let source = fs::read_to_string(input)?;
            let model = builder.parse(&source)?;
            let metadata = repository
                .as_deref()
                .map(|repo| {
                    let path = path.as_deref().unwrap_or(input.as_str());
                    repository_metadata(repo, branch, path, sha.as_deref())
                })
                .transpose()?;

            let payload = builder.encode_share(&model, metadata.as_ref())?;
            let separator = if base_url.contains('?') { '&' } else { '?' };
            let link = format!(
                "{base_url}{separator}{}={payload}",
                threatmap::share::SHARE_QUERY_PARAM
            );
            write_output(None, &link)?;
            info!(payload_len = payload.len(); "Share link created");
        }
        Command::Share(ShareCommand::Decode { link, output }) => {
            let state = builder.decode_share(link)?;
            if let Some(metadata) = &state.metadata {
                info!(
                    repository = format!("{}/{}/{}", metadata.domain, metadata.owner, metadata.repository),
                    branch = metadata.branch,
                    path = metadata.path;
                    "Shared document origin"
                );
            }
            let yaml = serde_yaml::to_string(&state.model)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            write_output(output.as_deref(), &yaml)?;
        }
    }

    Ok(())
}

/// Splits `domain/owner/name` into share metadata.
fn repository_metadata(
    repository: &str,
    branch: &str,
    path: &str,
    sha: Option<&str>,
) -> Result<RepositoryMetadata, ThreatmapError> {
    let mut parts = repository.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(domain), Some(owner), Some(name))
            if !domain.is_empty() && !owner.is_empty() && !name.is_empty() =>
        {
            Ok(RepositoryMetadata {
                domain: domain.to_string(),
                owner: owner.to_string(),
                repository: name.to_string(),
                branch: branch.to_string(),
                path: path.to_string(),
                sha: sha.map(str::to_string),
            })
        }
        _ => Err(ThreatmapError::Config(format!(
            "repository must look like `domain/owner/name`, got `{repository}`"
        ))),
    }
}

fn write_output(path: Option<&str>, content: &str) -> io::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content)?;
            info!(output_file = path; "Output written");
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}
