//! Command-line argument definitions for the Threatmap CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Global flags select the configuration file and logging
//! verbosity; each [`Command`] works on one threat-model document.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Threatmap tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Derive the diagram graph and write it as JSON
    Graph {
        /// Path to the input threat-model YAML file
        input: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Check a document for duplicate refs and dangling references
    Validate {
        input: String,

        /// Fail when the document has warnings
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Rebuild every ref from the entity names
    Regenerate {
        input: String,

        /// Output file; stdout when omitted
        #[arg(short, long, conflicts_with = "in_place")]
        output: Option<String>,

        /// Rewrite the input file
        #[arg(long)]
        in_place: bool,
    },

    /// Pack a document into a share link, or unpack one
    #[command(subcommand)]
    Share(ShareCommand),
}

#[derive(Subcommand, Debug)]
pub enum ShareCommand {
    /// Encode a document as a link
    Encode {
        input: String,

        /// Editor URL the payload is appended to
        #[arg(long, default_value = "https://threatmap.dev/")]
        base_url: String,

        /// Source repository as `domain/owner/name`
        #[arg(long)]
        repository: Option<String>,

        #[arg(long, default_value = "main", requires = "repository")]
        branch: String,

        /// Path of the document inside the repository; defaults to the input path
        #[arg(long, requires = "repository")]
        path: Option<String>,

        #[arg(long, requires = "repository")]
        sha: Option<String>,
    },

    /// Decode a link or bare payload back into YAML
    Decode {
        /// Share link or payload
        link: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },
}
