//! Command-line surface for `dispensa-cli`.
#![deny(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dispensa-cli", version, about = "dispensa artifact cache CLI", long_about = None)]
pub struct Cli {
    /// Server base URL, e.g. <http://127.0.0.1:7575>
    #[arg(long, env = "DISPENSA_SERVER_URL")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up a cache key and write the artifact payload out
    Get(GetCmd),
    /// Store an artifact payload content-addressed
    Save(SaveCmd),
    /// Read an artifact directly by digest
    Load(LoadCmd),
    /// Associate a cache key with a stored digest
    Associate(AssociateCmd),
    /// Show server cache statistics
    Stats,
    /// Inspect a resident artifact (kind, size, metadata)
    Inspect(InspectCmd),
}

#[derive(Args, Debug)]
pub struct GetCmd {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Write the payload here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SaveCmd {
    /// File holding the artifact payload
    pub file: PathBuf,

    /// Artifact type tag (pcm, o, metadata, ...)
    #[arg(long = "type", default_value = "o")]
    pub kind: String,

    /// Metadata entries as key=value (repeatable)
    #[arg(long = "meta")]
    pub metadata: Vec<String>,

    /// Also associate this cache key (requires inline association on the server)
    #[arg(long)]
    pub cache_key: Option<String>,
}

#[derive(Args, Debug)]
pub struct LoadCmd {
    /// Artifact digest in hex
    pub cas_id: String,

    /// Write the payload here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AssociateCmd {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Artifact digest in hex
    pub cas_id: String,
}

#[derive(Args, Debug)]
pub struct InspectCmd {
    /// Artifact digest in hex
    pub cas_id: String,
}

/// Cache keys are opaque bytes; accept them either as a literal string
/// or as hex for keys that are not valid UTF-8.
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Cache key as a literal string
    #[arg(long, conflicts_with = "key_hex")]
    pub key: Option<String>,

    /// Cache key as hex bytes
    #[arg(long)]
    pub key_hex: Option<String>,
}
