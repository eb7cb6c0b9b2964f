#![deny(clippy::all, clippy::pedantic)]

use reqwest::{Client, Method, Response, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::args::{Cli, KeyArgs};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("server URL is required (use --server or DISPENSA_SERVER_URL)")]
    MissingServer,
    #[error("failed to read input file {path}: {source}")]
    InputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write output file {path}: {source}")]
    OutputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Server(String),
    #[error("cache miss")]
    Miss,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone, Debug)]
pub struct Ctx {
    pub client: Client,
    pub base: Url,
}

impl Ctx {
    pub fn new(server: &str) -> Result<Self, CliError> {
        let base = Url::parse(server)?.join("/")?;
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("dispensa-cli/", env!("CARGO_PKG_VERSION"))
    }

    pub fn url(&self, path: &str) -> Result<Url, CliError> {
        self.base.join(path).map_err(CliError::Url)
    }

    pub async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<T, CliError> {
        let mut req = self.client.request(method, self.url(path)?);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await?;
        Self::handle(resp).await
    }

    async fn handle<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T, CliError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(CliError::Server(format!("status {status} body {text}")));
        }
        let val = serde_json::from_slice(&bytes)
            .map_err(|e| CliError::Server(format!("failed to parse body: {e}")))?;
        Ok(val)
    }
}

pub fn build_ctx_from_cli(cli: &Cli) -> Result<Ctx, CliError> {
    let server = cli.server.clone().ok_or(CliError::MissingServer)?;
    Ctx::new(&server)
}

/// Resolve a key argument pair into raw key bytes.
pub fn key_bytes(args: &KeyArgs) -> Result<Vec<u8>, CliError> {
    match (&args.key, &args.key_hex) {
        (Some(text), None) => Ok(text.clone().into_bytes()),
        (None, Some(hex_text)) => hex::decode(hex_text)
            .map_err(|e| CliError::InvalidInput(format!("key is not valid hex: {e}"))),
        (None, None) => Err(CliError::InvalidInput(
            "a cache key is required (use --key or --key-hex)".to_string(),
        )),
        (Some(_), Some(_)) => Err(CliError::InvalidInput(
            "use either --key or --key-hex, not both".to_string(),
        )),
    }
}

/// Parse a hex digest argument into wire bytes (length checked
/// server-side).
pub fn digest_bytes(hex_text: &str) -> Result<Vec<u8>, CliError> {
    hex::decode(hex_text).map_err(|e| CliError::InvalidInput(format!("cas_id is not valid hex: {e}")))
}
