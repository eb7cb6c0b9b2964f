#![deny(clippy::all, clippy::pedantic)]

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use dispensa_api_types::{
    ArtifactInfo, GetValueRequest, GetValueResponse, LoadRequest, LoadResponse, PutValueRequest,
    PutValueResponse, SaveRequest, SaveResponse, StatsResponse,
};
use reqwest::Method;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::args::{AssociateCmd, GetCmd, InspectCmd, LoadCmd, SaveCmd};
use crate::client::{CliError, Ctx, digest_bytes, key_bytes};
use crate::print::print_json;

pub async fn get(ctx: &Ctx, cmd: GetCmd) -> Result<(), CliError> {
    let request = GetValueRequest {
        key: key_bytes(&cmd.key)?,
    };
    let response: GetValueResponse = ctx
        .request(Method::POST, "rpc/v1/get-value", Some(&request))
        .await?;

    match response.value {
        Some(value) if response.found => write_payload(cmd.out.as_deref(), &value),
        _ => Err(CliError::Miss),
    }
}

pub async fn save(ctx: &Ctx, cmd: SaveCmd) -> Result<(), CliError> {
    let data = std::fs::read(&cmd.file).map_err(|source| CliError::InputFile {
        path: cmd.file.display().to_string(),
        source,
    })?;

    let request = SaveRequest {
        cas_id: Sha256::digest(&data).to_vec(),
        data,
        kind: cmd.kind,
        metadata: parse_metadata(&cmd.metadata)?,
        cache_key: cmd.cache_key.map(String::into_bytes),
    };
    let response: SaveResponse = ctx
        .request(Method::POST, "rpc/v1/save", Some(&request))
        .await?;

    print_json(&SaveOutput {
        cas_id: hex::encode(&response.cas_id),
        success: response.success,
        message: response.message,
    })
}

pub async fn load(ctx: &Ctx, cmd: LoadCmd) -> Result<(), CliError> {
    let request = LoadRequest {
        cas_id: digest_bytes(&cmd.cas_id)?,
    };
    let response: LoadResponse = ctx
        .request(Method::POST, "rpc/v1/load", Some(&request))
        .await?;

    match response.data {
        Some(data) if response.found => write_payload(cmd.out.as_deref(), &data),
        _ => Err(CliError::Miss),
    }
}

pub async fn associate(ctx: &Ctx, cmd: AssociateCmd) -> Result<(), CliError> {
    let request = PutValueRequest {
        key: key_bytes(&cmd.key)?,
        cas_id: digest_bytes(&cmd.cas_id)?,
    };
    let _: PutValueResponse = ctx
        .request(Method::POST, "rpc/v1/put-value", Some(&request))
        .await?;
    Ok(())
}

pub async fn stats(ctx: &Ctx) -> Result<(), CliError> {
    let response: StatsResponse = ctx
        .request(Method::GET, "admin/v1/stats", None::<&()>)
        .await?;
    print_json(&response)
}

pub async fn inspect(ctx: &Ctx, cmd: InspectCmd) -> Result<(), CliError> {
    let response: ArtifactInfo = ctx
        .request(
            Method::GET,
            &format!("admin/v1/artifacts/{}", cmd.cas_id),
            None::<&()>,
        )
        .await?;
    print_json(&response)
}

#[derive(Debug, Serialize)]
struct SaveOutput {
    cas_id: String,
    success: bool,
    message: String,
}

fn parse_metadata(entries: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    let mut metadata = BTreeMap::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(CliError::InvalidInput(format!(
                "metadata entry `{entry}` is not key=value"
            )));
        };
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

fn write_payload(out: Option<&Path>, data: &[u8]) -> Result<(), CliError> {
    match out {
        Some(path) => std::fs::write(path, data).map_err(|source| CliError::OutputFile {
            path: PathBuf::from(path).display().to_string(),
            source,
        }),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(data)
                .map_err(|e| CliError::Server(format!("failed to write stdout: {e}")))
        }
    }
}
