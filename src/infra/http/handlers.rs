use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use dispensa_api_types::{
    ArtifactInfo, GetValueRequest, GetValueResponse, LoadRequest, LoadResponse, PutValueRequest,
    PutValueResponse, SaveRequest, SaveResponse, StatsResponse,
};

use crate::domain::{ArtifactKind, CacheKey, CasId};
use crate::service::StoreCommand;

use super::AppState;
use super::error::{ErrorReport, RpcError, service_status};

/// `POST /rpc/v1/get-value`: resolve a cache key and return the full
/// artifact inline. A miss is a normal `found: false` response.
pub async fn get_value(
    State(state): State<AppState>,
    Json(request): Json<GetValueRequest>,
) -> Result<Json<GetValueResponse>, RpcError> {
    let key = CacheKey::from(request.key);
    let artifact = state
        .dispatch
        .lookup(key)
        .await
        .map_err(|err| RpcError::from_service("infra::http::get_value", err))?;

    Ok(Json(match artifact {
        Some(artifact) => GetValueResponse {
            found: true,
            value: Some(artifact.data().to_vec()),
        },
        None => GetValueResponse {
            found: false,
            value: None,
        },
    }))
}

/// `POST /rpc/v1/save`: content-addressed store. The response always
/// carries the `save` envelope; a rejected store reports `success:
/// false` with the mapped transport status instead of the generic
/// error envelope.
pub async fn save(State(state): State<AppState>, Json(request): Json<SaveRequest>) -> Response {
    // A malformed digest claim is handled like a mismatch downstream,
    // never a request failure.
    let declared_id = CasId::from_bytes(&request.cas_id).ok();
    let command = StoreCommand {
        declared_id,
        data: Bytes::from(request.data),
        kind: ArtifactKind::parse(&request.kind),
        metadata: request.metadata,
        cache_key: request.cache_key.map(CacheKey::from),
    };

    match state.dispatch.store(command).await {
        Ok(receipt) => Json(SaveResponse {
            cas_id: receipt.cas_id.as_bytes().to_vec(),
            success: true,
            message: receipt.message,
        })
        .into_response(),
        Err(err) => {
            let (status, _) = service_status(&err);
            let message = err.to_string();
            let mut response = (
                status,
                Json(SaveResponse {
                    cas_id: Vec::new(),
                    success: false,
                    message: message.clone(),
                }),
            )
                .into_response();
            ErrorReport::from_message("infra::http::save", status, message).attach(&mut response);
            response
        }
    }
}

/// `POST /rpc/v1/put-value`: the Associate stub. Records the key →
/// digest association without requiring the digest to be resident.
pub async fn put_value(
    State(state): State<AppState>,
    Json(request): Json<PutValueRequest>,
) -> Result<Json<PutValueResponse>, RpcError> {
    let id = CasId::from_bytes(&request.cas_id)
        .map_err(|err| RpcError::bad_request("infra::http::put_value", err.to_string()))?;

    state
        .dispatch
        .associate(CacheKey::from(request.key), id)
        .await
        .map_err(|err| RpcError::from_service("infra::http::put_value", err))?;

    Ok(Json(PutValueResponse::default()))
}

/// `POST /rpc/v1/load`: the direct-by-digest read stub.
pub async fn load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<LoadResponse>, RpcError> {
    let id = CasId::from_bytes(&request.cas_id)
        .map_err(|err| RpcError::bad_request("infra::http::load", err.to_string()))?;

    let artifact = state
        .dispatch
        .load(id)
        .await
        .map_err(|err| RpcError::from_service("infra::http::load", err))?;

    Ok(Json(match artifact {
        Some(artifact) => LoadResponse {
            found: true,
            data: Some(artifact.data().to_vec()),
            kind: Some(artifact.kind().as_str().to_string()),
            metadata: Some(artifact.metadata().clone()),
        },
        None => LoadResponse {
            found: false,
            data: None,
            kind: None,
            metadata: None,
        },
    }))
}

/// `GET /healthz`: liveness only; the in-memory engine has no
/// dependency worth probing.
pub async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /admin/v1/stats`.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.dispatch.service().stats();
    Json(StatsResponse {
        artifact_count: stats.content.artifact_count,
        artifact_bytes: stats.content.artifact_bytes,
        index_entries: stats.index_entries,
        lookup_hits: stats.lookup_hits,
        lookup_misses: stats.lookup_misses,
        dedup_hits: stats.dedup_hits,
        evictions: stats.content.evictions,
    })
}

/// `GET /admin/v1/artifacts/{cas_id}`: inspect a resident artifact by
/// its hex digest. Payload bytes are intentionally omitted.
pub async fn artifact_info(
    State(state): State<AppState>,
    Path(cas_id_hex): Path<String>,
) -> Result<Json<ArtifactInfo>, RpcError> {
    let id = CasId::from_hex(&cas_id_hex)
        .map_err(|err| RpcError::bad_request("infra::http::artifact_info", err.to_string()))?;

    let artifact = state
        .dispatch
        .service()
        .load(&id)
        .ok_or_else(|| RpcError::not_found("infra::http::artifact_info", "artifact not resident"))?;

    Ok(Json(ArtifactInfo {
        cas_id: id.to_hex(),
        kind: artifact.kind().as_str().to_string(),
        size_bytes: artifact.size_bytes(),
        metadata: artifact.metadata().clone(),
    }))
}
