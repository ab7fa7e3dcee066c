use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::debug;

use super::AppState;
use crate::blob_store::ObjectRef;
use crate::error::ServerError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/storage/v1/object/public/:bucket/*path", get(public_object))
        .route("/storage/v1/object/sign/:bucket/*path", get(signed_object))
}

#[derive(Deserialize)]
struct SignedParams {
    expires: Option<i64>,
    sig: Option<String>,
}

fn content_type(path: &str) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

fn object_ref(bucket: &str, path: &str) -> Result<ObjectRef, ServerError> {
    ObjectRef::new(bucket, path).ok_or_else(|| ServerError::NotFound("Object not found".into()))
}

/// Only the preview bucket is world-readable.
async fn public_object(
    State(state): State<AppState>,
    segments: Result<Path<(String, String)>, PathRejection>,
) -> Result<Response, ServerError> {
    let Path((bucket, path)) = segments?;
    let object = object_ref(&bucket, &path)?;
    if !object.is_public() {
        return Err(ServerError::Forbidden("Bucket is private".into()));
    }
    let data = state.blob_store.read_object(&object).await?;
    Ok(([(header::CONTENT_TYPE, content_type(object.path()))], data).into_response())
}

async fn signed_object(
    State(state): State<AppState>,
    segments: Result<Path<(String, String)>, PathRejection>,
    Query(params): Query<SignedParams>,
) -> Result<Response, ServerError> {
    let Path((bucket, path)) = segments?;
    let object = object_ref(&bucket, &path)?;
    let valid = match (params.expires, params.sig.as_deref()) {
        (Some(expires), Some(sig)) => state.blob_store.verify(&object, expires, sig),
        _ => false,
    };
    if !valid {
        debug!(bucket = %bucket, object = %path, "Rejected signed link");
        return Err(ServerError::Forbidden("Invalid or expired signature".into()));
    }

    let data = state.blob_store.read_object(&object).await?;
    let disposition = format!("attachment; filename=\"{}\"", object.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, content_type(object.path())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}
