use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::MlError;

/// Error returned by the HTTP handlers.
///
/// The body is the serialised [`MlError`] itself (`{"kind", "message"}`), so
/// a peer forwarding a request can hand the exact error back to its caller.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub MlError);

pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_of(err: &MlError) -> StatusCode {
    match err {
        MlError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        MlError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        MlError::NotFound(_) => StatusCode::NOT_FOUND,
        MlError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
        MlError::DispatchFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        MlError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
        MlError::EngineFailure(_) | MlError::Storage(_) | MlError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
        }
        (status, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_of(&MlError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(&MlError::ResourceExhausted("x".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(&MlError::TransportFailure("x".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn body_carries_the_error() {
        let resp = ApiError(MlError::PermissionDenied("nope".into())).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let bytes = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .unwrap()
            .to_bytes();
        let err: MlError = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err, MlError::PermissionDenied("nope".into()));
    }
}
