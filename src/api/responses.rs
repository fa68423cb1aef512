//! API error envelope and response conventions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::bridge::BridgeError;
use crate::dispatch::DispatchError;
use crate::store::StoreError;
use crate::tenant::AccessError;
use crate::validation::FieldError;

/// JSON error envelope: `{"error": <code>, "details": ...?}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn tenant_required() -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "tenant_required")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden")
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found").with_details(json!({"resource": what.into()}))
    }

    pub fn no_samples() -> Self {
        Self::new(StatusCode::NOT_FOUND, "no_samples")
    }

    pub fn invalid_payload(errors: &[FieldError]) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_payload")
            .with_details(json!({ "errors": errors }))
    }

    pub fn component_module_required() -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "component_module_required")
    }

    pub fn forge_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "forge_unavailable")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            .with_details(json!({"message": message.into()}))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::TenantRequired => ApiError::tenant_required(),
            AccessError::TenantMismatch => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "tenant_mismatch")
            }
            AccessError::ForbiddenCrossTenantAccess => ApiError::new(
                StatusCode::FORBIDDEN,
                "forbidden_cross_tenant_access",
            ),
            AccessError::Forbidden => ApiError::forbidden(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::not_found(id),
            StoreError::TenantMismatch(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "tenant_mismatch")
            }
            StoreError::DuplicateLabel { .. } => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "duplicate_label")
            }
            StoreError::DuplicateName(name) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "duplicate_name")
                    .with_details(json!({ "name": name }))
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoSamples => ApiError::no_samples(),
            DispatchError::Forbidden(reason) => {
                ApiError::forbidden().with_details(json!({ "reason": reason }))
            }
            DispatchError::Expired => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "expired")
            }
            DispatchError::DuplicateLabel => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "duplicate_label")
            }
            DispatchError::NotFound(id) => ApiError::not_found(id),
            DispatchError::Validation(errors) => ApiError::invalid_payload(&errors),
            DispatchError::Access(err) => err.into(),
            DispatchError::Policy(err) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "policy_rejected")
                    .with_details(json!({"reason": err.to_string()}))
            }
            DispatchError::ForgeUnavailable => ApiError::forge_unavailable(),
            DispatchError::Store(err) => err.into(),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(id) => ApiError::not_found(id),
            // Breaker and transport failures read identically to callers.
            _ => ApiError::forge_unavailable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationCode;

    #[test]
    fn validation_errors_carry_the_full_list() {
        let errors = vec![
            FieldError {
                field: "category".into(),
                code: ValidationCode::InvalidOptions,
                message: "bad".into(),
            },
            FieldError {
                field: "score".into(),
                code: ValidationCode::OutOfRange,
                message: "too big".into(),
            },
        ];

        let err = ApiError::invalid_payload(&errors);
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let details = err.details.unwrap();
        assert_eq!(details["errors"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn dispatch_errors_map_to_the_contract_statuses() {
        assert_eq!(
            ApiError::from(DispatchError::NoSamples).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(DispatchError::Forbidden("x".into())).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(DispatchError::Expired).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(DispatchError::ForgeUnavailable).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
