//! gRPC Service Implementation
//!
//! Every method extracts the bearer token from the `authorization` metadata
//! entry, obtains a grant from the control service and then delegates.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use super::proto::{
    DeleteRequest, Empty, HealthRequest, HealthResponse, ListRequest, ListResponse,
    ProxyRecord, ProxyRequest, reverse_server::Reverse,
};
use crate::control::{ControlService, DeleteRecordRequest, Operation, ProxyRecordRequest};
use crate::error::GatewayError;

/// Convert `GatewayError` to tonic Status
impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match err.root() {
            GatewayError::Auth { .. } => Self::unauthenticated(message),
            GatewayError::Validation { .. } => Self::invalid_argument(message),
            GatewayError::NotFound { .. } => Self::not_found(message),
            GatewayError::Ownership { .. } => Self::permission_denied(message),
            GatewayError::Transport { .. } => Self::unavailable(message),
            _ => Self::internal(message),
        }
    }
}

/// Read the `authorization` metadata entry
fn authorization<T>(request: &Request<T>) -> Option<&str> {
    request
        .metadata()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
}

impl From<ProxyRequest> for ProxyRecordRequest {
    fn from(request: ProxyRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            cert: request.cert,
            key: request.key,
        }
    }
}

/// `prx.Reverse` implementation
pub struct ReverseService {
    control: Arc<ControlService>,
}

impl ReverseService {
    /// 创建 gRPC 服务
    #[must_use]
    pub const fn new(control: Arc<ControlService>) -> Self {
        Self { control }
    }
}

#[tonic::async_trait]
impl Reverse for ReverseService {
    async fn add(&self, request: Request<ProxyRequest>) -> Result<Response<Empty>, Status> {
        let grant = self.control.authorize(Operation::Add, authorization(&request))?;
        self.control.add(&grant, request.into_inner().into()).await?;
        Ok(Response::new(Empty {}))
    }

    async fn update(&self, request: Request<ProxyRequest>) -> Result<Response<Empty>, Status> {
        let grant = self.control.authorize(Operation::Update, authorization(&request))?;
        self.control.update(&grant, request.into_inner().into()).await?;
        Ok(Response::new(Empty {}))
    }

    async fn delete(&self, request: Request<DeleteRequest>) -> Result<Response<Empty>, Status> {
        let grant = self.control.authorize(Operation::Delete, authorization(&request))?;
        let from = request.into_inner().from;
        self.control.delete(&grant, DeleteRecordRequest { from }).await?;
        Ok(Response::new(Empty {}))
    }

    async fn list(&self, request: Request<ListRequest>) -> Result<Response<ListResponse>, Status> {
        let grant = self.control.authorize(Operation::List, authorization(&request))?;
        let records = self
            .control
            .list(&grant)
            .await?
            .into_iter()
            .map(|entry| ProxyRecord {
                from: entry.from,
                to: entry.to,
            })
            .collect();
        Ok(Response::new(ListResponse { records }))
    }

    async fn health(
        &self,
        request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        let grant = self.control.authorize(Operation::Health, authorization(&request))?;
        let health = self.control.health(&grant)?;
        Ok(Response::new(HealthResponse {
            status: health.status,
            time: health.time,
            version: health.version,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::auth("x"), Code::Unauthenticated),
            (
                GatewayError::validation(vec![("to".to_string(), "to is required".to_string())]),
                Code::InvalidArgument,
            ),
            (GatewayError::not_found("a"), Code::NotFound),
            (GatewayError::ownership("ingress", "a"), Code::PermissionDenied),
            (GatewayError::transport("down"), Code::Unavailable),
            (GatewayError::internal("boom"), Code::Internal),
        ];

        for (error, code) in cases {
            assert_eq!(Status::from(error).code(), code);
        }
    }
}
