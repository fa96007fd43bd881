use crate::auth::{DecodeOutcome, TokenService};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};

pub mod proto {
    tonic::include_proto!("userauth");
}

use proto::user_auth_service_server::{UserAuthService, UserAuthServiceServer};
use proto::{DecodeRequest, DecodeResponse};

/// Token-decode hop for peer services: validation without the signing key
/// ever leaving this process.
#[derive(Clone)]
pub struct AuthService {
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

#[tonic::async_trait]
impl UserAuthService for AuthService {
    async fn decode_access_token(
        &self,
        request: Request<DecodeRequest>,
    ) -> Result<Response<DecodeResponse>, Status> {
        let token = request.into_inner().access_token;
        let outcome = self.tokens.decode_access_token(token.trim());
        let response = match &outcome {
            DecodeOutcome::Ok { user_id } => DecodeResponse {
                code: 0,
                user_id: user_id.clone(),
                error_message: String::new(),
            },
            other => DecodeResponse {
                code: other.code(),
                user_id: String::new(),
                error_message: other.error_message().to_string(),
            },
        };
        Ok(Response::new(response))
    }
}

pub async fn serve(
    addr: SocketAddr,
    tokens: Arc<TokenService>,
    cancel: CancellationToken,
) -> Result<()> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<UserAuthServiceServer<AuthService>>()
        .await;

    tracing::info!(%addr, "auth gRPC listening");
    Server::builder()
        .add_service(health_service)
        .add_service(UserAuthServiceServer::new(AuthService::new(tokens)))
        .serve_with_shutdown(addr, cancel.cancelled())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn decode_round_trips_over_the_service_boundary() {
        let state = test_support::test_state();
        let access_token = state
            .tokens
            .issue_access_token("3f2c1de0-aaaa-bbbb-cccc-0123456789ab")
            .unwrap();

        let service = AuthService::new(state.tokens.clone());
        let response = service
            .decode_access_token(Request::new(DecodeRequest { access_token }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.code, 0);
        assert_eq!(response.user_id, "3f2c1de0-aaaa-bbbb-cccc-0123456789ab");
        assert!(response.error_message.is_empty());
    }

    #[tokio::test]
    async fn malformed_token_reports_code_4() {
        let state = test_support::test_state();
        let service = AuthService::new(state.tokens.clone());
        let response = service
            .decode_access_token(Request::new(DecodeRequest {
                access_token: "definitely-not-a-jwt".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.code, 4);
        assert!(response.user_id.is_empty());
        assert!(!response.error_message.is_empty());
    }
}
