use crate::model::{FallModel, FEATURE_COUNT};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};

pub mod proto {
    tonic::include_proto!("fallinference");
}

use proto::fall_inference_service_server::{FallInferenceService, FallInferenceServiceServer};
use proto::{FallInferenceRequest, FallInferenceResponse};

pub struct InferenceService {
    // Backends may hold non-reentrant native state; calls are serialised.
    model: Arc<Mutex<Box<dyn FallModel>>>,
}

impl InferenceService {
    pub fn new(model: Box<dyn FallModel>) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[tonic::async_trait]
impl FallInferenceService for InferenceService {
    async fn infer_fall_probability(
        &self,
        request: Request<FallInferenceRequest>,
    ) -> Result<Response<FallInferenceResponse>, Status> {
        let payload = request.into_inner();
        if payload.features.len() != FEATURE_COUNT {
            return Err(Status::invalid_argument(format!(
                "expected exactly {FEATURE_COUNT} features, got {}",
                payload.features.len()
            )));
        }

        let mut features = [0f32; FEATURE_COUNT];
        features.copy_from_slice(&payload.features);

        let probability = {
            let model = self.model.lock().await;
            model
                .infer_one(&features)
                .map_err(|err| Status::internal(format!("model inference failed: {err}")))?
        };

        let rounded = round3(probability as f64);
        tracing::info!(
            probability_raw = probability as f64,
            probability = rounded,
            "inference served"
        );
        Ok(Response::new(FallInferenceResponse {
            probability: rounded,
        }))
    }
}

pub async fn serve(
    addr: SocketAddr,
    service: InferenceService,
    cancel: CancellationToken,
) -> Result<()> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<FallInferenceServiceServer<InferenceService>>()
        .await;

    tracing::info!(%addr, "fall-inference gRPC listening");
    Server::builder()
        .add_service(health_service)
        .add_service(FallInferenceServiceServer::new(service))
        .serve_with_shutdown(addr, cancel.cancelled())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel(f32);

    impl FallModel for FixedModel {
        fn infer_one(&self, _features: &[f32; FEATURE_COUNT]) -> anyhow::Result<f32> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn nine_features_are_required() {
        let service = InferenceService::new(Box::new(FixedModel(12.5)));
        let status = service
            .infer_fall_probability(Request::new(FallInferenceRequest {
                features: vec![1.0; 8],
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn probability_is_rounded_to_three_decimals() {
        let service = InferenceService::new(Box::new(FixedModel(12.345_678)));
        let response = service
            .infer_fall_probability(Request::new(FallInferenceRequest {
                features: vec![0.0; 9],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!((response.probability - 12.346).abs() < 1e-9);
    }

    #[test]
    fn round3_keeps_three_decimals() {
        assert_eq!(round3(12.3456), 12.346);
        assert_eq!(round3(99.9994), 99.999);
        assert_eq!(round3(100.0), 100.0);
        assert_eq!(round3(0.0), 0.0);
    }
}
