use crate::netconfig::{self, Mode, NetError, NetworkSettings};
use crate::scan::ScanEngine;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};
use tonic::{Request, Response, Status};

pub mod ipcscan_proto {
    tonic::include_proto!("ipcscan");
}

pub mod iptool_proto {
    tonic::include_proto!("iptool");
}

use ipcscan_proto::ipc_scan_service_server::{IpcScanService, IpcScanServiceServer};
use ipcscan_proto::{ScanRequest, ScanResponse};
use iptool_proto::network_service_client::NetworkServiceClient;
use iptool_proto::network_service_server::{NetworkService, NetworkServiceServer};
use iptool_proto::{
    GetNetworkConfigRequest, NetworkConfig, NetworkMode, UpdateNetworkConfigResponse,
};

/// LAN-facing scan facade. Concurrency is serialised inside the engine; the
/// reply is the JSON array string, empty when nothing answered.
pub struct ScanService {
    engine: Arc<ScanEngine>,
}

impl ScanService {
    pub fn new(engine: Arc<ScanEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl IpcScanService for ScanService {
    async fn scan(
        &self,
        _request: Request<ScanRequest>,
    ) -> Result<Response<ScanResponse>, Status> {
        tracing::info!("gRPC scan requested");
        let result = self
            .engine
            .scan_json()
            .await
            .map_err(|err| Status::internal(err.to_string()))?;
        Ok(Response::new(ScanResponse { result }))
    }
}

fn status_from_net_error(err: NetError) -> Status {
    match err {
        NetError::NotFound(message) => Status::not_found(message),
        NetError::Unsupported(message) => Status::unimplemented(message),
        NetError::CommandFailed(message) => Status::internal(message),
    }
}

fn mode_from_proto(mode: i32) -> Mode {
    match NetworkMode::try_from(mode) {
        Ok(NetworkMode::Dhcp) => Mode::Dhcp,
        Ok(NetworkMode::Manual) => Mode::Manual,
        _ => Mode::Unspecified,
    }
}

fn mode_to_proto(mode: Mode) -> NetworkMode {
    match mode {
        Mode::Unspecified => NetworkMode::Unspecified,
        Mode::Dhcp => NetworkMode::Dhcp,
        Mode::Manual => NetworkMode::Manual,
    }
}

fn config_to_proto(settings: NetworkSettings) -> NetworkConfig {
    NetworkConfig {
        interface_name: settings.interface_name,
        ip_address: settings.ip_address,
        mac_address: settings.mac_address,
        subnet_mask: settings.subnet_mask,
        gateway: settings.gateway,
        dns: settings.dns,
        mode: mode_to_proto(settings.mode) as i32,
    }
}

/// IPtool facade: interface queries and mutations for peers on the LAN.
#[derive(Default)]
pub struct NetworkConfigService;

#[tonic::async_trait]
impl NetworkService for NetworkConfigService {
    async fn get_network_config(
        &self,
        request: Request<GetNetworkConfigRequest>,
    ) -> Result<Response<NetworkConfig>, Status> {
        let interface_name = request.into_inner().interface_name;
        let settings = netconfig::get_config(&interface_name)
            .await
            .map_err(status_from_net_error)?;
        Ok(Response::new(config_to_proto(settings)))
    }

    async fn update_network_config(
        &self,
        request: Request<NetworkConfig>,
    ) -> Result<Response<UpdateNetworkConfigResponse>, Status> {
        let config = request.into_inner();
        let settings = NetworkSettings {
            interface_name: config.interface_name,
            ip_address: config.ip_address,
            mac_address: config.mac_address,
            subnet_mask: config.subnet_mask,
            gateway: config.gateway,
            dns: config.dns,
            mode: mode_from_proto(config.mode),
        };
        netconfig::update_config(&settings)
            .await
            .map_err(status_from_net_error)?;
        Ok(Response::new(UpdateNetworkConfigResponse {
            success: true,
            message: "applied".to_string(),
        }))
    }
}

/// Serves the scan facade on its fixed port. Credentials are plaintext; the
/// LAN boundary is the isolation.
pub async fn serve_scan(
    port: u16,
    engine: Arc<ScanEngine>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<IpcScanServiceServer<ScanService>>()
        .await;

    tracing::info!(%addr, "IPCScan gRPC listening");
    Server::builder()
        .add_service(health_service)
        .add_service(IpcScanServiceServer::new(ScanService::new(engine)))
        .serve_with_shutdown(addr, cancel.cancelled())
        .await
        .context("IPCScan gRPC server failed")
}

pub async fn serve_iptool(port: u16, cancel: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<NetworkServiceServer<NetworkConfigService>>()
        .await;

    tracing::info!(%addr, "IPtool gRPC listening");
    Server::builder()
        .add_service(health_service)
        .add_service(NetworkServiceServer::new(NetworkConfigService))
        .serve_with_shutdown(addr, cancel.cancelled())
        .await
        .context("IPtool gRPC server failed")
}

/// Client side of the IPtool facade, used by the command plane (code 102)
/// and the heartbeat IP refresh.
#[derive(Clone)]
pub struct IptoolClient {
    target: String,
}

impl IptoolClient {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
        }
    }

    async fn connect(&self) -> Result<NetworkServiceClient<Channel>> {
        NetworkServiceClient::connect(format!("http://{}", self.target))
            .await
            .with_context(|| format!("connect to IPtool at {}", self.target))
    }

    pub async fn get_network_config(&self, interface_name: &str) -> Result<NetworkConfig> {
        let mut client = self.connect().await?;
        let response = client
            .get_network_config(GetNetworkConfigRequest {
                interface_name: interface_name.to_string(),
            })
            .await
            .context("GetNetworkConfig")?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_errors_map_to_grpc_codes() {
        assert_eq!(
            status_from_net_error(NetError::NotFound("x".into())).code(),
            tonic::Code::NotFound
        );
        assert_eq!(
            status_from_net_error(NetError::Unsupported("x".into())).code(),
            tonic::Code::Unimplemented
        );
        assert_eq!(
            status_from_net_error(NetError::CommandFailed("x".into())).code(),
            tonic::Code::Internal
        );
    }

    #[test]
    fn mode_mapping_round_trips() {
        for mode in [Mode::Unspecified, Mode::Dhcp, Mode::Manual] {
            assert_eq!(mode_from_proto(mode_to_proto(mode) as i32), mode);
        }
        assert_eq!(mode_from_proto(99), Mode::Unspecified);
    }
}
