//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on a local TCP port.

use crate::handler::RpcHandler;
use crate::types::{AddScheduleRequest, GetScheduleRequest, SweepRequest};
use cadence_core::application::{ScheduleService, SweepRunner};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9537;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        schedules: Arc<ScheduleService>,
        sweeper: Arc<SweepRunner>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(schedules, sweeper)),
        }
    }

    /// Start the JSON-RPC server, returning the bound address and its handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        // Register methods
        let handler = self.handler.clone();
        module
            .register_async_method("schedule.add.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AddScheduleRequest = params.parse()?;
                    handler.add_schedule(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("schedule.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetScheduleRequest = params.parse()?;
                    handler.get_schedule(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("sweep.run.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // No params and `{}` are both accepted
                    let req: Option<SweepRequest> = params.parse()?;
                    handler.run_sweep(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}
