//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::types::{
    AddScheduleRequest, AddScheduleResponse, GetScheduleRequest, SweepRequest, SweepResponse,
    TaskView,
};
use cadence_core::application::{schedule, ScheduleService, SweepRunner};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    schedules: Arc<ScheduleService>,
    sweeper: Arc<SweepRunner>,
}

impl RpcHandler {
    pub fn new(schedules: Arc<ScheduleService>, sweeper: Arc<SweepRunner>) -> Self {
        Self {
            schedules,
            sweeper,
        }
    }

    /// schedule.add.v1
    pub async fn add_schedule(
        &self,
        params: AddScheduleRequest,
    ) -> Result<AddScheduleResponse, ErrorObjectOwned> {
        let req = schedule::AddScheduleRequest {
            application_id: params.application_id,
            reply_address: params.reply_address,
            start_time: params.start_time,
            is_recurring: params.is_recurring,
            cron_expression: params.cron_expression,
            utc_offset_minutes: params.utc_offset_minutes,
            extra_values: params.extra_values,
        };

        let task = self.schedules.add(req).await.map_err(to_rpc_error)?;

        Ok(AddScheduleResponse {
            task_id: task.id,
            next_trigger_time: task.next_trigger_time,
            is_recurring: task.is_recurring,
        })
    }

    /// schedule.get.v1
    pub async fn get_schedule(
        &self,
        params: GetScheduleRequest,
    ) -> Result<TaskView, ErrorObjectOwned> {
        let task = self
            .schedules
            .get(&params.task_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(TaskView::from(task))
    }

    /// sweep.run.v1
    pub async fn run_sweep(&self, _params: SweepRequest) -> Result<SweepResponse, ErrorObjectOwned> {
        info!("Manual sweep requested");
        let report = self.sweeper.sweep_now().await.map_err(to_rpc_error)?;
        Ok(SweepResponse::from(report))
    }
}
