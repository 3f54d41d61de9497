//! Lifecycle tools: hosting-runtime events and update handling.

use offgrid_client::{HostCoordinator, Interceptor, RegistrationEvent};
use offgrid_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::json_result;

/// Registration lifecycle stage reported by the hosting runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Installing,
    Installed,
    Activating,
    Activated,
    Error,
}

/// Parameters for the lifecycle tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LifecycleParams {
    pub event: LifecycleEventKind,

    /// Interceptor version the event is about. Required except for `error`.
    #[serde(default)]
    pub version: Option<String>,

    /// Failure description for `error` events.
    #[serde(default)]
    pub message: Option<String>,
}

impl TryFrom<LifecycleParams> for RegistrationEvent {
    type Error = Error;

    fn try_from(params: LifecycleParams) -> Result<Self, Error> {
        let version = || {
            params
                .version
                .clone()
                .ok_or_else(|| Error::InvalidInput(format!("{:?} event needs a version", params.event)))
        };
        Ok(match params.event {
            LifecycleEventKind::Installing => RegistrationEvent::Installing { version: version()? },
            LifecycleEventKind::Installed => RegistrationEvent::Installed { version: version()? },
            LifecycleEventKind::Activating => RegistrationEvent::Activating { version: version()? },
            LifecycleEventKind::Activated => RegistrationEvent::Activated { version: version()? },
            LifecycleEventKind::Error => RegistrationEvent::Error {
                version: params.version.clone(),
                message: params.message.clone().unwrap_or_default(),
            },
        })
    }
}

/// Parameters for the decline_update tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeclineUpdateParams {
    /// Version the user declined; it is not offered again.
    pub version: String,
}

/// Feed one lifecycle event to the controller and report the resulting state.
pub async fn lifecycle_impl(interceptor: &Interceptor, params: LifecycleParams) -> Result<CallToolResult, McpError> {
    let event = RegistrationEvent::try_from(params)?;
    let lifecycle = interceptor.lifecycle();
    lifecycle.handle_event(event);
    json_result(&json!({ "state": lifecycle.current_state() }))
}

pub async fn activate_waiting_impl(interceptor: &Interceptor) -> Result<CallToolResult, McpError> {
    let activated = interceptor.lifecycle().activate_waiting().await?;
    json_result(&json!({ "activated": activated }))
}

/// The user accepted the update prompt.
pub async fn accept_update_impl(coordinator: &HostCoordinator) -> Result<CallToolResult, McpError> {
    let activated = coordinator.accept_update().await?;
    json_result(&json!({ "activated": activated }))
}

pub async fn decline_update_impl(
    coordinator: &HostCoordinator, params: DeclineUpdateParams,
) -> Result<CallToolResult, McpError> {
    coordinator.decline_update(&params.version).await?;
    json_result(&json!({ "declined": params.version }))
}
