use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{RuntimeState, StatusSnapshot, VisualizationFlags};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed control request: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    SelectCamera { index: u32 },
    SetPreviewEnabled { enabled: bool },
    SetLandmarkVisualization { pose: bool, hands: bool, face: bool },
    GetStatus,
    Start,
    Stop,
}

impl ControlRequest {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Status(StatusSnapshot),
    Operation(OperationResult),
}

/// Remote-control surface over the shared runtime state. Rejected operations are
/// reported through `OperationResult`, never as errors.
#[derive(Clone, Debug)]
pub struct ControlServicer {
    state: Arc<RuntimeState>,
}

impl ControlServicer {
    pub fn new(state: Arc<RuntimeState>) -> Self {
        Self { state }
    }

    pub fn select_camera(&self, index: u32) -> OperationResult {
        self.state.set_camera(index);
        OperationResult::ok()
    }

    pub fn set_preview_enabled(&self, enabled: bool) -> OperationResult {
        self.state.set_preview_enabled(enabled);
        OperationResult::ok()
    }

    pub fn set_landmark_visualization(&self, pose: bool, hands: bool, face: bool) -> OperationResult {
        self.state
            .set_visualization(VisualizationFlags { pose, hands, face });
        OperationResult::ok()
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.state.get_status()
    }

    pub fn start(&self) -> OperationResult {
        if self.state.request_start() {
            OperationResult::ok()
        } else {
            OperationResult::failed("Already running")
        }
    }

    pub fn stop(&self) -> OperationResult {
        if self.state.request_stop() {
            OperationResult::ok()
        } else {
            OperationResult::failed("Not running")
        }
    }

    pub fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::SelectCamera { index } => {
                ControlResponse::Operation(self.select_camera(index))
            }
            ControlRequest::SetPreviewEnabled { enabled } => {
                ControlResponse::Operation(self.set_preview_enabled(enabled))
            }
            ControlRequest::SetLandmarkVisualization { pose, hands, face } => {
                ControlResponse::Operation(self.set_landmark_visualization(pose, hands, face))
            }
            ControlRequest::GetStatus => ControlResponse::Status(self.get_status()),
            ControlRequest::Start => ControlResponse::Operation(self.start()),
            ControlRequest::Stop => ControlResponse::Operation(self.stop()),
        }
    }

    /// One request line in, one response line out.
    pub fn handle_line(&self, line: &str) -> String {
        let response = match ControlRequest::parse(line) {
            Ok(request) => self.handle(request),
            Err(err) => {
                log::warn!("{err}");
                ControlResponse::Operation(OperationResult::failed(err.to_string()))
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(r#"{{"success":false,"error_message":"failed to encode response: {err}"}}"#)
        })
    }
}
