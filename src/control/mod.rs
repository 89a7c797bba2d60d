mod server;
mod servicer;
mod state;

pub use server::ControlServer;
pub use servicer::{ControlError, ControlRequest, ControlResponse, ControlServicer, OperationResult};
pub use state::{PendingRequests, RuntimeState, StatusSnapshot, VisualizationFlags};
