use std::path::PathBuf;

use serde::Deserialize;

use crate::memory::MemoryGateway;
use crate::roster::RosterController;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub gateway: Option<MemoryGateway>,
    pub roster: RosterController,
}

impl AppState {
    pub fn new() -> AppState {
        AppState {
            workspace: None,
            gateway: None,
            roster: RosterController::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}
