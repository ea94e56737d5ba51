//! `/api/containers` payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersReport {
    pub total: u32,
    pub running: u32,
    pub stopped: u32,
    pub unhealthy: u32,
    pub containers: Vec<ContainerInfo>,
}

impl ContainersReport {
    /// Looks a container up by name, or by (short) id.
    pub fn find(&self, name: &str) -> Option<&ContainerInfo> {
        self.containers
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.containers.iter().find(|c| !c.id.is_empty() && c.id == name))
    }

    /// `true` when the container is known and its state is `running`.
    pub fn is_running(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|c| c.state == ContainerState::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Human readable docker status, e.g. `Up 3 hours`.
    pub status: String,
    pub state: ContainerState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Exited,
    Created,
    Restarting,
    Paused,
    #[default]
    #[serde(other)]
    Other,
}
