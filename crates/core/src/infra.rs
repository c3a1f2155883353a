//! Infrastructure handle
//!
//! A ready container host as supplied by the provisioning layer: which runtime
//! to talk to and which named volume backs the gitspace's working directory.

use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};

/// A provisioned container host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infrastructure {
    /// Identifier of the provisioned resource
    pub identifier: String,
    /// Named volume mounted at the repository working directory
    pub storage: String,
    /// Runtime flavour on the host
    #[serde(default)]
    pub runtime: RuntimeKind,
    /// Explicit runtime binary, overriding the runtime default
    #[serde(default)]
    pub runtime_path: Option<String>,
}

impl Infrastructure {
    /// Docker host with the given storage volume
    pub fn new(identifier: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            storage: storage.into(),
            runtime: RuntimeKind::Docker,
            runtime_path: None,
        }
    }
}
