use serde::{Deserialize, Serialize};

/// The partition of robots one auctioneer owns: a warehouse, a resource
/// type and a resource group. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Scope {
    pub warehouse: String,
    pub resource_type: String,
    pub resource_group: String,
}

impl Scope {
    pub fn new(
        warehouse: impl Into<String>,
        resource_type: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            warehouse: warehouse.into(),
            resource_type: resource_type.into(),
            resource_group: resource_group.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.warehouse, self.resource_type, self.resource_group
        )
    }
}
