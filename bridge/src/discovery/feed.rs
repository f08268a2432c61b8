//! Sources of discovery records

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::discovery::{DiscoveryRecord, CONTROLLER_TYPE};
use crate::errors::BridgeError;
use crate::storage::settings::StaticController;

/// Something that can be probed for advertised controllers
#[async_trait]
pub trait DiscoveryFeed: Send {
    async fn probe(&mut self) -> Result<Vec<DiscoveryRecord>, BridgeError>;
}

/// Feed announcing a fixed list of controllers from the settings file
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    records: Vec<DiscoveryRecord>,
}

impl StaticFeed {
    pub fn from_controllers(controllers: &[StaticController]) -> Self {
        let records = controllers
            .iter()
            .map(|controller| {
                let mut txt = BTreeMap::new();
                txt.insert("type".to_string(), CONTROLLER_TYPE.to_string());
                txt.insert("mac".to_string(), controller.mac.clone());
                DiscoveryRecord {
                    name: controller.name.clone(),
                    host: controller.host.clone(),
                    port: controller.port,
                    txt,
                }
            })
            .collect();
        Self { records }
    }
}

#[async_trait]
impl DiscoveryFeed for StaticFeed {
    async fn probe(&mut self) -> Result<Vec<DiscoveryRecord>, BridgeError> {
        Ok(self.records.clone())
    }
}
