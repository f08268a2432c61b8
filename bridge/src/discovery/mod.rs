//! Controller discovery
//!
//! Records come from a [`DiscoveryFeed`]; records advertising the
//! irrigation-controller type are resolved to an address and handed to the
//! engine as [`Sighting`]s.

pub mod feed;
pub mod resolver;

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use crate::errors::BridgeError;
use crate::models::identity::serial_from_mac;
use crate::models::DeviceId;

pub use feed::{DiscoveryFeed, StaticFeed};
pub use resolver::{Resolver, SystemResolver};

/// TXT `type` value advertised by irrigation controllers
pub const CONTROLLER_TYPE: &str = "irrigation-controller";

/// An advertised service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub txt: BTreeMap<String, String>,
}

impl DiscoveryRecord {
    pub fn record_type(&self) -> Option<&str> {
        self.txt.get("type").map(String::as_str)
    }

    pub fn mac(&self) -> Option<&str> {
        self.txt.get("mac").map(String::as_str)
    }

    pub fn is_irrigation_controller(&self) -> bool {
        self.record_type() == Some(CONTROLLER_TYPE)
    }
}

/// A resolved controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub id: DeviceId,
    pub name: String,
    pub serial: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl Sighting {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// Resolve a discovery record into a sighting
pub async fn resolve_record(
    record: &DiscoveryRecord,
    resolver: &dyn Resolver,
) -> Result<Sighting, BridgeError> {
    let mac = record
        .mac()
        .filter(|mac| !mac.trim().is_empty())
        .ok_or_else(|| {
            BridgeError::DiscoveryError(format!("{} does not advertise a mac", record.name))
        })?;
    let ip = resolver.resolve(&record.host).await?;

    Ok(Sighting {
        id: DeviceId::from_hardware_token(mac),
        name: record.name.clone(),
        serial: serial_from_mac(mac),
        ip,
        port: record.port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, mac: Option<&str>) -> DiscoveryRecord {
        let mut txt = BTreeMap::new();
        txt.insert("type".to_string(), kind.to_string());
        if let Some(mac) = mac {
            txt.insert("mac".to_string(), mac.to_string());
        }
        DiscoveryRecord {
            name: "back-yard".to_string(),
            host: "192.168.1.50".to_string(),
            port: 81,
            txt,
        }
    }

    #[test]
    fn test_only_controller_records_match() {
        assert!(record(CONTROLLER_TYPE, None).is_irrigation_controller());
        assert!(!record("garage-door", None).is_irrigation_controller());
    }

    #[tokio::test]
    async fn test_resolve_record() {
        let sighting = resolve_record(&record(CONTROLLER_TYPE, Some("AA:BB:CC:DD:EE:FF")), &SystemResolver)
            .await
            .unwrap();
        assert_eq!(sighting.id, DeviceId::from_hardware_token("aa:bb:cc:dd:ee:ff"));
        assert_eq!(sighting.address(), "192.168.1.50:81".parse().unwrap());
    }

    #[tokio::test]
    async fn test_record_without_mac_is_rejected() {
        let result = resolve_record(&record(CONTROLLER_TYPE, None), &SystemResolver).await;
        assert!(matches!(result, Err(BridgeError::DiscoveryError(_))));
    }
}
