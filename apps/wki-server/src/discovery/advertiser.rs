use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::{net, Registrar, CAPABILITIES, INSTANCE_PREFIX, SERVICE_TYPE};

/// Everything needed to publish this service on the LAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnnouncement {
    pub service_type: String,
    pub instance_name: String,
    pub host_name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub properties: Vec<(String, String)>,
}

impl ServiceAnnouncement {
    pub fn for_device(device: &str, ip: Ipv4Addr, port: u16) -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            instance_name: format!("{INSTANCE_PREFIX}-{device}"),
            host_name: format!("{}.local.", net::mdns_host_label(device)),
            ip,
            port,
            properties: vec![
                ("version".into(), env!("CARGO_PKG_VERSION").into()),
                ("device".into(), device.to_string()),
                ("capabilities".into(), CAPABILITIES.into()),
            ],
        }
    }
}

/// Publishes one [`ServiceAnnouncement`]. Failures are logged, never fatal.
pub struct SelfAdvertiser {
    registrar: Option<Arc<dyn Registrar>>,
    announcement: ServiceAnnouncement,
    registered: Mutex<Option<String>>,
}

impl SelfAdvertiser {
    pub fn new(registrar: Option<Arc<dyn Registrar>>, announcement: ServiceAnnouncement) -> Self {
        Self {
            registrar,
            announcement,
            registered: Mutex::new(None),
        }
    }

    pub fn is_published(&self) -> bool {
        self.registered.lock().is_some()
    }

    /// Register unless already registered. Returns whether we are published.
    pub fn publish(&self) -> bool {
        let Some(registrar) = &self.registrar else {
            return false;
        };
        let mut registered = self.registered.lock();
        if registered.is_some() {
            return true;
        }
        match registrar.register(&self.announcement) {
            Ok(fullname) => {
                info!(
                    target: "wki::discovery",
                    name = %fullname,
                    ip = %self.announcement.ip,
                    port = self.announcement.port,
                    "service announced"
                );
                *registered = Some(fullname);
                true
            }
            Err(err) => {
                warn!(target: "wki::discovery", %err, "service announcement failed");
                false
            }
        }
    }

    pub fn unpublish(&self) {
        let Some(fullname) = self.registered.lock().take() else {
            return;
        };
        let Some(registrar) = &self.registrar else {
            return;
        };
        match registrar.unregister(&fullname) {
            Ok(()) => info!(target: "wki::discovery", name = %fullname, "service withdrawn"),
            Err(err) => warn!(target: "wki::discovery", %err, "service withdrawal failed"),
        }
    }
}
