use std::collections::HashMap;
use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Announcement, Browser, DiscoveryError, Registrar, ServiceAnnouncement};

/// [`Browser`] and [`Registrar`] backed by one multicast DNS daemon.
#[derive(Clone)]
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
}

impl MdnsDiscovery {
    pub fn new() -> Result<Self, DiscoveryError> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
        })
    }

    pub fn shutdown(&self) {
        if let Err(err) = self.daemon.shutdown() {
            debug!(target: "wki::discovery", %err, "mdns daemon shutdown");
        }
    }
}

impl Browser for MdnsDiscovery {
    fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<Announcement>, DiscoveryError> {
        let events = self.daemon.browse(service_type)?;
        let (tx, rx) = mpsc::channel(16);
        // the daemon hands out a blocking channel; pump it on its own thread
        std::thread::Builder::new()
            .name("wki-mdns-browse".into())
            .spawn(move || {
                while let Ok(event) = events.recv() {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            let announcement = Announcement {
                                instance: info.get_fullname().to_string(),
                                addresses: info.get_addresses().iter().copied().collect(),
                                port: info.get_port(),
                            };
                            if tx.blocking_send(announcement).is_err() {
                                break;
                            }
                        }
                        ServiceEvent::SearchStopped(_) => break,
                        _ => {}
                    }
                }
            })?;
        Ok(rx)
    }

    fn stop_browse(&self, service_type: &str) {
        if let Err(err) = self.daemon.stop_browse(service_type) {
            debug!(target: "wki::discovery", %err, "stop browse");
        }
    }
}

impl Registrar for MdnsDiscovery {
    fn register(&self, service: &ServiceAnnouncement) -> Result<String, DiscoveryError> {
        let properties: HashMap<String, String> = service.properties.iter().cloned().collect();
        let info = ServiceInfo::new(
            &service.service_type,
            &service.instance_name,
            &service.host_name,
            IpAddr::V4(service.ip),
            service.port,
            properties,
        )?;
        let fullname = info.get_fullname().to_string();
        self.daemon.register(info)?;
        Ok(fullname)
    }

    fn unregister(&self, fullname: &str) -> Result<(), DiscoveryError> {
        let status = self.daemon.unregister(fullname)?;
        if status
            .recv_timeout(std::time::Duration::from_secs(1))
            .is_err()
        {
            warn!(target: "wki::discovery", name = %fullname, "no unregister confirmation");
        }
        Ok(())
    }
}
