//! Two-way LAN discovery: find the scheduling backend, announce ourselves.
//!
//! The mDNS transport sits behind [`Browser`] and [`Registrar`] so the
//! locator and advertiser can be driven by in-process fakes.

mod advertiser;
mod locator;
mod mdns;
pub mod net;

use std::net::{IpAddr, Ipv4Addr};

use tokio::sync::mpsc;

pub use advertiser::{SelfAdvertiser, ServiceAnnouncement};
pub use locator::{normalize_url, BackendLocator};
pub use mdns::MdnsDiscovery;

/// Service type this process announces.
pub const SERVICE_TYPE: &str = "_werkstatt-ki._tcp.local.";
/// Service type the scheduling backend announces.
pub const BACKEND_SERVICE_TYPE: &str = "_werkstatt-backend._tcp.local.";
pub const CAPABILITIES: &str = "estimate-zeit,suggest-arbeiten,teile-bedarf";
pub const INSTANCE_PREFIX: &str = "Werkstatt-KI";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mdns: {0}")]
    Mdns(#[from] mdns_sd::Error),
    #[error("discovery worker: {0}")]
    Io(#[from] std::io::Error),
}

/// A resolved peer seen while browsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub instance: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
}

impl Announcement {
    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

pub trait Browser: Send + Sync {
    /// Start browsing `service_type`; resolved peers arrive on the receiver
    /// until [`Browser::stop_browse`] is called or the transport shuts down.
    fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<Announcement>, DiscoveryError>;

    fn stop_browse(&self, service_type: &str);
}

pub trait Registrar: Send + Sync {
    /// Publish `service`; returns the full instance name used to unregister.
    fn register(&self, service: &ServiceAnnouncement) -> Result<String, DiscoveryError>;

    fn unregister(&self, fullname: &str) -> Result<(), DiscoveryError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// In-process browser: tests push announcements through `sender()`.
    #[derive(Default)]
    pub(crate) struct FakeBrowser {
        pub sender: Mutex<Option<mpsc::Sender<Announcement>>>,
        pub browses: Mutex<usize>,
        pub stops: Mutex<usize>,
    }

    impl FakeBrowser {
        pub fn sender(&self) -> mpsc::Sender<Announcement> {
            self.sender.lock().clone().expect("browse started")
        }
    }

    impl Browser for FakeBrowser {
        fn browse(
            &self,
            _service_type: &str,
        ) -> Result<mpsc::Receiver<Announcement>, DiscoveryError> {
            let (tx, rx) = mpsc::channel(8);
            *self.sender.lock() = Some(tx);
            *self.browses.lock() += 1;
            Ok(rx)
        }

        fn stop_browse(&self, _service_type: &str) {
            *self.stops.lock() += 1;
        }
    }
}
