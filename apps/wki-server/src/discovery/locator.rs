use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Announcement, Browser, BACKEND_SERVICE_TYPE};

/// Add `http://` when no scheme is given and strip trailing slashes.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let normalized = with_scheme.trim_end_matches('/');
    if normalized.ends_with("://") {
        return None;
    }
    Some(normalized.to_string())
}

/// Holds the scheduling backend's base URL.
///
/// A configured URL is fixed for the life of the process. Otherwise the
/// first usable announcement seen while browsing is latched and kept.
pub struct BackendLocator {
    url: RwLock<Option<String>>,
    fixed: bool,
    discovery_enabled: bool,
    browser: Option<Arc<dyn Browser>>,
    browse_task: Mutex<Option<JoinHandle<()>>>,
    latched: Notify,
}

impl std::fmt::Debug for BackendLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLocator")
            .field("url", &*self.url.read())
            .field("fixed", &self.fixed)
            .field("discovery_enabled", &self.discovery_enabled)
            .finish_non_exhaustive()
    }
}

impl BackendLocator {
    pub fn new(
        configured: Option<&str>,
        discovery_enabled: bool,
        browser: Option<Arc<dyn Browser>>,
    ) -> Self {
        let url = configured.and_then(normalize_url);
        Self {
            fixed: url.is_some(),
            url: RwLock::new(url),
            discovery_enabled,
            browser,
            browse_task: Mutex::new(None),
            latched: Notify::new(),
        }
    }

    pub fn resolve(&self) -> Option<String> {
        self.url.read().clone()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn discovery_enabled(&self) -> bool {
        self.discovery_enabled
    }

    pub fn is_browsing(&self) -> bool {
        self.browse_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Latch `url` if no backend is known yet. Returns whether it was taken.
    pub fn offer(&self, url: &str) -> bool {
        let Some(url) = normalize_url(url) else {
            return false;
        };
        {
            let mut slot = self.url.write();
            if slot.is_some() {
                return false;
            }
            *slot = Some(url.clone());
        }
        info!(target: "wki::discovery", %url, "backend resolved");
        self.latched.notify_one();
        true
    }

    pub fn offer_announcement(&self, announcement: &Announcement) -> bool {
        let Some(ip) = announcement.first_ipv4() else {
            debug!(
                target: "wki::discovery",
                instance = %announcement.instance,
                "announcement without IPv4 address ignored"
            );
            return false;
        };
        self.offer(&format!("http://{ip}:{}", announcement.port))
    }

    /// Resolves once a backend URL has been latched.
    pub async fn latched(&self) {
        loop {
            let notified = self.latched.notified();
            if self.url.read().is_some() {
                return;
            }
            notified.await;
        }
    }

    /// Start browsing for the backend unless discovery is off, a URL is
    /// already known, or a browse is running. Returns whether one started.
    pub fn ensure_discovery(self: &Arc<Self>) -> bool {
        if !self.discovery_enabled || self.url.read().is_some() {
            return false;
        }
        let Some(browser) = self.browser.clone() else {
            return false;
        };
        let mut task = self.browse_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        let mut announcements = match browser.browse(BACKEND_SERVICE_TYPE) {
            Ok(rx) => rx,
            Err(err) => {
                warn!(target: "wki::discovery", %err, "backend discovery failed to start");
                return false;
            }
        };
        info!(target: "wki::discovery", service = BACKEND_SERVICE_TYPE, "searching for backend");

        let locator = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            while let Some(announcement) = announcements.recv().await {
                let Some(locator) = locator.upgrade() else {
                    break;
                };
                if locator.offer_announcement(&announcement) || locator.resolve().is_some() {
                    break;
                }
            }
            browser.stop_browse(BACKEND_SERVICE_TYPE);
        }));
        true
    }

    pub fn stop(&self) {
        if let Some(task) = self.browse_task.lock().take() {
            task.abort();
            if let Some(browser) = &self.browser {
                browser.stop_browse(BACKEND_SERVICE_TYPE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::FakeBrowser;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    fn announcement(addresses: Vec<IpAddr>, port: u16) -> Announcement {
        Announcement {
            instance: "Werkstatt-Backend".into(),
            addresses,
            port,
        }
    }

    #[test]
    fn urls_are_normalized() {
        assert_eq!(normalize_url("10.0.0.5:3001/").as_deref(), Some("http://10.0.0.5:3001"));
        assert_eq!(
            normalize_url(" https://werkstatt.local// ").as_deref(),
            Some("https://werkstatt.local")
        );
        assert_eq!(normalize_url("   "), None);
        assert_eq!(normalize_url("http://"), None);
    }

    #[test]
    fn configured_url_is_fixed() {
        let locator = BackendLocator::new(Some("backend:3001/"), true, None);
        assert!(locator.is_fixed());
        assert_eq!(locator.resolve().as_deref(), Some("http://backend:3001"));
        assert!(!locator.offer("http://other:3001"));
        assert_eq!(locator.resolve().as_deref(), Some("http://backend:3001"));
    }

    #[test]
    fn first_offer_wins() {
        let locator = BackendLocator::new(None, true, None);
        assert!(locator.offer("http://first:3001"));
        assert!(!locator.offer("http://second:3001"));
        assert_eq!(locator.resolve().as_deref(), Some("http://first:3001"));
        assert!(!locator.is_fixed());
    }

    #[test]
    fn ipv6_only_announcement_is_ignored() {
        let locator = BackendLocator::new(None, true, None);
        let v6 = announcement(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)], 3001);
        assert!(!locator.offer_announcement(&v6));
        let mixed = announcement(
            vec![
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            ],
            3001,
        );
        assert!(locator.offer_announcement(&mixed));
        assert_eq!(locator.resolve().as_deref(), Some("http://192.168.1.20:3001"));
    }

    #[tokio::test]
    async fn discovery_latches_first_backend() {
        let browser = Arc::new(FakeBrowser::default());
        let locator = Arc::new(BackendLocator::new(None, true, Some(browser.clone())));

        assert!(locator.ensure_discovery());
        assert!(!locator.ensure_discovery(), "browse already active");
        assert_eq!(*browser.browses.lock(), 1);

        let tx = browser.sender();
        tx.send(announcement(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))], 3001))
            .await
            .expect("send");
        tokio::time::timeout(Duration::from_secs(2), locator.latched())
            .await
            .expect("latched");
        assert_eq!(locator.resolve().as_deref(), Some("http://10.0.0.7:3001"));

        // consumer exits after latching and stops the browse
        tokio::time::timeout(Duration::from_secs(2), async {
            while locator.is_browsing() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("browse finished");
        assert_eq!(*browser.stops.lock(), 1);
        assert!(!locator.ensure_discovery(), "url already known");
    }

    #[tokio::test]
    async fn discovery_respects_switches() {
        let browser = Arc::new(FakeBrowser::default());
        let disabled = Arc::new(BackendLocator::new(None, false, Some(browser.clone())));
        assert!(!disabled.ensure_discovery());

        let fixed = Arc::new(BackendLocator::new(
            Some("http://backend:3001"),
            true,
            Some(browser.clone()),
        ));
        assert!(!fixed.ensure_discovery());
        assert_eq!(*browser.browses.lock(), 0);
    }

    #[tokio::test]
    async fn stop_cancels_browse() {
        let browser = Arc::new(FakeBrowser::default());
        let locator = Arc::new(BackendLocator::new(None, true, Some(browser.clone())));
        assert!(locator.ensure_discovery());
        locator.stop();
        assert!(!locator.is_browsing());
        assert_eq!(*browser.stops.lock(), 1);
        assert!(locator.resolve().is_none());
    }
}
