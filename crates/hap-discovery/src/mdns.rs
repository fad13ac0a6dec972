//! `mdns-sd` backed advertiser.

use crate::traits::Advertiser;
use crate::{Advertisement, HAP_SERVICE_TYPE};
use async_trait::async_trait;
use hap_core::{Error, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Advertises `_hap._tcp` through an in-process mDNS responder.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    addresses: Vec<IpAddr>,
    registered: Mutex<Option<String>>,
}

impl MdnsAdvertiser {
    /// Start the responder.
    ///
    /// With no `addresses` every interface address is announced.
    pub fn new(addresses: Vec<IpAddr>) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Discovery(format!("Failed to create mDNS daemon: {}", e)))?;
        Ok(Self {
            daemon,
            addresses,
            registered: Mutex::new(None),
        })
    }

    fn service_info(&self, advertisement: &Advertisement) -> Result<ServiceInfo> {
        let properties: HashMap<String, String> = advertisement
            .txt
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let info = ServiceInfo::new(
            HAP_SERVICE_TYPE,
            &advertisement.name,
            &advertisement.host_name(),
            self.addresses.as_slice(),
            advertisement.port,
            properties,
        )
        .map_err(|e| Error::Discovery(format!("Invalid service info: {}", e)))?;
        Ok(if self.addresses.is_empty() {
            info.enable_addr_auto()
        } else {
            info
        })
    }
}

#[async_trait]
impl Advertiser for MdnsAdvertiser {
    async fn advertise(&self, advertisement: &Advertisement) -> Result<()> {
        let info = self.service_info(advertisement)?;
        let fullname = info.get_fullname().to_string();

        self.daemon
            .register(info)
            .map_err(|e| Error::Discovery(format!("Failed to register service: {}", e)))?;

        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        if registered.as_deref() == Some(fullname.as_str()) {
            debug!(
                name = %advertisement.name,
                sf = advertisement.get("sf").unwrap_or(""),
                config = advertisement.get("c#").unwrap_or(""),
                "Updated advertisement"
            );
        } else {
            info!(
                name = %advertisement.name,
                port = advertisement.port,
                "Advertising {}",
                HAP_SERVICE_TYPE
            );
        }
        *registered = Some(fullname);
        Ok(())
    }

    async fn withdraw(&self) -> Result<()> {
        let fullname = self
            .registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(fullname) = fullname {
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!("Failed to unregister {}: {}", fullname, e);
            }
        }
        Ok(())
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon shutdown: {}", e);
        }
    }
}
