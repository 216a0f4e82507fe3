//! mDNS service advertisement
//!
//! Advertises the Wyoming TCP surface using mDNS (multicast DNS) so that
//! local clients can discover the gateway automatically
//!
//! Service type: `_wyoming._tcp.local.`
//! Instance name: `{program}-{short_hostname}`
//!
//! TXT records:
//! - `version`: Gateway version

use std::collections::HashMap;
use std::sync::Mutex;

use mdns_sd::{ServiceDaemon, ServiceInfo};

use crate::config::PROGRAM_NAME;
use crate::{Error, Result};

/// mDNS service type for Wyoming voice services
pub const SERVICE_TYPE: &str = "_wyoming._tcp.local.";

/// mDNS advertiser for gateway discovery
///
/// Registration is rare and the daemon API is synchronous, so the active
/// registration is tracked under a plain mutex and the whole surface stays
/// non-async.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,

    /// Full service name of the active registration
    registered: Mutex<Option<String>>,
}

impl MdnsAdvertiser {
    /// Create a new mDNS advertiser
    ///
    /// # Errors
    ///
    /// Returns error when the host has no usable mDNS stack
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Config(format!("mDNS daemon unavailable: {e}")))?;

        Ok(Self {
            daemon,
            registered: Mutex::new(None),
        })
    }

    /// Advertise the Wyoming port, replacing any previous advertisement
    ///
    /// # Errors
    ///
    /// Returns error when the service definition is rejected or registration
    /// fails
    pub fn start(&self, port: u16) -> Result<()> {
        let host = short_hostname();
        let instance = instance_name(&host);

        let mut properties = HashMap::new();
        properties.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &instance,
            &format!("{host}.local."),
            "",
            port,
            properties,
        )
        .map_err(|e| Error::Config(format!("bad mDNS service definition: {e}")))?;

        let fullname = service.get_fullname().to_string();
        self.daemon
            .register(service)
            .map_err(|e| Error::Config(format!("mDNS registration failed: {e}")))?;

        // A restart on a new port must not leave the old record behind.
        if let Ok(mut registered) = self.registered.lock() {
            if let Some(previous) = registered.replace(fullname.clone()) {
                if previous != fullname {
                    let _ = self.daemon.unregister(&previous);
                }
            }
        }

        tracing::info!(
            service_type = SERVICE_TYPE,
            instance = instance,
            port = port,
            "mDNS service registered"
        );

        Ok(())
    }

    /// Withdraw the advertisement; a no-op when nothing is registered
    pub fn stop(&self) {
        let Some(fullname) = self.registered.lock().ok().and_then(|mut r| r.take()) else {
            return;
        };
        match self.daemon.unregister(&fullname) {
            Ok(_) => tracing::info!(instance = %fullname, "mDNS advertisement withdrawn"),
            Err(e) => tracing::warn!(instance = %fullname, error = %e, "mDNS unregister failed"),
        }
    }

    /// Whether an advertisement is currently registered
    pub fn is_advertising(&self) -> bool {
        self.registered.lock().is_ok_and(|r| r.is_some())
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        self.stop();
        let _ = self.daemon.shutdown();
    }
}

/// Instance name advertised on the LAN
fn instance_name(host: &str) -> String {
    format!("{PROGRAM_NAME}-{host}")
}

/// Host name up to the first dot, lowercased
fn short_hostname() -> String {
    hostname::get()
        .map_or_else(
            |_| PROGRAM_NAME.to_string(),
            |h| h.to_string_lossy().to_string(),
        )
        .split('.')
        .next()
        .unwrap_or(PROGRAM_NAME)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_is_the_wyoming_one() {
        assert_eq!(SERVICE_TYPE, "_wyoming._tcp.local.");
    }

    #[test]
    fn instance_name_joins_program_and_host() {
        assert_eq!(instance_name("den"), "aria-den");
        assert_eq!(instance_name("office-pi"), "aria-office-pi");
    }

    #[test]
    fn short_hostname_is_a_lowercase_single_label() {
        let host = short_hostname();
        assert!(!host.is_empty());
        assert!(!host.contains('.'));
        assert_eq!(host, host.to_lowercase());
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        // Needs a working multicast socket; skip quietly where there is none.
        let Ok(advertiser) = MdnsAdvertiser::new() else {
            return;
        };
        assert!(!advertiser.is_advertising());
        advertiser.stop();
        assert!(!advertiser.is_advertising());
    }
}
