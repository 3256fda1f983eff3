//! Multicast device discovery.
//!
//! The engine sends one probe through a [`DiscoveryProbe`], then reduces the raw
//! replies to one entry per device address. Reply order is whatever the network
//! delivered, so callers must not rely on it.

use crate::errors::ErrorEnvelope;
use crate::models::{DiscoveredDevice, ProbeMatch};
use crate::traits::DiscoveryProbe;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_SCOPE: &str = "onvif://www.onvif.org/Profile";

/// Namespace of device profile scopes, e.g. `onvif://www.onvif.org/Profile/Streaming`
pub const PROFILE_SCOPE_MARKER: &str = "onvif.org/Profile/";

#[derive(Clone)]
pub struct DiscoveryEngine {
    probe: Arc<dyn DiscoveryProbe>,
    scope: String,
    timeout: Duration,
}

impl DiscoveryEngine {
    pub fn new(
        probe: Arc<dyn DiscoveryProbe>,
        scope: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            scope: scope.into(),
            timeout,
        }
    }

    /// Probe the network and return every device that answered in time.
    ///
    /// An empty list means nobody answered. An error means the probe could not be sent.
    pub async fn discover(&self) -> Result<Vec<DiscoveredDevice>, ErrorEnvelope> {
        info!(scope = %self.scope, timeout = ?self.timeout, "Starting device discovery");

        let replies = self.probe.probe(&self.scope, self.timeout).await.map_err(|e| {
            warn!("Discovery probe failed: {}", e);
            ErrorEnvelope::discovery_unavailable()
        })?;

        let devices = collect_devices(&replies);
        info!(
            replies = replies.len(),
            devices = devices.len(),
            "Discovery complete"
        );
        Ok(devices)
    }
}

/// Reduce raw replies to unique devices, keeping first-seen order and merging
/// the profile names of repeated replies from the same address.
///
/// Profile names come from the device profile namespace regardless of the
/// scope the probe was sent with.
pub fn collect_devices(replies: &[ProbeMatch]) -> Vec<DiscoveredDevice> {
    let mut devices: Vec<DiscoveredDevice> = Vec::new();
    let mut index: HashMap<Ipv4Addr, usize> = HashMap::new();

    for reply in replies {
        let Some(address) = first_ipv4(&reply.xaddrs) else {
            debug!(xaddrs = ?reply.xaddrs, "Skipping reply without an IPv4 address");
            continue;
        };

        let profiles = reply
            .scopes
            .iter()
            .filter_map(|scope| profile_name(scope));

        match index.get(&address).copied() {
            Some(i) => devices[i].profiles.extend(profiles),
            None => {
                debug!(%address, "Discovered device");
                index.insert(address, devices.len());
                devices.push(DiscoveredDevice {
                    address,
                    profiles: profiles.collect(),
                });
            }
        }
    }

    devices
}

/// First dotted-quad literal found across the transport addresses, in order
pub fn first_ipv4(xaddrs: &[String]) -> Option<Ipv4Addr> {
    xaddrs.iter().find_map(|xaddr| {
        xaddr
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .find_map(|token| token.parse::<Ipv4Addr>().ok())
    })
}

/// Last path segment of a profile scope. The bare namespace has no name.
fn profile_name(scope: &str) -> Option<String> {
    if !scope.contains(PROFILE_SCOPE_MARKER) {
        return None;
    }
    scope
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::mock::{probe_match, ScriptedProbe};

    fn engine(probe: ScriptedProbe) -> DiscoveryEngine {
        DiscoveryEngine::new(Arc::new(probe), DEFAULT_SCOPE, Duration::from_secs(5))
    }

    #[test]
    fn test_first_ipv4() {
        let xaddrs = vec!["http://192.168.1.64:80/onvif/device_service".to_string()];
        assert_eq!(first_ipv4(&xaddrs), Some(Ipv4Addr::new(192, 168, 1, 64)));

        let xaddrs = vec![
            "http://[fe80::1]/onvif/device_service".to_string(),
            "http://10.0.0.7/onvif/device_service".to_string(),
        ];
        assert_eq!(first_ipv4(&xaddrs), Some(Ipv4Addr::new(10, 0, 0, 7)));

        let xaddrs = vec!["http://camera.local/onvif/device_service".to_string()];
        assert_eq!(first_ipv4(&xaddrs), None);
        assert_eq!(first_ipv4(&[]), None);
    }

    #[test]
    fn test_profile_name() {
        assert_eq!(
            profile_name("onvif://www.onvif.org/Profile/Streaming").as_deref(),
            Some("Streaming")
        );
        assert_eq!(profile_name("onvif://www.onvif.org/Profile/"), None);
        assert_eq!(profile_name("onvif://www.onvif.org/name/Cam"), None);
    }

    #[test]
    fn test_collect_extracts_profile_names() {
        let replies = vec![probe_match(
            "http://192.168.1.64/onvif/device_service",
            &[
                "onvif://www.onvif.org/Profile/Streaming",
                "onvif://www.onvif.org/Profile/T",
                "onvif://www.onvif.org/hardware/DS-2CD2043",
                "onvif://www.onvif.org/location/city/hangzhou",
            ],
        )];
        let devices = collect_devices(&replies);
        assert_eq!(devices.len(), 1);
        let names: Vec<_> = devices[0].profiles.iter().map(String::as_str).collect();
        assert_eq!(names, ["Streaming", "T"]);
    }

    #[test]
    fn test_collect_dedups_and_merges() {
        let replies = vec![
            probe_match("http://10.0.0.2/onvif", &["onvif://www.onvif.org/Profile/S"]),
            probe_match("http://10.0.0.1/onvif", &["onvif://www.onvif.org/Profile/G"]),
            probe_match("http://10.0.0.2:8080/onvif", &["onvif://www.onvif.org/Profile/T"]),
        ];
        let devices = collect_devices(&replies);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(devices[1].address, Ipv4Addr::new(10, 0, 0, 1));
        assert!(devices[0].profiles.contains("S"));
        assert!(devices[0].profiles.contains("T"));
    }

    #[test]
    fn test_bare_profile_namespace_has_no_name() {
        let replies = vec![probe_match(
            "http://10.0.0.4/onvif/device_service",
            &["onvif://www.onvif.org/Profile/", "onvif://www.onvif.org/Profile/G"],
        )];
        let devices = collect_devices(&replies);
        let names: Vec<_> = devices[0].profiles.iter().map(String::as_str).collect();
        assert_eq!(names, ["G"]);
    }

    #[tokio::test]
    async fn test_narrowed_scope_still_reports_all_profiles() {
        let probe = ScriptedProbe::replying(vec![probe_match(
            "http://10.0.0.2/onvif/device_service",
            &[
                "onvif://www.onvif.org/Profile/Streaming",
                "onvif://www.onvif.org/Profile/T",
            ],
        )]);
        let scope = "onvif://www.onvif.org/Profile/Streaming";
        let engine = DiscoveryEngine::new(Arc::new(probe.clone()), scope, Duration::from_secs(5));

        let devices = engine.discover().await.unwrap();
        assert_eq!(probe.scopes_seen(), [scope]);
        let names: Vec<_> = devices[0].profiles.iter().map(String::as_str).collect();
        assert_eq!(names, ["Streaming", "T"]);
    }

    #[test]
    fn test_collect_skips_replies_without_ipv4() {
        let replies = vec![
            probe_match("http://camera.local/onvif", &["onvif://www.onvif.org/Profile/S"]),
            probe_match("http://10.0.0.9/onvif", &[]),
        ];
        let devices = collect_devices(&replies);
        assert_eq!(devices.len(), 1);
        assert!(devices[0].profiles.is_empty());
    }

    #[tokio::test]
    async fn test_discover_passes_scope_and_collects() {
        let probe = ScriptedProbe::replying(vec![
            probe_match("http://10.0.0.2/onvif", &["onvif://www.onvif.org/Profile/S"]),
            probe_match("http://10.0.0.2/onvif", &["onvif://www.onvif.org/Profile/S"]),
        ]);
        let devices = engine(probe.clone()).discover().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(probe.scopes_seen(), [DEFAULT_SCOPE]);
    }

    #[tokio::test]
    async fn test_discover_empty_is_not_an_error() {
        let devices = engine(ScriptedProbe::replying(Vec::new())).discover().await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_discover_probe_failure() {
        let err = engine(ScriptedProbe::unreachable("Network is unreachable"))
            .discover()
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DiscoveryUnavailable);
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "Failed to fetch ONVIF devices");
    }
}
