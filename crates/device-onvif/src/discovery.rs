/// WS-Discovery multicast probe for ONVIF network video transmitters
///
/// One Probe is sent to the WS-Discovery group and unicast ProbeMatch replies
/// are read from the same socket until the deadline passes.

use crate::xml;
use async_trait::async_trait;
use camgate_core::{DeviceError, DiscoveryProbe, ProbeMatch};
use quick_xml::escape::escape;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

pub const WS_DISCOVERY_ADDR: SocketAddr =
    SocketAddr::V4(std::net::SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702));

const MULTICAST_TTL: u32 = 4;
const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Clone)]
pub struct WsDiscoveryProbe {
    target: SocketAddr,
}

impl Default for WsDiscoveryProbe {
    fn default() -> Self {
        Self {
            target: WS_DISCOVERY_ADDR,
        }
    }
}

impl WsDiscoveryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe a specific address instead of the multicast group
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

#[async_trait]
impl DiscoveryProbe for WsDiscoveryProbe {
    async fn probe(&self, scope: &str, timeout: Duration) -> Result<Vec<ProbeMatch>, DeviceError> {
        let socket = create_probe_socket()
            .map_err(|e| {
                DeviceError::operation(format!("Failed to create discovery socket: {}", e))
            })?;

        let message_id = format!("urn:uuid:{}", uuid::Uuid::new_v4());
        let probe = probe_message(&message_id, scope);
        socket
            .send_to(probe.as_bytes(), self.target)
            .await
            .map_err(|e| DeviceError::operation(format!("Failed to send discovery probe: {}", e)))?;
        info!(target = %self.target, %message_id, "WS-Discovery probe sent");

        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut matches = Vec::new();

        loop {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    let reply = String::from_utf8_lossy(&buf[..len]);
                    debug!(%from, bytes = len, "Discovery reply received");
                    match parse_probe_matches(&reply, &message_id) {
                        Some(found) => matches.extend(found),
                        None => debug!(%from, "Ignoring unrelated or unparseable datagram"),
                    }
                }
                Ok(Err(e)) => warn!("Socket error during discovery: {}", e),
                Err(_) => break,
            }
        }

        debug!(matches = matches.len(), "Discovery window closed");
        Ok(matches)
    }
}

fn create_probe_socket() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    socket.set_nonblocking(true)?;

    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&bind.into())?;

    let socket = UdpSocket::from_std(socket.into())?;
    debug!(local = ?socket.local_addr().ok(), "Discovery socket bound");
    Ok(socket)
}

/// A WS-Discovery Probe for network video transmitters in `scope`
pub fn probe_message(message_id: &str, scope: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</a:Action>
    <a:MessageID>{}</a:MessageID>
    <a:To s:mustUnderstand="1">urn:schemas-xmlsoap-org:ws:2005:04:discovery</a:To>
  </s:Header>
  <s:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
      <d:Scopes>{}</d:Scopes>
    </d:Probe>
  </s:Body>
</s:Envelope>"#,
        message_id,
        escape(scope)
    )
}

/// ProbeMatch entries of one reply, or `None` if the datagram is not a reply to `message_id`
pub fn parse_probe_matches(reply: &str, message_id: &str) -> Option<Vec<ProbeMatch>> {
    let root = xml::parse(reply).ok()?;

    if let Some(relates_to) = root.find("RelatesTo") {
        if relates_to.text.trim() != message_id {
            return None;
        }
    }

    let matches = root.find("ProbeMatches")?;
    let split = |text: Option<String>| -> Vec<String> {
        text.map(|t| t.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    };

    Some(
        matches
            .children_named("ProbeMatch")
            .map(|m| ProbeMatch {
                xaddrs: split(m.child_text("XAddrs")),
                scopes: split(m.child_text("Scopes")),
            })
            .collect(),
    )
}
