use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Sentinel reported for any profile field the device could not supply
pub const UNKNOWN: &str = "Unknown";

/// Acknowledgment returned by SelectProfile unless the literal URI is requested
pub const STREAM_URI_ACK: &str = "Stream URI fetched successfully";

/// Credentials for a single device session.
///
/// Built per request and never persisted. The password is kept out of `Debug`
/// output so credentials can be passed to tracing macros safely.
#[derive(Clone, PartialEq, Eq)]
pub struct CameraCredentials {
    pub address: Ipv4Addr,
    pub username: String,
    password: String,
}

impl CameraCredentials {
    pub fn new(
        address: Ipv4Addr,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for CameraCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraCredentials")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Pan/tilt/zoom velocity, each axis in [-1.0, 1.0]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

/// The endpoint a raw request was addressed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    FetchCameraData,
    SelectProfile,
    MovePtz,
    StopPtz,
    MoveFocus,
    StopFocus,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::FetchCameraData => "fetch_camera_data",
            CommandKind::SelectProfile => "select_profile",
            CommandKind::MovePtz => "move_ptz",
            CommandKind::StopPtz => "stop_ptz",
            CommandKind::MoveFocus => "move_focus",
            CommandKind::StopFocus => "stop_focus",
        }
    }
}

/// A verified command, ready for dispatch
#[derive(Clone, Debug, PartialEq)]
pub enum CommandRequest {
    FetchCameraData,
    SelectProfile { profile_token: String },
    MovePtz { profile_token: String, velocity: Velocity },
    StopPtz { profile_token: String },
    MoveFocus { speed: f64 },
    StopFocus,
}

impl CommandRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandRequest::FetchCameraData => CommandKind::FetchCameraData,
            CommandRequest::SelectProfile { .. } => CommandKind::SelectProfile,
            CommandRequest::MovePtz { .. } => CommandKind::MovePtz,
            CommandRequest::StopPtz { .. } => CommandKind::StopPtz,
            CommandRequest::MoveFocus { .. } => CommandKind::MoveFocus,
            CommandRequest::StopFocus => CommandKind::StopFocus,
        }
    }
}

/// Reply of GetDeviceInformation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInformation {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub hardware_id: String,
}

/// One media profile as listed by GetProfiles
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaProfile {
    pub token: String,
    pub name: Option<String>,
    pub video_source_token: Option<String>,
    pub video_encoder_token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Reply of GetVideoEncoderConfiguration; every part may be absent
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoEncoderConfiguration {
    pub encoding: Option<String>,
    pub resolution: Option<Resolution>,
    pub frame_rate_limit: Option<u32>,
    pub bitrate_limit: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PtzConfiguration {
    pub token: String,
    pub name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UtcDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl UtcDateTime {
    /// `YYYY-MM-DD HH:MM:SS`
    pub fn formatted(&self) -> String {
        format!(
            "{}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Reply of GetSystemDateAndTime. Some devices omit the UTC block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemDateTime {
    pub utc: Option<UtcDateTime>,
}

/// Stream type and transport requested from GetStreamUri
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSetup {
    pub stream: &'static str,
    pub protocol: &'static str,
}

impl StreamSetup {
    pub fn unicast_rtsp() -> Self {
        Self {
            stream: "RTP-Unicast",
            protocol: "RTSP",
        }
    }
}

/// One raw WS-Discovery ProbeMatch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeMatch {
    pub xaddrs: Vec<String>,
    pub scopes: Vec<String>,
}

/// Encoder details for one profile, with "Unknown" for anything unresolved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub name: String,
    pub token: String,
    pub encoder: String,
    pub resolution: String,
    pub frame_rate: String,
    pub bitrate: String,
}

impl ProfileSummary {
    /// Every field is set here; a missing encoder lookup leaves its fields at the sentinel.
    pub fn new(profile: &MediaProfile, encoder: Option<&VideoEncoderConfiguration>) -> Self {
        let name = profile.name.clone().unwrap_or_else(|| UNKNOWN.to_string());
        let token = if profile.token.is_empty() {
            UNKNOWN.to_string()
        } else {
            profile.token.clone()
        };

        let known = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            name,
            token,
            encoder: known(encoder.and_then(|e| e.encoding.clone())),
            resolution: known(encoder.and_then(|e| e.resolution).map(|r| r.to_string())),
            frame_rate: known(encoder.and_then(|e| e.frame_rate_limit).map(|v| v.to_string())),
            bitrate: known(encoder.and_then(|e| e.bitrate_limit).map(|v| v.to_string())),
        }
    }
}

/// Response of FetchCameraData
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub device_info: DeviceInformation,
    pub profiles: Vec<ProfileSummary>,
    pub ptz_available: bool,
    pub camera_running: bool,
    pub system_date_time: Option<String>,
}

/// Response of SelectProfile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelection {
    pub stream_uri: String,
}

/// Fixed acknowledgment for motion commands
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub message: String,
}

impl CommandAck {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Successful result of any dispatched command
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutcome {
    Snapshot(CameraSnapshot),
    Stream(StreamSelection),
    Ack(CommandAck),
}

/// A device found by multicast discovery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: Ipv4Addr,
    pub profiles: BTreeSet<String>,
}
