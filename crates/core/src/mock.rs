//! Scripted stand-ins for a camera and for the multicast probe.
//!
//! Used by this crate's unit tests and, behind the `test-util` feature, by
//! the HTTP layer's integration tests.

use crate::errors::DeviceError;
use crate::models::{
    CameraCredentials, DeviceInformation, MediaProfile, ProbeMatch, PtzConfiguration,
    Resolution, StreamSetup, SystemDateTime, UtcDateTime, Velocity, VideoEncoderConfiguration,
};
use crate::traits::{DeviceConnector, DeviceSession, DiscoveryProbe};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Remote calls that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    DeviceInformation,
    Profiles,
    PtzConfigurations,
    SystemDateAndTime,
    StreamUri,
    ContinuousMove,
    Stop,
    FocusMove,
    FocusStop,
}

#[derive(Debug, Default)]
struct Script {
    info: DeviceInformation,
    profiles: Vec<MediaProfile>,
    encoders: HashMap<String, VideoEncoderConfiguration>,
    ptz: Vec<PtzConfiguration>,
    clock: SystemDateTime,
    connect_error: Option<String>,
    failures: HashMap<Failure, String>,
    encoder_failures: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Vec<String>,
    connections: usize,
}

/// An in-memory camera. Clones share the same script and call log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDevice {
    /// Two profiles with encoders, one PTZ node and a running clock
    pub fn healthy() -> Self {
        let profiles = vec![
            MediaProfile {
                token: "Profile_1".to_string(),
                name: Some("mainStream".to_string()),
                video_source_token: Some("VideoSource_1".to_string()),
                video_encoder_token: Some("VEC_1".to_string()),
            },
            MediaProfile {
                token: "Profile_2".to_string(),
                name: Some("subStream".to_string()),
                video_source_token: Some("VideoSource_1".to_string()),
                video_encoder_token: Some("VEC_2".to_string()),
            },
        ];

        let mut encoders = HashMap::new();
        encoders.insert(
            "VEC_1".to_string(),
            VideoEncoderConfiguration {
                encoding: Some("H264".to_string()),
                resolution: Some(Resolution { width: 1920, height: 1080 }),
                frame_rate_limit: Some(25),
                bitrate_limit: Some(4096),
            },
        );
        encoders.insert(
            "VEC_2".to_string(),
            VideoEncoderConfiguration {
                encoding: Some("H264".to_string()),
                resolution: Some(Resolution { width: 640, height: 480 }),
                frame_rate_limit: Some(15),
                bitrate_limit: Some(512),
            },
        );

        let script = Script {
            info: DeviceInformation {
                manufacturer: "Acme".to_string(),
                model: "DomeCam 3000".to_string(),
                firmware_version: "1.4.2".to_string(),
                serial_number: "SN-0001".to_string(),
                hardware_id: "HW-7".to_string(),
            },
            profiles,
            encoders,
            ptz: vec![PtzConfiguration {
                token: "PTZ_1".to_string(),
                name: Some("ptz".to_string()),
            }],
            clock: SystemDateTime {
                utc: Some(UtcDateTime {
                    year: 2024,
                    month: 5,
                    day: 1,
                    hour: 12,
                    minute: 30,
                    second: 5,
                }),
            },
            ..Default::default()
        };

        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn failing(self, failure: Failure, diagnostic: &str) -> Self {
        self.lock().failures.insert(failure, diagnostic.to_string());
        self
    }

    pub fn failing_encoder(self, configuration_token: &str, diagnostic: &str) -> Self {
        self.lock()
            .encoder_failures
            .insert(configuration_token.to_string(), diagnostic.to_string());
        self
    }

    pub fn refusing_connect(self, diagnostic: &str) -> Self {
        self.lock().connect_error = Some(diagnostic.to_string());
        self
    }

    pub fn with_profiles(self, profiles: Vec<MediaProfile>) -> Self {
        self.lock().profiles = profiles;
        self
    }

    pub fn with_clock(self, clock: SystemDateTime) -> Self {
        self.lock().clock = clock;
        self
    }

    /// Every remote operation sleeps this long before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    /// Operations issued so far, in order, as `Action[:args]`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Sessions successfully opened so far
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DeviceConnector for ScriptedDevice {
    async fn connect(
        &self,
        credentials: &CameraCredentials,
    ) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let mut script = self.lock();
        if let Some(diagnostic) = &script.connect_error {
            return Err(DeviceError::connect(diagnostic.clone()));
        }
        script.connections += 1;
        Ok(Box::new(ScriptedSession {
            device: self.clone(),
            address: credentials.address,
        }))
    }
}

struct ScriptedSession {
    device: ScriptedDevice,
    address: Ipv4Addr,
}

impl ScriptedSession {
    /// Log the call, wait out any scripted delay, then report a scripted failure
    async fn enter(&self, call: String, failure: Failure) -> Result<(), DeviceError> {
        let delay = {
            let mut script = self.device.lock();
            script.calls.push(call);
            script.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.device.lock().failures.get(&failure).cloned();
        match scripted {
            Some(diagnostic) => Err(DeviceError::operation(diagnostic)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn device_information(&self) -> Result<DeviceInformation, DeviceError> {
        self.enter("GetDeviceInformation".to_string(), Failure::DeviceInformation)
            .await?;
        Ok(self.device.lock().info.clone())
    }

    async fn profiles(&self) -> Result<Vec<MediaProfile>, DeviceError> {
        self.enter("GetProfiles".to_string(), Failure::Profiles).await?;
        Ok(self.device.lock().profiles.clone())
    }

    async fn ptz_configurations(&self) -> Result<Vec<PtzConfiguration>, DeviceError> {
        self.enter("GetConfigurations".to_string(), Failure::PtzConfigurations)
            .await?;
        Ok(self.device.lock().ptz.clone())
    }

    async fn system_date_and_time(&self) -> Result<SystemDateTime, DeviceError> {
        self.enter("GetSystemDateAndTime".to_string(), Failure::SystemDateAndTime)
            .await?;
        Ok(self.device.lock().clock.clone())
    }

    async fn video_encoder_configuration(
        &self,
        configuration_token: &str,
    ) -> Result<VideoEncoderConfiguration, DeviceError> {
        self.device
            .lock()
            .calls
            .push(format!("GetVideoEncoderConfiguration:{}", configuration_token));

        let script = self.device.lock();
        if let Some(diagnostic) = script.encoder_failures.get(configuration_token) {
            return Err(DeviceError::operation(diagnostic.clone()));
        }
        script
            .encoders
            .get(configuration_token)
            .cloned()
            .ok_or_else(|| DeviceError::operation("ter:InvalidArgVal: ter:NoConfig"))
    }

    async fn stream_uri(
        &self,
        profile_token: &str,
        _setup: StreamSetup,
    ) -> Result<String, DeviceError> {
        self.enter(format!("GetStreamUri:{}", profile_token), Failure::StreamUri)
            .await?;
        let known = self
            .device
            .lock()
            .profiles
            .iter()
            .any(|p| p.token == profile_token);
        if known {
            Ok(format!("rtsp://{}:554/{}", self.address, profile_token))
        } else {
            Err(DeviceError::operation(
                "ter:InvalidArgVal: ter:NoProfile: Profile token does not exist",
            ))
        }
    }

    async fn continuous_move(
        &self,
        profile_token: &str,
        velocity: Velocity,
    ) -> Result<(), DeviceError> {
        self.enter(
            format!(
                "ContinuousMove:{}:{},{},{}",
                profile_token, velocity.pan, velocity.tilt, velocity.zoom
            ),
            Failure::ContinuousMove,
        )
        .await
    }

    async fn stop(&self, profile_token: &str) -> Result<(), DeviceError> {
        self.enter(format!("Stop:{}", profile_token), Failure::Stop).await
    }

    async fn focus_move(&self, video_source_token: &str, speed: f64) -> Result<(), DeviceError> {
        self.enter(
            format!("FocusMove:{}:{}", video_source_token, speed),
            Failure::FocusMove,
        )
        .await
    }

    async fn focus_stop(&self, video_source_token: &str) -> Result<(), DeviceError> {
        self.enter(format!("FocusStop:{}", video_source_token), Failure::FocusStop)
            .await
    }
}

/// A probe that answers with a fixed set of replies, or fails to send
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    replies: Vec<ProbeMatch>,
    send_error: Option<String>,
    scopes_seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProbe {
    pub fn replying(replies: Vec<ProbeMatch>) -> Self {
        Self {
            replies,
            ..Default::default()
        }
    }

    pub fn unreachable(diagnostic: &str) -> Self {
        Self {
            send_error: Some(diagnostic.to_string()),
            ..Default::default()
        }
    }

    /// Scopes passed to `probe`, in call order
    pub fn scopes_seen(&self) -> Vec<String> {
        self.scopes_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Shorthand for a reply with one transport address
pub fn probe_match(xaddr: &str, scopes: &[&str]) -> ProbeMatch {
    ProbeMatch {
        xaddrs: vec![xaddr.to_string()],
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
    }
}

#[async_trait]
impl DiscoveryProbe for ScriptedProbe {
    async fn probe(&self, scope: &str, _timeout: Duration) -> Result<Vec<ProbeMatch>, DeviceError> {
        self.scopes_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(scope.to_string());
        match &self.send_error {
            Some(diagnostic) => Err(DeviceError::operation(diagnostic.clone())),
            None => Ok(self.replies.clone()),
        }
    }
}
