//! Command dispatch against a device.
//!
//! Every command opens its own session, runs a short fixed sequence of
//! operations and drops the session. Sessions are never shared between
//! requests, so one device failing cannot poison another request.

use crate::errors::{classify_device_error, DeviceError, ErrorEnvelope};
use crate::models::{
    CameraCredentials, CameraSnapshot, CommandAck, CommandOutcome, CommandRequest,
    ProfileSummary, StreamSelection, StreamSetup, Velocity, STREAM_URI_ACK,
};
use crate::traits::{DeviceConnector, DeviceSession, Operation};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PTZ_MOVE_ACK: &str = "PTZ movement started";
pub const PTZ_STOP_ACK: &str = "PTZ movement stopped";
pub const FOCUS_MOVE_ACK: &str = "Focus movement started";
pub const FOCUS_STOP_ACK: &str = "Focus movement stopped";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacadeOptions {
    /// Deadline for the connect step and for each remote operation
    pub call_timeout: Duration,
    /// Return the literal RTSP URI from SelectProfile instead of the acknowledgment
    pub echo_stream_uri: bool,
}

impl Default for FacadeOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            echo_stream_uri: false,
        }
    }
}

/// Translates validated commands into device-protocol calls
#[derive(Clone)]
pub struct CommandFacade {
    connector: Arc<dyn DeviceConnector>,
    options: FacadeOptions,
}

impl CommandFacade {
    pub fn new(connector: Arc<dyn DeviceConnector>, options: FacadeOptions) -> Self {
        Self { connector, options }
    }

    /// Run one command end to end
    pub async fn dispatch(
        &self,
        credentials: &CameraCredentials,
        request: &CommandRequest,
    ) -> Result<CommandOutcome, ErrorEnvelope> {
        info!(
            command = request.kind().as_str(),
            address = %credentials.address,
            "Dispatching device command"
        );

        let outcome = match request {
            CommandRequest::FetchCameraData => {
                self.fetch_camera_data(credentials).await.map(CommandOutcome::Snapshot)
            }
            CommandRequest::SelectProfile { profile_token } => self
                .select_profile(credentials, profile_token)
                .await
                .map(CommandOutcome::Stream),
            CommandRequest::MovePtz {
                profile_token,
                velocity,
            } => self
                .move_ptz(credentials, profile_token, *velocity)
                .await
                .map(CommandOutcome::Ack),
            CommandRequest::StopPtz { profile_token } => self
                .stop_ptz(credentials, profile_token)
                .await
                .map(CommandOutcome::Ack),
            CommandRequest::MoveFocus { speed } => self
                .move_focus(credentials, *speed)
                .await
                .map(CommandOutcome::Ack),
            CommandRequest::StopFocus => {
                self.stop_focus(credentials).await.map(CommandOutcome::Ack)
            }
        };

        if let Err(envelope) = &outcome {
            warn!(
                command = request.kind().as_str(),
                address = %credentials.address,
                kind = ?envelope.kind,
                status = envelope.status,
                "Device command failed: {}",
                envelope.message
            );
        }

        outcome
    }

    /// Identity and profiles are required; PTZ presence, clock and per-profile
    /// encoder details degrade to defaults when the device refuses them.
    pub async fn fetch_camera_data(
        &self,
        credentials: &CameraCredentials,
    ) -> Result<CameraSnapshot, ErrorEnvelope> {
        let session = self.open(credentials).await?;

        let device_info = self
            .call(Operation::GetDeviceInformation, session.device_information())
            .await
            .map_err(classify)?;
        let profiles = self
            .call(Operation::GetProfiles, session.profiles())
            .await
            .map_err(classify)?;

        let ptz_available = match self
            .call(Operation::GetConfigurations, session.ptz_configurations())
            .await
        {
            Ok(configurations) => !configurations.is_empty(),
            Err(e) => {
                warn!(address = %credentials.address, "PTZ not available: {}", e);
                false
            }
        };

        let (camera_running, system_date_time) = match self
            .call(Operation::GetSystemDateAndTime, session.system_date_and_time())
            .await
        {
            Ok(date_time) => (true, date_time.utc.map(|utc| utc.formatted())),
            Err(e) => {
                warn!(address = %credentials.address, "Camera not running: {}", e);
                (false, None)
            }
        };

        let mut summaries = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            let encoder = match profile.video_encoder_token.as_deref() {
                Some(token) => match self
                    .call(
                        Operation::GetVideoEncoderConfiguration,
                        session.video_encoder_configuration(token),
                    )
                    .await
                {
                    Ok(configuration) => Some(configuration),
                    Err(e) => {
                        warn!(
                            profile = %profile.token,
                            "Failed to fetch encoder details: {}",
                            e
                        );
                        None
                    }
                },
                None => {
                    debug!(profile = %profile.token, "Profile has no video encoder configuration");
                    None
                }
            };
            summaries.push(ProfileSummary::new(profile, encoder.as_ref()));
        }

        info!(
            address = %credentials.address,
            profiles = summaries.len(),
            ptz_available,
            camera_running,
            "Camera data fetched"
        );

        Ok(CameraSnapshot {
            device_info,
            profiles: summaries,
            ptz_available,
            camera_running,
            system_date_time,
        })
    }

    pub async fn select_profile(
        &self,
        credentials: &CameraCredentials,
        profile_token: &str,
    ) -> Result<StreamSelection, ErrorEnvelope> {
        let session = self.open(credentials).await?;
        let uri = self
            .call(
                Operation::GetStreamUri,
                session.stream_uri(profile_token, StreamSetup::unicast_rtsp()),
            )
            .await
            .map_err(classify)?;

        debug!(profile = profile_token, uri = %uri, "Stream URI resolved");

        let stream_uri = if self.options.echo_stream_uri {
            uri
        } else {
            STREAM_URI_ACK.to_string()
        };
        Ok(StreamSelection { stream_uri })
    }

    pub async fn move_ptz(
        &self,
        credentials: &CameraCredentials,
        profile_token: &str,
        velocity: Velocity,
    ) -> Result<CommandAck, ErrorEnvelope> {
        let session = self.open(credentials).await?;
        self.call(
            Operation::ContinuousMove,
            session.continuous_move(profile_token, velocity),
        )
        .await
        .map_err(classify)?;
        Ok(CommandAck::new(PTZ_MOVE_ACK))
    }

    pub async fn stop_ptz(
        &self,
        credentials: &CameraCredentials,
        profile_token: &str,
    ) -> Result<CommandAck, ErrorEnvelope> {
        let session = self.open(credentials).await?;
        self.call(Operation::Stop, session.stop(profile_token))
            .await
            .map_err(classify)?;
        Ok(CommandAck::new(PTZ_STOP_ACK))
    }

    pub async fn move_focus(
        &self,
        credentials: &CameraCredentials,
        speed: f64,
    ) -> Result<CommandAck, ErrorEnvelope> {
        let session = self.open(credentials).await?;
        let source = self.video_source_token(session.as_ref()).await.map_err(classify)?;
        self.call(Operation::FocusMove, session.focus_move(&source, speed))
            .await
            .map_err(classify)?;
        Ok(CommandAck::new(FOCUS_MOVE_ACK))
    }

    pub async fn stop_focus(
        &self,
        credentials: &CameraCredentials,
    ) -> Result<CommandAck, ErrorEnvelope> {
        let session = self.open(credentials).await?;
        let source = self.video_source_token(session.as_ref()).await.map_err(classify)?;
        self.call(Operation::FocusStop, session.focus_stop(&source))
            .await
            .map_err(classify)?;
        Ok(CommandAck::new(FOCUS_STOP_ACK))
    }

    /// The video source of the first media profile. Required, never degraded.
    async fn video_source_token(&self, session: &dyn DeviceSession) -> Result<String, DeviceError> {
        let profiles = self.call(Operation::GetProfiles, session.profiles()).await?;
        let first = profiles
            .first()
            .ok_or_else(|| DeviceError::operation("No media profiles available on the device"))?;
        first.video_source_token.clone().ok_or_else(|| {
            DeviceError::operation(format!(
                "Media profile {} has no video source configuration",
                first.token
            ))
        })
    }

    async fn open(
        &self,
        credentials: &CameraCredentials,
    ) -> Result<Box<dyn DeviceSession>, ErrorEnvelope> {
        match tokio::time::timeout(self.options.call_timeout, self.connector.connect(credentials))
            .await
        {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(classify(DeviceError::connect(format!(
                "Connecting to {} timed out after {:?}",
                credentials.address, self.options.call_timeout
            )))),
        }
    }

    async fn call<T, F>(&self, operation: Operation, future: F) -> Result<T, DeviceError>
    where
        F: Future<Output = Result<T, DeviceError>>,
    {
        debug!(action = operation.action(), "Calling device operation");
        tokio::time::timeout(self.options.call_timeout, future)
            .await
            .unwrap_or_else(|_| {
                Err(DeviceError::operation(format!(
                    "{} timed out after {:?}",
                    operation.action(),
                    self.options.call_timeout
                )))
            })
    }
}

fn classify(error: DeviceError) -> ErrorEnvelope {
    classify_device_error(&error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::mock::{Failure, ScriptedDevice};
    use crate::models::{MediaProfile, SystemDateTime, UNKNOWN};
    use std::net::Ipv4Addr;

    fn creds() -> CameraCredentials {
        CameraCredentials::new(Ipv4Addr::new(192, 168, 1, 10), "admin", "password1")
    }

    fn facade(device: &ScriptedDevice) -> CommandFacade {
        CommandFacade::new(Arc::new(device.clone()), FacadeOptions::default())
    }

    #[tokio::test]
    async fn test_fetch_camera_data_full() {
        let device = ScriptedDevice::healthy();
        let snapshot = facade(&device).fetch_camera_data(&creds()).await.unwrap();

        assert_eq!(snapshot.device_info.manufacturer, "Acme");
        assert!(snapshot.ptz_available);
        assert!(snapshot.camera_running);
        assert_eq!(snapshot.system_date_time.as_deref(), Some("2024-05-01 12:30:05"));
        let tokens: Vec<_> = snapshot.profiles.iter().map(|p| p.token.as_str()).collect();
        assert_eq!(tokens, ["Profile_1", "Profile_2"]);
        assert_eq!(snapshot.profiles[0].resolution, "1920x1080");
        assert_eq!(snapshot.profiles[0].encoder, "H264");
    }

    #[tokio::test]
    async fn test_fetch_camera_data_ptz_failure_is_degraded() {
        let device =
            ScriptedDevice::healthy().failing(Failure::PtzConfigurations, "Service not supported");
        let snapshot = facade(&device).fetch_camera_data(&creds()).await.unwrap();
        assert!(!snapshot.ptz_available);
        assert!(snapshot.camera_running);
    }

    #[tokio::test]
    async fn test_fetch_camera_data_clock_failure_is_degraded() {
        let device = ScriptedDevice::healthy().failing(Failure::SystemDateAndTime, "timeout");
        let snapshot = facade(&device).fetch_camera_data(&creds()).await.unwrap();
        assert!(!snapshot.camera_running);
        assert_eq!(snapshot.system_date_time, None);
    }

    #[tokio::test]
    async fn test_fetch_camera_data_clock_without_utc() {
        let device = ScriptedDevice::healthy().with_clock(SystemDateTime { utc: None });
        let snapshot = facade(&device).fetch_camera_data(&creds()).await.unwrap();
        assert!(snapshot.camera_running);
        assert_eq!(snapshot.system_date_time, None);
    }

    #[tokio::test]
    async fn test_fetch_camera_data_encoder_failure_degrades_one_profile() {
        let device = ScriptedDevice::healthy().failing_encoder("VEC_2", "encoder busy");
        let snapshot = facade(&device).fetch_camera_data(&creds()).await.unwrap();
        assert_eq!(snapshot.profiles[0].encoder, "H264");
        assert_eq!(snapshot.profiles[1].name, "subStream");
        assert_eq!(snapshot.profiles[1].encoder, UNKNOWN);
        assert_eq!(snapshot.profiles[1].resolution, UNKNOWN);
        assert_eq!(snapshot.profiles[1].frame_rate, UNKNOWN);
        assert_eq!(snapshot.profiles[1].bitrate, UNKNOWN);
    }

    #[tokio::test]
    async fn test_fetch_camera_data_required_call_fails() {
        let device = ScriptedDevice::healthy().failing(Failure::Profiles, "device exploded");
        let err = facade(&device).fetch_camera_data(&creds()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert_eq!(err.message, "device exploded");
    }

    #[tokio::test]
    async fn test_connect_unauthorized() {
        let device = ScriptedDevice::healthy().refusing_connect("HTTP 401 Unauthorized");
        let err = facade(&device).fetch_camera_data(&creds()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadCredentials);
        assert_eq!(err.status, 401);
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_select_profile_acknowledges() {
        let device = ScriptedDevice::healthy();
        let selection = facade(&device).select_profile(&creds(), "Profile_1").await.unwrap();
        assert_eq!(selection.stream_uri, STREAM_URI_ACK);
        assert_eq!(device.calls(), ["GetStreamUri:Profile_1"]);
    }

    #[tokio::test]
    async fn test_select_profile_can_echo_uri() {
        let device = ScriptedDevice::healthy();
        let options = FacadeOptions {
            echo_stream_uri: true,
            ..FacadeOptions::default()
        };
        let facade = CommandFacade::new(Arc::new(device.clone()), options);
        let selection = facade.select_profile(&creds(), "Profile_1").await.unwrap();
        assert_eq!(selection.stream_uri, "rtsp://192.168.1.10:554/Profile_1");
    }

    #[tokio::test]
    async fn test_select_profile_unknown_token() {
        let device = ScriptedDevice::healthy();
        let err = facade(&device).select_profile(&creds(), "nope").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProfileNotFound);
        assert_eq!(err.status, 404);
    }

    #[tokio::test]
    async fn test_move_and_stop_ptz() {
        let device = ScriptedDevice::healthy();
        let facade = facade(&device);
        let velocity = Velocity { pan: 0.5, tilt: -0.25, zoom: 0.0 };

        let ack = facade.move_ptz(&creds(), "Profile_1", velocity).await.unwrap();
        assert_eq!(ack.message, PTZ_MOVE_ACK);
        let ack = facade.stop_ptz(&creds(), "Profile_1").await.unwrap();
        assert_eq!(ack.message, PTZ_STOP_ACK);

        assert_eq!(
            device.calls(),
            ["ContinuousMove:Profile_1:0.5,-0.25,0", "Stop:Profile_1"]
        );
        assert_eq!(device.connections(), 2);
    }

    #[tokio::test]
    async fn test_ptz_failure_is_classified() {
        let device = ScriptedDevice::healthy()
            .failing(Failure::ContinuousMove, "Sender not Authorized");
        let err = facade(&device)
            .move_ptz(&creds(), "Profile_1", Velocity::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_focus_uses_first_profile_source() {
        let device = ScriptedDevice::healthy();
        let facade = facade(&device);
        facade.move_focus(&creds(), 0.3).await.unwrap();
        facade.stop_focus(&creds()).await.unwrap();
        assert_eq!(
            device.calls(),
            ["GetProfiles", "FocusMove:VideoSource_1:0.3", "GetProfiles", "FocusStop:VideoSource_1"]
        );
    }

    #[tokio::test]
    async fn test_focus_without_profiles_fails() {
        let device = ScriptedDevice::healthy().with_profiles(Vec::new());
        let err = facade(&device).move_focus(&creds(), 0.3).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert_eq!(err.status, 500);
        assert!(!device.calls().iter().any(|c| c.starts_with("FocusMove")));
    }

    #[tokio::test]
    async fn test_focus_profile_without_source_fails() {
        let device = ScriptedDevice::healthy().with_profiles(vec![MediaProfile {
            token: "bare".to_string(),
            ..Default::default()
        }]);
        let err = facade(&device).stop_focus(&creds()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert!(err.message.contains("bare"));
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_request() {
        let device = ScriptedDevice::healthy();
        let outcome = facade(&device)
            .dispatch(&creds(), &CommandRequest::StopFocus)
            .await
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Ack(CommandAck::new(FOCUS_STOP_ACK)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let device = ScriptedDevice::healthy().with_delay(Duration::from_secs(60));
        let err = facade(&device)
            .stop_ptz(&creds(), "Profile_1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert!(err.message.contains("timed out"));
    }
}
