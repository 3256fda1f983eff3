use crate::errors::DeviceError;
use crate::models::{
    CameraCredentials, DeviceInformation, MediaProfile, ProbeMatch, PtzConfiguration,
    StreamSetup, SystemDateTime, Velocity, VideoEncoderConfiguration,
};
use async_trait::async_trait;
use std::time::Duration;

/// Typed remote operations, named after the SOAP actions they issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetDeviceInformation,
    GetProfiles,
    GetConfigurations,
    GetSystemDateAndTime,
    GetVideoEncoderConfiguration,
    GetStreamUri,
    ContinuousMove,
    Stop,
    FocusMove,
    FocusStop,
}

impl Operation {
    pub fn action(&self) -> &'static str {
        match self {
            Operation::GetDeviceInformation => "GetDeviceInformation",
            Operation::GetProfiles => "GetProfiles",
            Operation::GetConfigurations => "GetConfigurations",
            Operation::GetSystemDateAndTime => "GetSystemDateAndTime",
            Operation::GetVideoEncoderConfiguration => "GetVideoEncoderConfiguration",
            Operation::GetStreamUri => "GetStreamUri",
            Operation::ContinuousMove => "ContinuousMove",
            Operation::Stop => "Stop",
            Operation::FocusMove => "Move",
            Operation::FocusStop => "Stop",
        }
    }
}

/// Opens device sessions (ONVIF, or a scripted device in tests)
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Open a session to the device named by `credentials`.
    ///
    /// Implementations authenticate here, so bad credentials fail at this step.
    async fn connect(
        &self,
        credentials: &CameraCredentials,
    ) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// One open session; dropped at the end of the request that created it
#[async_trait]
pub trait DeviceSession: Send + Sync {
    async fn device_information(&self) -> Result<DeviceInformation, DeviceError>;

    async fn profiles(&self) -> Result<Vec<MediaProfile>, DeviceError>;

    async fn ptz_configurations(&self) -> Result<Vec<PtzConfiguration>, DeviceError>;

    async fn system_date_and_time(&self) -> Result<SystemDateTime, DeviceError>;

    async fn video_encoder_configuration(
        &self,
        configuration_token: &str,
    ) -> Result<VideoEncoderConfiguration, DeviceError>;

    async fn stream_uri(&self, profile_token: &str, setup: StreamSetup)
        -> Result<String, DeviceError>;

    async fn continuous_move(&self, profile_token: &str, velocity: Velocity)
        -> Result<(), DeviceError>;

    async fn stop(&self, profile_token: &str) -> Result<(), DeviceError>;

    async fn focus_move(&self, video_source_token: &str, speed: f64) -> Result<(), DeviceError>;

    async fn focus_stop(&self, video_source_token: &str) -> Result<(), DeviceError>;
}

/// Sends one multicast probe and gathers the raw replies
#[async_trait]
pub trait DiscoveryProbe: Send + Sync {
    /// Replies received before `timeout` elapses. An `Err` means the probe never went out.
    async fn probe(&self, scope: &str, timeout: Duration) -> Result<Vec<ProbeMatch>, DeviceError>;
}
