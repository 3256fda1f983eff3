/// ONVIF device sessions over SOAP/HTTP

use crate::responses::{self, ServiceAddresses};
use crate::soap::{self, UsernameToken};
use crate::xml::{self, Element};
use async_trait::async_trait;
use camgate_core::{
    CameraCredentials, DeviceConnector, DeviceError, DeviceInformation, DeviceSession,
    MediaProfile, Operation, PtzConfiguration, StreamSetup, SystemDateTime, Velocity,
    VideoEncoderConfiguration,
};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info};

const DEVICE_PATH: &str = "/onvif/device_service";
const MEDIA_PATH: &str = "/onvif/media_service";
const PTZ_PATH: &str = "/onvif/ptz_service";
const IMAGING_PATH: &str = "/onvif/imaging_service";

/// Opens authenticated sessions to ONVIF devices
#[derive(Debug, Clone)]
pub struct OnvifConnector {
    client: reqwest::Client,
    port: u16,
    scheme_host_override: Option<String>,
}

impl OnvifConnector {
    /// `timeout` bounds every HTTP exchange made by sessions from this connector
    pub fn new(port: u16, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: soap::http_client(timeout)?,
            port,
            scheme_host_override: None,
        })
    }

    /// Send every request to `base` (e.g. `http://127.0.0.1:8080`) instead of the camera address
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.scheme_host_override = Some(base.into());
        self
    }

    fn base_url(&self, address: Ipv4Addr) -> String {
        match &self.scheme_host_override {
            Some(base) => base.trim_end_matches('/').to_string(),
            None if self.port == 80 => format!("http://{}", address),
            None => format!("http://{}:{}", address, self.port),
        }
    }
}

#[async_trait]
impl DeviceConnector for OnvifConnector {
    async fn connect(
        &self,
        credentials: &CameraCredentials,
    ) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let base = self.base_url(credentials.address);
        let device_url = format!("{}{}", base, DEVICE_PATH);
        info!(url = %device_url, username = %credentials.username, "Connecting to ONVIF device");

        let session = OnvifSession {
            client: self.client.clone(),
            username: credentials.username.clone(),
            password: credentials.password().to_string(),
            device_url,
            services: ServiceAddresses::default(),
            base,
        };

        let reply = session
            .exchange(
                &session.device_url,
                "GetCapabilities",
                "<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>",
            )
            .await
            .map_err(DeviceError::connect)?;
        let services = responses::capabilities(&reply).map_err(DeviceError::connect)?;
        debug!(?services, "Device capabilities");

        Ok(Box::new(OnvifSession { services, ..session }))
    }
}

/// One authenticated device session. Each request gets a fresh WS-Security token.
pub struct OnvifSession {
    client: reqwest::Client,
    username: String,
    password: String,
    base: String,
    device_url: String,
    services: ServiceAddresses,
}

impl OnvifSession {
    fn media_url(&self) -> String {
        self.service_url(self.services.media.as_deref(), MEDIA_PATH)
    }

    fn ptz_url(&self) -> String {
        self.service_url(self.services.ptz.as_deref(), PTZ_PATH)
    }

    fn imaging_url(&self) -> String {
        self.service_url(self.services.imaging.as_deref(), IMAGING_PATH)
    }

    fn service_url(&self, advertised: Option<&str>, fallback: &str) -> String {
        advertised
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}", self.base, fallback))
    }

    /// One SOAP round trip. The error is the raw diagnostic text.
    async fn exchange(&self, url: &str, action: &str, body: &str) -> Result<Element, String> {
        let token = UsernameToken::new(&self.username, &self.password);
        let envelope = soap::envelope(Some(&token), body);

        let (status, reply) = soap::post(&self.client, url, action, envelope)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("{} timed out: {}", action, e)
                } else {
                    e.to_string()
                }
            })?;

        if !status.is_success() {
            return Err(soap::error_diagnostic(status, &reply));
        }

        let root = xml::parse(&reply).map_err(|e| format!("Invalid {} reply: {}", action, e))?;
        // Some firmwares answer faults with 200
        if let Some(fault) = soap::fault_diagnostic(&root) {
            return Err(fault);
        }
        Ok(root)
    }

    async fn call<T>(
        &self,
        url: &str,
        operation: Operation,
        body: &str,
        decode: fn(&Element) -> Result<T, String>,
    ) -> Result<T, DeviceError> {
        let root = self
            .exchange(url, operation.action(), body)
            .await
            .map_err(DeviceError::operation)?;
        decode(&root).map_err(DeviceError::operation)
    }
}

#[async_trait]
impl DeviceSession for OnvifSession {
    async fn device_information(&self) -> Result<DeviceInformation, DeviceError> {
        self.call(
            &self.device_url,
            Operation::GetDeviceInformation,
            "<tds:GetDeviceInformation/>",
            responses::device_information,
        )
        .await
    }

    async fn profiles(&self) -> Result<Vec<MediaProfile>, DeviceError> {
        self.call(
            &self.media_url(),
            Operation::GetProfiles,
            "<trt:GetProfiles/>",
            responses::profiles,
        )
        .await
    }

    async fn ptz_configurations(&self) -> Result<Vec<PtzConfiguration>, DeviceError> {
        self.call(
            &self.ptz_url(),
            Operation::GetConfigurations,
            "<tptz:GetConfigurations/>",
            responses::ptz_configurations,
        )
        .await
    }

    async fn system_date_and_time(&self) -> Result<SystemDateTime, DeviceError> {
        self.call(
            &self.device_url,
            Operation::GetSystemDateAndTime,
            "<tds:GetSystemDateAndTime/>",
            responses::system_date_and_time,
        )
        .await
    }

    async fn video_encoder_configuration(
        &self,
        configuration_token: &str,
    ) -> Result<VideoEncoderConfiguration, DeviceError> {
        let body = format!(
            concat!(
                "<trt:GetVideoEncoderConfiguration>",
                "<trt:ConfigurationToken>{}</trt:ConfigurationToken>",
                "</trt:GetVideoEncoderConfiguration>",
            ),
            soap::text(configuration_token)
        );
        self.call(
            &self.media_url(),
            Operation::GetVideoEncoderConfiguration,
            &body,
            responses::video_encoder_configuration,
        )
        .await
    }

    async fn stream_uri(
        &self,
        profile_token: &str,
        setup: StreamSetup,
    ) -> Result<String, DeviceError> {
        let body = format!(
            r#"<trt:GetStreamUri>
      <trt:StreamSetup>
        <tt:Stream>{}</tt:Stream>
        <tt:Transport><tt:Protocol>{}</tt:Protocol></tt:Transport>
      </trt:StreamSetup>
      <trt:ProfileToken>{}</trt:ProfileToken>
    </trt:GetStreamUri>"#,
            setup.stream,
            setup.protocol,
            soap::text(profile_token)
        );
        self.call(
            &self.media_url(),
            Operation::GetStreamUri,
            &body,
            responses::stream_uri,
        )
        .await
    }

    async fn continuous_move(
        &self,
        profile_token: &str,
        velocity: Velocity,
    ) -> Result<(), DeviceError> {
        let body = format!(
            r#"<tptz:ContinuousMove>
      <tptz:ProfileToken>{}</tptz:ProfileToken>
      <tptz:Velocity>
        <tt:PanTilt x="{}" y="{}"/>
        <tt:Zoom x="{}"/>
      </tptz:Velocity>
    </tptz:ContinuousMove>"#,
            soap::text(profile_token),
            velocity.pan,
            velocity.tilt,
            velocity.zoom
        );
        self.call(&self.ptz_url(), Operation::ContinuousMove, &body, |root| {
            responses::acknowledged(root, "ContinuousMoveResponse")
        })
        .await
    }

    async fn stop(&self, profile_token: &str) -> Result<(), DeviceError> {
        let body = format!(
            r#"<tptz:Stop>
      <tptz:ProfileToken>{}</tptz:ProfileToken>
      <tptz:PanTilt>true</tptz:PanTilt>
      <tptz:Zoom>true</tptz:Zoom>
    </tptz:Stop>"#,
            soap::text(profile_token)
        );
        self.call(&self.ptz_url(), Operation::Stop, &body, |root| {
            responses::acknowledged(root, "StopResponse")
        })
        .await
    }

    async fn focus_move(&self, video_source_token: &str, speed: f64) -> Result<(), DeviceError> {
        let body = format!(
            r#"<timg:Move>
      <timg:VideoSourceToken>{}</timg:VideoSourceToken>
      <timg:Focus>
        <tt:Continuous><tt:Speed>{}</tt:Speed></tt:Continuous>
      </timg:Focus>
    </timg:Move>"#,
            soap::text(video_source_token),
            speed
        );
        self.call(&self.imaging_url(), Operation::FocusMove, &body, |root| {
            responses::acknowledged(root, "MoveResponse")
        })
        .await
    }

    async fn focus_stop(&self, video_source_token: &str) -> Result<(), DeviceError> {
        let body = format!(
            "<timg:Stop><timg:VideoSourceToken>{}</timg:VideoSourceToken></timg:Stop>",
            soap::text(video_source_token)
        );
        self.call(&self.imaging_url(), Operation::FocusStop, &body, |root| {
            responses::acknowledged(root, "StopResponse")
        })
        .await
    }
}
