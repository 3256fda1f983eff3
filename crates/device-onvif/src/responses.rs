/// Decoding of ONVIF reply bodies into core types
///
/// Every function takes the parsed envelope root. Missing optional elements
/// become `None`; only the element that carries the answer itself is required.

use crate::xml::Element;
use camgate_core::{
    DeviceInformation, MediaProfile, PtzConfiguration, Resolution, SystemDateTime, UtcDateTime,
    VideoEncoderConfiguration, UNKNOWN,
};

/// Service endpoints advertised by GetCapabilities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAddresses {
    pub media: Option<String>,
    pub ptz: Option<String>,
    pub imaging: Option<String>,
}

fn required<'a>(root: &'a Element, name: &str) -> Result<&'a Element, String> {
    root.find(name)
        .ok_or_else(|| format!("Malformed reply: missing {} element", name))
}

pub fn capabilities(root: &Element) -> Result<ServiceAddresses, String> {
    let caps = required(root, "Capabilities")?;
    let xaddr = |service: &str| {
        caps.child(service)
            .and_then(|s| s.child_text("XAddr"))
    };
    Ok(ServiceAddresses {
        media: xaddr("Media"),
        ptz: xaddr("PTZ"),
        imaging: xaddr("Imaging"),
    })
}

pub fn device_information(root: &Element) -> Result<DeviceInformation, String> {
    let reply = required(root, "GetDeviceInformationResponse")?;
    let field = |name: &str| reply.child_text(name).unwrap_or_else(|| UNKNOWN.to_string());
    Ok(DeviceInformation {
        manufacturer: field("Manufacturer"),
        model: field("Model"),
        firmware_version: field("FirmwareVersion"),
        serial_number: field("SerialNumber"),
        hardware_id: field("HardwareId"),
    })
}

pub fn profiles(root: &Element) -> Result<Vec<MediaProfile>, String> {
    let reply = required(root, "GetProfilesResponse")?;
    Ok(reply
        .children_named("Profiles")
        .map(|p| MediaProfile {
            token: p.attribute("token").unwrap_or_default().to_string(),
            name: p.child_text("Name"),
            video_source_token: p
                .child("VideoSourceConfiguration")
                .and_then(|c| c.child_text("SourceToken")),
            video_encoder_token: p
                .child("VideoEncoderConfiguration")
                .and_then(|c| c.attribute("token"))
                .map(str::to_string),
        })
        .collect())
}

pub fn ptz_configurations(root: &Element) -> Result<Vec<PtzConfiguration>, String> {
    let reply = required(root, "GetConfigurationsResponse")?;
    Ok(reply
        .children_named("PTZConfiguration")
        .map(|c| PtzConfiguration {
            token: c.attribute("token").unwrap_or_default().to_string(),
            name: c.child_text("Name"),
        })
        .collect())
}

pub fn system_date_and_time(root: &Element) -> Result<SystemDateTime, String> {
    let reply = required(root, "SystemDateAndTime")?;
    let utc = reply.child("UTCDateTime").and_then(|utc| {
        let date = utc.child("Date")?;
        let time = utc.child("Time")?;
        Some(UtcDateTime {
            year: number(date, "Year")?,
            month: number(date, "Month")?,
            day: number(date, "Day")?,
            hour: number(time, "Hour")?,
            minute: number(time, "Minute")?,
            second: number(time, "Second")?,
        })
    });
    Ok(SystemDateTime { utc })
}

pub fn video_encoder_configuration(root: &Element) -> Result<VideoEncoderConfiguration, String> {
    let reply = required(root, "GetVideoEncoderConfigurationResponse")?;
    let config = reply
        .child("Configuration")
        .ok_or_else(|| "Malformed reply: missing Configuration element".to_string())?;

    let resolution = config.child("Resolution").and_then(|r| {
        Some(Resolution {
            width: number(r, "Width")?,
            height: number(r, "Height")?,
        })
    });
    let rate_control = config.child("RateControl");

    Ok(VideoEncoderConfiguration {
        encoding: config.child_text("Encoding"),
        resolution,
        frame_rate_limit: rate_control.and_then(|r| number(r, "FrameRateLimit")),
        bitrate_limit: rate_control.and_then(|r| number(r, "BitrateLimit")),
    })
}

pub fn stream_uri(root: &Element) -> Result<String, String> {
    let reply = required(root, "GetStreamUriResponse")?;
    reply
        .path(&["MediaUri", "Uri"])
        .map(|u| u.text.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "Malformed reply: missing MediaUri/Uri element".to_string())
}

/// Any reply carrying the named response element counts as success
pub fn acknowledged(root: &Element, response: &str) -> Result<(), String> {
    required(root, response).map(|_| ())
}

fn number<T: std::str::FromStr>(parent: &Element, name: &str) -> Option<T> {
    parent.child_text(name)?.parse().ok()
}
