/// SOAP 1.2 envelopes, WS-Security headers and fault decoding for ONVIF services

use crate::xml::{self, Element};
use base64::Engine;
use quick_xml::escape::escape;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::debug;

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

pub const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const NS_PTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const NS_IMAGING: &str = "http://www.onvif.org/ver20/imaging/wsdl";
pub const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";

const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_DIGEST: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const BASE64_BINARY: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// WS-Security UsernameToken with a password digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    pub digest: String,
    pub nonce: String,
    pub created: String,
}

impl UsernameToken {
    /// Fresh token with a random 16-byte nonce and the current UTC time
    pub fn new(username: &str, password: &str) -> Self {
        let nonce: [u8; 16] = rand::random();
        let created = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        Self::with_nonce(username, password, &nonce, &created)
    }

    /// Digest = Base64(SHA1(nonce + created + password))
    pub fn with_nonce(username: &str, password: &str, nonce: &[u8], created: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(nonce);
        hasher.update(created.as_bytes());
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();

        let b64 = base64::engine::general_purpose::STANDARD;
        Self {
            username: username.to_string(),
            digest: b64.encode(digest),
            nonce: b64.encode(nonce),
            created: created.to_string(),
        }
    }

    pub fn header(&self) -> String {
        format!(
            r#"<s:Header>
    <wsse:Security xmlns:wsse="{wsse}" xmlns:wsu="{wsu}" s:mustUnderstand="true">
      <wsse:UsernameToken>
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="{digest_type}">{digest}</wsse:Password>
        <wsse:Nonce EncodingType="{nonce_type}">{nonce}</wsse:Nonce>
        <wsu:Created>{created}</wsu:Created>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>"#,
            wsse = NS_WSSE,
            wsu = NS_WSU,
            username = escape(self.username.as_str()),
            digest_type = PASSWORD_DIGEST,
            digest = self.digest,
            nonce_type = BASE64_BINARY,
            nonce = self.nonce,
            created = self.created,
        )
    }
}

/// Wrap a body fragment in a SOAP 1.2 envelope declaring the ONVIF namespaces
pub fn envelope(security: Option<&UsernameToken>, body: &str) -> String {
    let header = security.map(UsernameToken::header).unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="{tds}"
            xmlns:trt="{trt}"
            xmlns:tptz="{tptz}"
            xmlns:timg="{timg}"
            xmlns:tt="{tt}">
  {header}
  <s:Body>
    {body}
  </s:Body>
</s:Envelope>"#,
        tds = NS_DEVICE,
        trt = NS_MEDIA,
        tptz = NS_PTZ,
        timg = NS_IMAGING,
        tt = NS_SCHEMA,
        header = header,
        body = body,
    )
}

/// Escape a caller-supplied token for use as element text
pub fn text(value: &str) -> String {
    escape(value).into_owned()
}

/// Reduce a SOAP Fault to a single diagnostic line.
///
/// Subcode values come first (outermost to innermost), then the reason, then
/// any detail text, joined with ": ". Both SOAP 1.2 and 1.1 layouts are read.
pub fn fault_diagnostic(root: &Element) -> Option<String> {
    let fault = root.find("Fault")?;
    let mut parts: Vec<String> = Vec::new();

    if let Some(code) = fault.child("Code") {
        let mut subcode = code.child("Subcode");
        while let Some(node) = subcode {
            if let Some(value) = node.child_text("Value") {
                parts.push(value);
            }
            subcode = node.child("Subcode");
        }
        if parts.is_empty() {
            if let Some(value) = code.child_text("Value") {
                parts.push(value);
            }
        }
    } else if let Some(code) = fault.child_text("faultcode") {
        parts.push(code);
    }

    let reason = fault
        .child("Reason")
        .and_then(|r| r.child_text("Text"))
        .or_else(|| fault.child_text("faultstring"));
    if let Some(reason) = reason {
        parts.push(reason);
    }

    let detail = fault
        .child("Detail")
        .or_else(|| fault.child("detail"))
        .map(Element::deep_text)
        .filter(|t| !t.is_empty());
    if let Some(detail) = detail {
        parts.push(detail);
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(": "))
    }
}

/// Diagnostic for a failed HTTP exchange: the fault text when the body is a
/// SOAP Fault, otherwise `HTTP <status> <reason>: <body>`.
pub fn error_diagnostic(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(root) = xml::parse(body) {
        if let Some(diagnostic) = fault_diagnostic(&root) {
            return diagnostic;
        }
    }
    format!(
        "HTTP {} {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.trim()
    )
}

/// Build the shared HTTP client used for all SOAP calls
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// POST an envelope and return the raw reply body and status
pub async fn post(
    client: &reqwest::Client,
    url: &str,
    action: &str,
    envelope: String,
) -> Result<(reqwest::StatusCode, String), reqwest::Error> {
    debug!(url = %url, action = %action, "Sending SOAP request");

    let response = client
        .post(url)
        .header("Content-Type", SOAP_CONTENT_TYPE)
        .body(envelope)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    debug!(action = %action, status = %status, "SOAP response received");
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_digest() {
        let nonce = [0u8; 16];
        let token = UsernameToken::with_nonce("admin", "password1", &nonce, "2024-01-01T00:00:00Z");

        let mut hasher = Sha1::new();
        hasher.update(nonce);
        hasher.update(b"2024-01-01T00:00:00Z");
        hasher.update(b"password1");
        let expected = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());

        assert_eq!(token.digest, expected);
        assert_eq!(token.nonce, "AAAAAAAAAAAAAAAAAAAAAA==");
    }

    #[test]
    fn test_fresh_tokens_differ() {
        let a = UsernameToken::new("admin", "password1");
        let b = UsernameToken::new("admin", "password1");
        assert_ne!(a.nonce, b.nonce);
        assert!(a.created.ends_with('Z'));
    }

    #[test]
    fn test_envelope_contains_header_and_body() {
        let token = UsernameToken::with_nonce("ad<min", "password1", b"n", "2024-01-01T00:00:00Z");
        let doc = envelope(Some(&token), "<tds:GetDeviceInformation/>");
        assert!(doc.contains("<wsse:Username>ad&lt;min</wsse:Username>"));
        assert!(doc.contains("PasswordDigest"));
        assert!(doc.contains("<tds:GetDeviceInformation/>"));
        assert!(xml::parse(&doc).is_ok());

        let bare = envelope(None, "<tds:GetSystemDateAndTime/>");
        assert!(!bare.contains("Security"));
    }

    #[test]
    fn test_soap12_fault() {
        let body = r#"<?xml version="1.0"?>
<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" xmlns:ter="http://www.onvif.org/ver10/error">
  <env:Body>
    <env:Fault>
      <env:Code>
        <env:Value>env:Sender</env:Value>
        <env:Subcode>
          <env:Value>ter:NotAuthorized</env:Value>
        </env:Subcode>
      </env:Code>
      <env:Reason><env:Text xml:lang="en">Sender not Authorized</env:Text></env:Reason>
      <env:Detail><env:Text>Invalid username or password</env:Text></env:Detail>
    </env:Fault>
  </env:Body>
</env:Envelope>"#;
        let diagnostic = error_diagnostic(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(
            diagnostic,
            "ter:NotAuthorized: Sender not Authorized: Invalid username or password"
        );
    }

    #[test]
    fn test_soap11_fault() {
        let body = r#"<Envelope><Body><Fault><faultcode>SOAP-ENV:Client</faultcode><faultstring>Profile token does not exist</faultstring></Fault></Body></Envelope>"#;
        let root = xml::parse(body).unwrap();
        assert_eq!(
            fault_diagnostic(&root).as_deref(),
            Some("SOAP-ENV:Client: Profile token does not exist")
        );
    }

    #[test]
    fn test_non_soap_error_body() {
        let diagnostic = error_diagnostic(reqwest::StatusCode::UNAUTHORIZED, "Unauthorized\n");
        assert_eq!(diagnostic, "HTTP 401 Unauthorized: Unauthorized");
    }
}
