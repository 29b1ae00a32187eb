//! Pairing links.
//!
//! A pairing code can travel inside a URL so that scanning the QR with a camera app opens the
//! right screen:
//!
//! ```text
//! https://syncpair.io/sync/pairing/#&code=<base64url, no padding>&deviceName=<name>
//! ```
//!
//! The code sits in the fragment so it is never sent to the web server.

use base64::Engine;
use url::Url;

use crate::code::PairingCode;
use crate::errors::CodeError;

/// Decode text the user entered: either a bare code or an http(s) pairing link.
pub fn decode_entered(text: &str, link_host: Option<&str>) -> Result<PairingCode, CodeError> {
    let text = text.trim();
    match Url::parse(text) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let link = PairingLink::from_url(&url, link_host)?;
            PairingCode::decode(&link.code)
        }
        _ => PairingCode::decode(text),
    }
}

/// A pairing code carried in a URL, plus the optional name of the device that shared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingLink {
    /// Standard padded base64 code, ready for [`crate::PairingCode::decode`].
    pub code: String,
    pub device_name: Option<String>,
}

impl PairingLink {
    pub fn new(code: impl Into<String>, device_name: Option<String>) -> Self {
        Self {
            code: code.into(),
            device_name,
        }
    }

    /// Parse a pairing URL.
    ///
    /// When `host` is given the URL's host must equal it or end with `.{host}`.
    pub fn from_url(url: &Url, host: Option<&str>) -> Result<Self, CodeError> {
        if let Some(expected) = host {
            let actual = url
                .host_str()
                .ok_or_else(|| CodeError::Malformed("pairing link has no host".into()))?;
            if actual != expected && !actual.ends_with(&format!(".{expected}")) {
                return Err(CodeError::Malformed(format!(
                    "pairing link host {actual} is not {expected}"
                )));
            }
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        if !segments.contains(&"sync") || segments.last() != Some(&"pairing") {
            return Err(CodeError::Malformed("not a pairing link".into()));
        }

        let fragment = url
            .fragment()
            .ok_or_else(|| CodeError::Malformed("pairing link has no fragment".into()))?;

        let mut code = None;
        let mut device_name = None;
        for (key, value) in url::form_urlencoded::parse(fragment.trim_start_matches('&').as_bytes())
        {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "deviceName" => device_name = Some(value.into_owned()),
                _ => {}
            }
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CodeError::Malformed("pairing link has no code".into()))?;

        Ok(Self {
            code: to_standard_base64(&code)?,
            device_name: device_name.filter(|n| !n.is_empty()),
        })
    }

    /// Build a pairing URL under `base`.
    pub fn to_url(&self, base: &Url) -> Result<Url, CodeError> {
        let mut url = base
            .join("sync/pairing/")
            .map_err(|e| CodeError::Encode(e.to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.code)
            .map_err(|e| CodeError::Encode(format!("code is not base64: {e}")))?;
        let url_code = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        let mut fragment = url::form_urlencoded::Serializer::new(String::from("&"));
        fragment.append_pair("code", &url_code);
        if let Some(name) = &self.device_name {
            fragment.append_pair("deviceName", name);
        }
        url.set_fragment(Some(&fragment.finish()));
        Ok(url)
    }
}

/// Re-encode base64url (padded or not) as standard padded base64.
fn to_standard_base64(code: &str) -> Result<String, CodeError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(code.trim_end_matches('='))
        .map_err(|e| CodeError::Malformed(format!("pairing link code is not base64url: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}
