//! Supported hosting backends and their per-backend upload contract

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::ForwardError;

/// A public file host uploads can be forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// pomf.lain.la, answers with a JSON list of files
    Pomf,
    /// catbox.moe, permanent direct links
    Catbox,
    /// litterbox.catbox.moe, links expire after the requested time
    Litterbox,
}

/// Per-request values some backends put into the form
#[derive(Debug, Clone, Default)]
pub struct ForwardOptions {
    /// Catbox account hash (`userhash`)
    pub auth_token: Option<String>,
    /// Litterbox retention, e.g. `1h`, `12h`, `24h`, `72h`
    pub ttl: String,
}

impl Destination {
    pub const ALL: [Destination; 3] = [Destination::Pomf, Destination::Catbox, Destination::Litterbox];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pomf => "pomf",
            Self::Catbox => "catbox",
            Self::Litterbox => "litterbox",
        }
    }

    /// Name of the multipart field carrying the file
    pub fn file_field(&self) -> &'static str {
        match self {
            Self::Pomf => "files[]",
            Self::Catbox | Self::Litterbox => "fileToUpload",
        }
    }

    /// Text fields written before the file part, in order
    pub fn extra_fields(&self, options: &ForwardOptions) -> Vec<(&'static str, String)> {
        match self {
            Self::Pomf => Vec::new(),
            Self::Catbox => {
                let mut fields = vec![("reqtype", "fileupload".to_string())];
                if let Some(token) = options.auth_token.as_deref().filter(|t| !t.is_empty()) {
                    fields.push(("userhash", token.to_string()));
                }
                fields
            }
            Self::Litterbox => vec![
                ("reqtype", "fileupload".to_string()),
                ("time", options.ttl.clone()),
            ],
        }
    }

    /// Litterbox links self-destruct, so they are never cached
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::Litterbox)
    }

    /// Turn a 2xx response body into the public URL of the upload
    pub fn parse_response(&self, body: &str) -> Result<String, ForwardError> {
        match self {
            Self::Pomf => parse_pomf(body),
            Self::Catbox | Self::Litterbox => {
                let url = body.trim();
                if url.is_empty() {
                    return Err(ForwardError::InvalidResponse {
                        destination: *self,
                        message: "empty response body".to_string(),
                    });
                }
                Ok(url.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PomfResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    files: Vec<PomfFile>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PomfFile {
    url: String,
}

fn parse_pomf(body: &str) -> Result<String, ForwardError> {
    let response: PomfResponse =
        serde_json::from_str(body).map_err(|e| ForwardError::InvalidResponse {
            destination: Destination::Pomf,
            message: format!("failed to parse response: {}", e),
        })?;

    if !response.success {
        return Err(ForwardError::BackendFailure {
            destination: Destination::Pomf,
            message: response.error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    response
        .files
        .into_iter()
        .next()
        .map(|file| file.url)
        .ok_or_else(|| ForwardError::InvalidResponse {
            destination: Destination::Pomf,
            message: "response missing file URL".to_string(),
        })
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name that did not match any supported backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("destination '{0}' is not supported")]
pub struct UnsupportedDestination(pub String);

impl FromStr for Destination {
    type Err = UnsupportedDestination;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pomf" => Ok(Self::Pomf),
            "catbox" => Ok(Self::Catbox),
            "litterbox" => Ok(Self::Litterbox),
            other => Err(UnsupportedDestination(other.to_string())),
        }
    }
}
