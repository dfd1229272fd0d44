//! ACS connection-string parsing and HMAC-SHA256 request signing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("connection string has no {0} segment")]
    MissingSegment(&'static str),
    #[error("access key is not valid base64")]
    BadKey,
}

/// Parsed `endpoint=...;accesskey=...` ACS connection string.
#[derive(Debug, Clone)]
pub struct AcsCredentials {
    pub endpoint: String,
    pub access_key: String,
}

impl AcsCredentials {
    /// Host portion of the endpoint, as signed into each request.
    pub fn host(&self) -> &str {
        self.endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }
}

pub fn parse_connection_string(raw: &str) -> Result<AcsCredentials, AuthError> {
    let mut endpoint = None;
    let mut access_key = None;

    for segment in raw.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "endpoint" => endpoint = Some(value.trim().trim_end_matches('/').to_string()),
            "accesskey" => access_key = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Ok(AcsCredentials {
        endpoint: endpoint.ok_or(AuthError::MissingSegment("endpoint"))?,
        access_key: access_key.ok_or(AuthError::MissingSegment("accesskey"))?,
    })
}

/// Header values for one signed request.
#[derive(Debug)]
pub struct SignedHeaders {
    pub date: String,
    pub content_hash: String,
    pub authorization: String,
}

/// Sign a request with the ACS shared-key scheme: the signature covers the
/// verb, the path with query, and `date;host;content-sha256`.
pub fn sign_request(
    access_key: &str,
    method: &str,
    path_and_query: &str,
    host: &str,
    body: &[u8],
) -> Result<SignedHeaders, AuthError> {
    let date = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    sign_with_date(access_key, method, path_and_query, host, body, date)
}

fn sign_with_date(
    access_key: &str,
    method: &str,
    path_and_query: &str,
    host: &str,
    body: &[u8],
    date: String,
) -> Result<SignedHeaders, AuthError> {
    let content_hash = BASE64.encode(Sha256::digest(body));
    let string_to_sign = format!("{method}\n{path_and_query}\n{date};{host};{content_hash}");

    let key = BASE64.decode(access_key).map_err(|_| AuthError::BadKey)?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| AuthError::BadKey)?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(SignedHeaders {
        authorization: format!(
            "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"
        ),
        date,
        content_hash,
    })
}
