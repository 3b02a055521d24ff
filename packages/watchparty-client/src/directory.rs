//! Party codes and the HTTP existence check.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use watchparty_core::protocol_constants::MAX_ROOM_ID_LEN;

use crate::error::{ClientError, ClientResult};

/// Length of generated party codes.
pub const PARTY_CODE_LEN: usize = 8;

/// Timeout for directory lookups.
const LOOKUP_TIMEOUT_SECS: u64 = 5;

/// A room id as shown to and typed by users.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartyCode(String);

impl PartyCode {
    /// Fresh random code of [`PARTY_CODE_LEN`] upper-case characters.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..PARTY_CODE_LEN].to_ascii_uppercase())
    }

    /// Accepts a user-entered code: trimmed, non-empty, within the room id limit.
    pub fn parse(input: &str) -> ClientResult<Self> {
        let code = input.trim();
        if code.is_empty() {
            return Err(ClientError::InvalidPartyCode("code is empty".into()));
        }
        if code.len() > MAX_ROOM_ID_LEN {
            return Err(ClientError::InvalidPartyCode(format!(
                "code longer than {} bytes",
                MAX_ROOM_ID_LEN
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

/// Looks up parties on the sync server over HTTP.
#[derive(Debug, Clone)]
pub struct PartyDirectory {
    base: Url,
    client: Client,
}

impl PartyDirectory {
    pub fn new(server_url: &str) -> ClientResult<Self> {
        let mut base = Url::parse(server_url).map_err(|e| ClientError::invalid_url(server_url, e))?;
        let scheme = match base.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => {
                return Err(ClientError::invalid_url(
                    server_url,
                    format!("unsupported scheme '{}'", other),
                ))
            }
        };
        base.set_scheme(scheme)
            .map_err(|_| ClientError::invalid_url(server_url, "cannot switch scheme"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { base, client })
    }

    fn party_url(&self, code: &PartyCode) -> ClientResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::invalid_url(self.base.as_str(), "cannot be a base"))?
            .clear()
            .extend(["api", "party", code.as_str()]);
        Ok(url)
    }

    /// Whether a party with `code` currently has anyone in it.
    pub async fn party_exists(&self, code: &PartyCode) -> ClientResult<bool> {
        let url = self.party_url(code)?;
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<ExistsResponse>().await?.exists),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                log::warn!("[Sync] Party lookup for {} returned {}", code, status);
                Err(ClientError::UnexpectedStatus(status.as_u16()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_upper_case_and_fixed_length() {
        let a = PartyCode::generate();
        let b = PartyCode::generate();
        assert_eq!(a.as_str().len(), PARTY_CODE_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn parse_trims_and_rejects_empty() {
        assert_eq!(PartyCode::parse("  AB12  ").unwrap().as_str(), "AB12");
        assert!(matches!(
            PartyCode::parse("   "),
            Err(ClientError::InvalidPartyCode(_))
        ));
        assert!(PartyCode::parse(&"x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
    }

    #[test]
    fn party_url_escapes_code_and_maps_ws_scheme() {
        let directory = PartyDirectory::new("ws://localhost:3000/ignored").unwrap();
        let url = directory
            .party_url(&PartyCode::parse("a b/c").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/party/a%20b%2Fc");
    }
}
