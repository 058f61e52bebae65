use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{EnrouteError, Result};
use crate::types::{AirportCode, AirportInfo, FlightRecord};

use super::{AirportInfoSource, FlightSource};

#[derive(Deserialize)]
struct FlightsResponse {
    #[serde(default)]
    flights: Vec<FlightRecord>,
}

/// JSON-over-HTTP provider client.
///
/// - `GET {base}/airports/{code}` → [`AirportInfo`]
/// - `GET {base}/airports/{code}/flights?max={limit}` → `{"flights": [...]}`
#[derive(Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("enroute/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "provider request");
        let mut req = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            req = req.header("x-apikey", key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EnrouteError::Transport(format!("GET {url} returned {status}")));
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl AirportInfoSource for HttpProvider {
    async fn fetch_airport_info(&self, code: &AirportCode) -> Result<AirportInfo> {
        self.get_json(&format!("/airports/{code}"), &[]).await
    }
}

#[async_trait]
impl FlightSource for HttpProvider {
    async fn fetch_flights(&self, code: &AirportCode, limit: usize) -> Result<Vec<FlightRecord>> {
        let resp: FlightsResponse = self
            .get_json(
                &format!("/airports/{code}/flights"),
                &[("max", limit.to_string())],
            )
            .await?;
        Ok(resp.flights)
    }
}
