//! Client HTTP du device-server (`/api/genesis-mx`).

use async_trait::async_trait;
use laser_core::{CommandRequest, DeviceApi, DeviceRecord, TransportError};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpDeviceApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeviceApi {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(TransportError::Status {
        status: status.as_u16(),
        url: response.url().to_string(),
    })
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn discover(&self) -> Result<Vec<DeviceRecord>, TransportError> {
        let url = self.url("");
        debug!("[console] GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        check_status(response)?
            .json::<Vec<DeviceRecord>>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn send(&self, request: &CommandRequest) -> Result<(), TransportError> {
        let url = self.url(request.command.as_str());
        let mut query = vec![("serial", request.serial.clone())];
        if let Some(value) = request.value {
            query.push(("value", value.to_string()));
        }
        debug!("[console] PUT {} {:?}", url, query);

        let response = self
            .client
            .put(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        check_status(response)?;
        Ok(())
    }
}
