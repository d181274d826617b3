use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use super::Messenger;
use crate::config::TwilioConfig;
use crate::error::{with_timeout, ClientError, ClientResult};
use crate::users::normalize_address;
use crate::vision::Photo;

const SERVICE: &str = "twilio";
const API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// WhatsApp sender over the Twilio Messages REST resource.
#[derive(Clone)]
pub struct TwilioMessenger {
    http: reqwest::Client,
    config: TwilioConfig,
    timeout: Duration,
}

impl TwilioMessenger {
    pub fn new(config: TwilioConfig, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            config,
            timeout,
        })
    }

    async fn post_message(&self, to: &str, text: &str) -> ClientResult<String> {
        let url = format!("{API_BASE}/Accounts/{}/Messages.json", self.config.account_sid);
        let res = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("From", self.config.from_number.as_str()),
                ("To", to),
                ("Body", text),
            ])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                service: SERVICE,
                status,
                body,
            });
        }
        let msg: MessageResource = res
            .json()
            .await
            .map_err(|e| ClientError::parse(SERVICE, e.to_string()))?;
        Ok(msg.sid)
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    async fn send(&self, to: &str, text: &str) {
        let to = normalize_address(to);
        match with_timeout(SERVICE, self.timeout, self.post_message(&to, text)).await {
            Ok(sid) => tracing::info!(%to, %sid, "message sent"),
            Err(e) => tracing::error!(%to, error = %e, "failed to send message"),
        }
    }
}

/// Downloads inbound media. Twilio media URLs need the account credentials
/// when the account enforces authenticated media access.
#[derive(Clone)]
pub struct MediaFetcher {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl MediaFetcher {
    pub fn new(config: Option<&TwilioConfig>, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials: config.map(|c| (c.account_sid.clone(), c.auth_token.clone())),
            timeout,
        })
    }

    pub async fn fetch(&self, url: &str, content_type: Option<&str>) -> ClientResult<Photo> {
        with_timeout("media", self.timeout, self.download(url, content_type)).await
    }

    async fn download(&self, url: &str, content_type: Option<&str>) -> ClientResult<Photo> {
        let mut req = self.http.get(url);
        if let Some((sid, token)) = &self.credentials {
            req = req.basic_auth(sid, Some(token));
        }
        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                service: "media",
                status,
                body: String::new(),
            });
        }

        let header_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: Bytes = res.bytes().await?;
        if body.is_empty() {
            return Err(ClientError::parse("media", "empty body"));
        }

        Ok(Photo {
            body,
            content_type: content_type
                .map(str::to_string)
                .or(header_type)
                .unwrap_or_else(|| "image/jpeg".into()),
        })
    }
}
