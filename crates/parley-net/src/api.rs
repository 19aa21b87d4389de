//! REST client for the chat backend.
//!
//! Every call carries the session token as a bearer credential. A 401
//! response maps to [`NetError::Unauthorized`] so the caller can invalidate
//! the session; any other failure is transient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use parley_shared::protocol::{ChannelNameRequest, NewMessageRequest};
use parley_shared::types::{Channel, ChannelId, Message};

use crate::error::NetError;

/// Backend operations used by the synchronization controller.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_channels(&self, token: &str) -> Result<Vec<Channel>, NetError>;

    async fn fetch_messages(&self, token: &str) -> Result<Vec<Message>, NetError>;

    async fn send_message(
        &self,
        token: &str,
        channel_id: &ChannelId,
        username: &str,
        body: &str,
    ) -> Result<Message, NetError>;

    async fn create_channel(&self, token: &str, name: &str) -> Result<Channel, NetError>;

    async fn rename_channel(
        &self,
        token: &str,
        id: &ChannelId,
        name: &str,
    ) -> Result<Channel, NetError>;

    async fn remove_channel(&self, token: &str, id: &ChannelId) -> Result<(), NetError>;
}

/// [`ChatApi`] over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NetError> {
        // Reject a malformed base URL up front.
        url::Url::parse(base_url)?;

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, NetError> {
        let resp = check_status(resp)?;
        Ok(resp.json::<T>().await?)
    }
}

fn check_status(resp: Response) -> Result<Response, NetError> {
    status_to_result(resp.status())?;
    Ok(resp)
}

fn status_to_result(status: StatusCode) -> Result<(), NetError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(NetError::Unauthorized);
    }
    if !status.is_success() {
        return Err(NetError::Status(status.as_u16()));
    }
    Ok(())
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_channels(&self, token: &str) -> Result<Vec<Channel>, NetError> {
        debug!("GET channels");
        let resp = self
            .client
            .get(self.url("channels"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn fetch_messages(&self, token: &str) -> Result<Vec<Message>, NetError> {
        debug!("GET messages");
        let resp = self
            .client
            .get(self.url("messages"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn send_message(
        &self,
        token: &str,
        channel_id: &ChannelId,
        username: &str,
        body: &str,
    ) -> Result<Message, NetError> {
        debug!(channel = %channel_id, "POST message");
        let resp = self
            .client
            .post(self.url("messages"))
            .bearer_auth(token)
            .json(&NewMessageRequest {
                body,
                channel_id,
                username,
            })
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn create_channel(&self, token: &str, name: &str) -> Result<Channel, NetError> {
        debug!(name = %name, "POST channel");
        let resp = self
            .client
            .post(self.url("channels"))
            .bearer_auth(token)
            .json(&ChannelNameRequest { name })
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn rename_channel(
        &self,
        token: &str,
        id: &ChannelId,
        name: &str,
    ) -> Result<Channel, NetError> {
        debug!(channel = %id, name = %name, "PATCH channel");
        let resp = self
            .client
            .patch(self.url(&format!("channels/{id}")))
            .bearer_auth(token)
            .json(&ChannelNameRequest { name })
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn remove_channel(&self, token: &str, id: &ChannelId) -> Result<(), NetError> {
        debug!(channel = %id, "DELETE channel");
        let resp = self
            .client
            .delete(self.url(&format!("channels/{id}")))
            .bearer_auth(token)
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let api = HttpChatApi::new("http://localhost:5001/api/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("channels"), "http://localhost:5001/api/v1/channels");
        assert_eq!(api.url("/channels/3"), "http://localhost:5001/api/v1/channels/3");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpChatApi::new("not a url", Duration::from_secs(1)),
            Err(NetError::Url(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert!(status_to_result(StatusCode::OK).is_ok());
        assert!(status_to_result(StatusCode::UNAUTHORIZED).unwrap_err().is_auth());
        assert!(matches!(
            status_to_result(StatusCode::INTERNAL_SERVER_ERROR),
            Err(NetError::Status(500))
        ));
    }
}
