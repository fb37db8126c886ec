//! Message delivery.
//!
//! [`Messenger`] is the seam the pipeline sends through.
//! [`TelegramMessenger`] posts to a channel via the Bot API;
//! [`StdoutMessenger`] prints messages for `--dry-run`.

use std::io::Write;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SendError;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver one formatted message.  Transport and HTTP failures come back
    /// as `Err`, never as a panic, so the pipeline can move on.
    async fn send(&self, text: &str) -> Result<(), SendError>;
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// The Bot API envelope; only what error reporting needs.
#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Decide whether a `sendMessage` reply means the message went out.
fn check_reply(status: u16, body: &str) -> Result<(), SendError> {
    let reply = serde_json::from_str::<ApiReply>(body).ok();
    let ok = (200..300).contains(&status) && reply.as_ref().map_or(true, |r| r.ok);
    if ok {
        return Ok(());
    }
    let description = reply
        .and_then(|r| r.description)
        .unwrap_or_else(|| body.chars().take(200).collect());
    Err(SendError::Rejected {
        status,
        description,
    })
}

pub struct TelegramMessenger {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramMessenger {
    /// `client` should carry the request timeout.
    pub fn new(client: Client, bot_token: &str, chat_id: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: false,
        };

        let resp = self.client.post(&self.endpoint).form(&payload).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        check_reply(status, &body)?;

        debug!(chat_id = %self.chat_id, "message sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stdout (dry run)
// ---------------------------------------------------------------------------

/// Writes each message to stdout, separated by a rule.
#[derive(Debug, Default)]
pub struct StdoutMessenger;

#[async_trait]
impl Messenger for StdoutMessenger {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{text}")?;
        writeln!(out, "{}", "-".repeat(40))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ok_reply() {
        assert!(check_reply(200, r#"{"ok":true,"result":{"message_id":7}}"#).is_ok());
    }

    #[test]
    fn rejects_api_error_with_description() {
        let err = check_reply(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#,
        )
        .unwrap_err();
        match err {
            SendError::Rejected { status, description } => {
                assert_eq!(status, 400);
                assert!(description.contains("can't parse entities"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ok_false_on_2xx_is_still_a_failure() {
        assert!(check_reply(200, r#"{"ok":false,"description":"nope"}"#).is_err());
    }

    #[test]
    fn non_json_error_body_is_truncated_into_description() {
        let body = "x".repeat(500);
        match check_reply(502, &body).unwrap_err() {
            SendError::Rejected { description, .. } => assert_eq!(description.len(), 200),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn form_payload_fields() {
        let payload = SendMessage {
            chat_id: "@hn_jobs",
            text: "<b>t</b>",
            parse_mode: "HTML",
            disable_web_page_preview: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["chat_id"], "@hn_jobs");
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["disable_web_page_preview"], false);
    }

    #[test]
    fn endpoint_embeds_token() {
        let m = TelegramMessenger::new(Client::new(), "123:abc", "@chan");
        assert_eq!(m.endpoint, "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn stdout_messenger_succeeds() {
        assert!(StdoutMessenger.send("hello").await.is_ok());
    }
}
