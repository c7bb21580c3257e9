//! Sending replies through the Zoho Desk API
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::models::TicketId;

/// Reply validation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply content is empty")]
    EmptyContent,
}

/// A reply ready to be posted on a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    pub ticket_id: TicketId,
    pub channel: String,
    pub content: String,
}

/// Anything that can deliver a reply to the ticketing system
pub trait ReplySender: Send + Sync {
    fn send_reply(&self, reply: &OutgoingReply) -> Result<()>;
}

/// Body of `POST /api/v1/tickets/{id}/sendReply`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendReplyBody<'a> {
    channel: &'a str,
    content: &'a str,
    content_type: &'static str,
}

/// Zoho Desk REST client
///
/// The OAuth access token is issued elsewhere; this client only presents it.
pub struct ZohoDeskClient {
    base_url: Url,
    org_id: String,
    access_token: String,
}

impl ZohoDeskClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://desk.zoho.com/";

    pub fn new(base_url: &str, org_id: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid Zoho Desk URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            org_id: org_id.into(),
            access_token: access_token.into(),
        })
    }

    /// Endpoint for replying on a ticket
    pub fn reply_url(&self, ticket_id: &TicketId) -> Result<Url> {
        let path = format!(
            "api/v1/tickets/{}/sendReply",
            urlencoding::encode(ticket_id.as_str())
        );
        self.base_url
            .join(&path)
            .context("Failed to build reply URL")
    }
}

impl ReplySender for ZohoDeskClient {
    fn send_reply(&self, reply: &OutgoingReply) -> Result<()> {
        let url = self.reply_url(&reply.ticket_id)?;
        let body = SendReplyBody {
            channel: &reply.channel,
            content: &reply.content,
            content_type: "plainText",
        };

        ureq::post(url.as_str())
            .header("Authorization", &format!("Zoho-oauthtoken {}", self.access_token))
            .header("orgId", &self.org_id)
            .send_json(&body)
            .with_context(|| format!("Failed to send reply on ticket {}", reply.ticket_id))?;

        Ok(())
    }
}

/// Validates replies and hands them to a [`ReplySender`]
pub struct ReplyHandler {
    sender: Arc<dyn ReplySender>,
}

impl ReplyHandler {
    pub fn new(sender: Arc<dyn ReplySender>) -> Self {
        Self { sender }
    }

    /// Post a reply on a ticket. Blank content is rejected before any request is made.
    pub fn send_reply(&self, ticket_id: &TicketId, content: &str, channel: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ReplyError::EmptyContent.into());
        }

        info!("Sending reply on ticket {} via {}", ticket_id, channel);
        self.sender.send_reply(&OutgoingReply {
            ticket_id: ticket_id.clone(),
            channel: channel.to_string(),
            content: content.to_string(),
        })?;
        info!("Reply sent on ticket {}", ticket_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<OutgoingReply>>,
    }

    impl ReplySender for RecordingSender {
        fn send_reply(&self, reply: &OutgoingReply) -> Result<()> {
            self.sent.lock().unwrap().push(reply.clone());
            Ok(())
        }
    }

    #[test]
    fn test_reply_url() {
        let client = ZohoDeskClient::new("https://desk.zoho.eu", "org", "token").unwrap();
        let url = client.reply_url(&TicketId::new("12 34")).unwrap();
        assert_eq!(url.as_str(), "https://desk.zoho.eu/api/v1/tickets/12%2034/sendReply");
    }

    #[test]
    fn test_body_shape() {
        let body = SendReplyBody {
            channel: "EMAIL",
            content: "Hi",
            content_type: "plainText",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contentType"], "plainText");
        assert_eq!(json["channel"], "EMAIL");
    }

    #[test]
    fn test_blank_reply_rejected() {
        let sender = Arc::new(RecordingSender::default());
        let handler = ReplyHandler::new(sender.clone());

        let err = handler
            .send_reply(&TicketId::new("T1"), "   ", "EMAIL")
            .unwrap_err();
        assert_eq!(err.downcast_ref::<ReplyError>(), Some(&ReplyError::EmptyContent));
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reply_delegated_trimmed() {
        let sender = Arc::new(RecordingSender::default());
        let handler = ReplyHandler::new(sender.clone());

        handler
            .send_reply(&TicketId::new("T1"), "  Thanks, fixed now \n", "CHAT")
            .unwrap();
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "Thanks, fixed now");
        assert_eq!(sent[0].channel, "CHAT");
    }
}
