//! Remote mailbox listing
//!
//! The pool only needs message headers (sender and subject), newest first,
//! a page at a time. `GraphMailbox` reads them from a Graph-style REST API:
//! the first page is an ordered query on the inbox, later pages follow the
//! opaque `@odata.nextLink` URL the server hands back, as long as it points
//! under the configured base URL.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Sender and subject of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub from: String,
    pub subject: String,
}

/// One page of messages, newest first, with the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
    /// `None` when this is the last page
    pub next: Option<String>,
}

/// Second collaborator stage: list the inbox of `identity`.
///
/// `cursor` is `None` for the newest page and otherwise the `next` value of
/// the previous page.
pub trait Mailbox: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        identity: &'a str,
        access_token: &'a Secret<String>,
        cursor: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<MessagePage>> + Send + 'a>>;
}

#[derive(Deserialize)]
struct GraphMessageList {
    #[serde(default)]
    value: Vec<GraphMessage>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct GraphMessage {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<GraphRecipient>,
}

#[derive(Deserialize)]
struct GraphRecipient {
    #[serde(rename = "emailAddress")]
    email_address: GraphEmailAddress,
}

#[derive(Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

impl From<GraphMessage> for MessageSummary {
    fn from(message: GraphMessage) -> Self {
        let from = match message.from.map(|r| r.email_address) {
            Some(GraphEmailAddress {
                name: Some(name),
                address: Some(address),
            }) => format!("{name} <{address}>"),
            Some(GraphEmailAddress {
                address: Some(address),
                ..
            }) => address,
            Some(GraphEmailAddress { name: Some(name), .. }) => name,
            _ => String::new(),
        };
        Self {
            from,
            subject: message.subject.unwrap_or_default(),
        }
    }
}

/// Mailbox backed by a Graph-style REST API (`/me/mailFolders/inbox/messages`).
#[derive(Clone)]
pub struct GraphMailbox {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl GraphMailbox {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size,
        }
    }

    async fn list(&self, access_token: &Secret<String>, cursor: Option<&str>) -> Result<MessagePage> {
        let request = match cursor {
            Some(next_link) => {
                // The bearer token only ever goes to the configured host
                let same_origin = next_link
                    .strip_prefix(self.base_url.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
                if !same_origin {
                    return Err(Error::Mailbox(format!(
                        "refusing to follow next page link outside {}",
                        self.base_url
                    )));
                }
                self.client.get(next_link)
            }
            None => self
                .client
                .get(format!("{}/me/mailFolders/inbox/messages", self.base_url))
                .query(&[
                    ("$select", "from,subject".to_string()),
                    ("$orderby", "receivedDateTime desc".to_string()),
                    ("$top", self.page_size.to_string()),
                ]),
        };

        let response = request
            .bearer_auth(access_token.expose())
            .send()
            .await
            .map_err(|e| Error::Http(format!("mailbox request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            if matches!(status.as_u16(), 401 | 403) {
                return Err(Error::InvalidCredentials(format!(
                    "mailbox rejected access token ({status}): {body}"
                )));
            }
            return Err(Error::Mailbox(format!("mailbox returned {status}: {body}")));
        }

        let list = response
            .json::<GraphMessageList>()
            .await
            .map_err(|e| Error::Mailbox(format!("invalid message list: {e}")))?;

        Ok(MessagePage {
            messages: list.value.into_iter().map(MessageSummary::from).collect(),
            next: list.next_link,
        })
    }
}

impl Mailbox for GraphMailbox {
    fn fetch_page<'a>(
        &'a self,
        identity: &'a str,
        access_token: &'a Secret<String>,
        cursor: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<MessagePage>> + Send + 'a>> {
        Box::pin(async move {
            let page = self.list(access_token, cursor).await?;
            debug!(
                identity,
                messages = page.messages.len(),
                more = page.next.is_some(),
                "fetched mailbox page"
            );
            Ok(page)
        })
    }
}
