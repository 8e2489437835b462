use anyhow::{Context, Result, bail};
use log::debug;
use reqwest::blocking::{Client, Response};

use crate::domain::message::{MessageContent, MessageSummary};
use crate::mail::Mailbox;
use crate::mail::decoders::extract_content;
use crate::mail::payload::{ListMessagesResponse, ModifyRequest, RawMessage};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Blocking client for the Gmail REST API, authenticated with a bearer token.
pub struct GmailClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        bail!("Gmail API error on {what} ({status}): {body}");
    }
    Ok(resp)
}

impl Mailbox for GmailClient {
    fn search(&self, query: &str) -> Result<Vec<MessageSummary>> {
        let url = format!("{}/messages", self.base_url);
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("q", query)]);
            if let Some(tok) = &page_token {
                req = req.query(&[("pageToken", tok.as_str())]);
            }
            debug!("listing messages q={query:?} page={page_token:?}");

            let resp = req.send().context("Gmail list request failed")?;
            let list: ListMessagesResponse = check(resp, "messages.list")?
                .json()
                .context("failed to parse Gmail list response")?;

            out.extend(list.messages.into_iter().map(|m| MessageSummary {
                id: m.id,
                thread_id: m.thread_id,
            }));

            match list.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(out)
    }

    fn fetch(&self, id: &str) -> Result<MessageContent> {
        let url = format!("{}/messages/{}", self.base_url, id);
        debug!("fetching message {id}");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .context("Gmail get request failed")?;
        let raw: RawMessage = check(resp, "messages.get")?
            .json()
            .context("failed to parse Gmail message")?;
        extract_content(&raw)
    }

    fn mark_read(&self, id: &str) -> Result<()> {
        let url = format!("{}/messages/{}/modify", self.base_url, id);
        debug!("removing UNREAD from {id}");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&ModifyRequest {
                add_label_ids: &[],
                remove_label_ids: &["UNREAD"],
            })
            .send()
            .context("Gmail modify request failed")?;
        check(resp, "messages.modify")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE};
    use mockito::Matcher;

    #[test]
    fn default_base_url() {
        assert_eq!(GmailClient::new("tok").base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn custom_base_url_strips_slash() {
        let c = GmailClient::with_base_url("tok", "http://gmail.test/v1/users/me/");
        assert_eq!(c.base_url(), "http://gmail.test/v1/users/me");
    }

    #[test]
    fn search_sends_query_and_follows_pages() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("GET", "/messages")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "is:unread subject:\"Alarm\"".into(),
            ))
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"a","threadId":"t"}],"nextPageToken":"p2"}"#)
            .create();
        let second = server
            .mock("GET", "/messages")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"b"}]}"#)
            .create();

        let client = GmailClient::with_base_url("tok", server.url());
        let ids: Vec<_> = client
            .search("is:unread subject:\"Alarm\"")
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        first.assert();
        second.assert();
    }

    #[test]
    fn search_with_no_matches_is_empty() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"resultSizeEstimate":0}"#)
            .create();
        let client = GmailClient::with_base_url("tok", server.url());
        assert!(client.search("q").unwrap().is_empty());
    }

    #[test]
    fn search_surfaces_http_errors() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/messages")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("invalid credentials")
            .create();
        let client = GmailClient::with_base_url("tok", server.url());
        let err = client.search("q").unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn fetch_extracts_subject_and_body() {
        let mut server = mockito::Server::new();
        let body = serde_json::json!({
            "id": "m1",
            "labelIds": ["UNREAD", "INBOX"],
            "payload": {
                "mimeType": "text/plain",
                "headers": [{"name": "Subject", "value": "Alarm"}],
                "body": {"size": 5, "data": URL_SAFE.encode("fired")}
            }
        });
        server
            .mock("GET", "/messages/m1")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_body(body.to_string())
            .create();

        let client = GmailClient::with_base_url("tok", server.url());
        let content = client.fetch("m1").unwrap();
        assert_eq!(content.subject.as_deref(), Some("Alarm"));
        assert_eq!(content.body, "fired");
    }

    #[test]
    fn mark_read_removes_unread_label() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("POST", "/messages/m1/modify")
            .match_body(Matcher::Json(serde_json::json!({
                "addLabelIds": [],
                "removeLabelIds": ["UNREAD"]
            })))
            .with_status(200)
            .with_body("{}")
            .create();
        let client = GmailClient::with_base_url("tok", server.url());
        client.mark_read("m1").unwrap();
        m.assert();
    }
}
