// src/client/http.rs

//! Reqwest-based client for the notebook REST API.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ApiResult, TransportError};
use super::model::{Envelope, NewParagraph, Note, Paragraph, ParagraphConfig, RunOptions, RunResult};
use super::{ApiFuture, NotebookApi};

/// Production [`NotebookApi`] speaking HTTP to the notebook server.
///
/// Session cookies returned by [`login`](Self::login) are kept in the
/// client's cookie store and sent with every later request.
#[derive(Debug)]
pub struct HttpNotebookClient {
    http: Client,
    base_url: String,
    cancel: Mutex<CancellationToken>,
}

impl HttpNotebookClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Malformed(format!("building http client: {e}")))?;

        Ok(Self {
            http,
            base_url: format_url(base_url),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticate with user name and password. The session cookie is
    /// stored for subsequent calls.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<()> {
        let url = self.url("/api/login");
        let req = self
            .http
            .post(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[("userName", username), ("password", password)]);
        self.call::<Value>(req, url).await?;
        debug!(user = %username, "logged in");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> (RequestBuilder, String) {
        let url = self.url(path);
        (self.http.request(method, &url), url)
    }

    /// Send a request, racing it against the current cancellation token, and
    /// unwrap the `{status, message, body}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        url: String,
    ) -> ApiResult<Option<T>> {
        let token = self.cancel.lock().clone();

        let exchange = async {
            let resp = req.send().await.map_err(|e| send_error(&url, e))?;
            let status = resp.status();
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| TransportError::no_response(url.clone(), e.to_string()))?;

            if !status.is_success() {
                let message = serde_json::from_slice::<Envelope<Value>>(&bytes)
                    .ok()
                    .and_then(|env| env.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| {
                        status
                            .canonical_reason()
                            .unwrap_or("request failed")
                            .to_string()
                    });
                warn!(%url, status = status.as_u16(), %message, "api error");
                return Err(TransportError::status(status.as_u16(), message));
            }

            if bytes.is_empty() {
                return Ok(None);
            }

            let envelope: Envelope<T> = serde_json::from_slice(&bytes)
                .map_err(|e| TransportError::Malformed(format!("{url}: {e}")))?;
            debug!(%url, status = %envelope.status, "api ok");
            Ok(envelope.body)
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!(%url, "request canceled");
                Err(TransportError::Canceled)
            }
            res = exchange => res,
        }
    }

    async fn call_unit(&self, req: RequestBuilder, url: String) -> ApiResult<()> {
        self.call::<Value>(req, url).await.map(|_| ())
    }
}

impl NotebookApi for HttpNotebookClient {
    fn get_note<'a>(&'a self, note_id: &'a str) -> ApiFuture<'a, Note> {
        Box::pin(async move {
            let (req, url) = self.request(Method::GET, &format!("/api/notebook/{note_id}"));
            self.call(req, url).await?.ok_or_else(|| missing_body("note"))
        })
    }

    fn get_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
    ) -> ApiFuture<'a, Paragraph> {
        Box::pin(async move {
            let (req, url) = self.request(
                Method::GET,
                &format!("/api/notebook/{note_id}/paragraph/{paragraph_id}"),
            );
            self.call(req, url)
                .await?
                .ok_or_else(|| missing_body("paragraph"))
        })
    }

    fn run_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        sync: bool,
        options: Option<RunOptions>,
    ) -> ApiFuture<'a, RunResult> {
        Box::pin(async move {
            let path = if sync {
                format!("/api/notebook/run/{note_id}/{paragraph_id}")
            } else {
                format!("/api/notebook/job/{note_id}/{paragraph_id}")
            };
            let (mut req, url) = self.request(Method::POST, &path);
            if let Some(options) = options {
                req = req.json(&options);
            }
            if sync {
                self.call(req, url).await
            } else {
                self.call_unit(req, url).await.map(|_| None)
            }
        })
    }

    fn stop_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let (req, url) = self.request(
                Method::DELETE,
                &format!("/api/notebook/job/{note_id}/{paragraph_id}"),
            );
            self.call_unit(req, url).await
        })
    }

    fn create_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph: NewParagraph,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let (req, url) =
                self.request(Method::POST, &format!("/api/notebook/{note_id}/paragraph"));
            self.call(req.json(&paragraph), url)
                .await?
                .ok_or_else(|| missing_body("paragraph id"))
        })
    }

    fn update_paragraph_text<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        text: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let (req, url) = self.request(
                Method::PUT,
                &format!("/api/notebook/{note_id}/paragraph/{paragraph_id}"),
            );
            self.call_unit(req.json(&serde_json::json!({ "text": text })), url)
                .await
        })
    }

    fn update_paragraph_config<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        config: &'a ParagraphConfig,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let (req, url) = self.request(
                Method::PUT,
                &format!("/api/notebook/{note_id}/paragraph/{paragraph_id}/config"),
            );
            self.call_unit(req.json(config), url).await
        })
    }

    fn delete_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let (req, url) = self.request(
                Method::DELETE,
                &format!("/api/notebook/{note_id}/paragraph/{paragraph_id}"),
            );
            self.call_unit(req, url).await
        })
    }

    fn move_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        index: usize,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let (req, url) = self.request(
                Method::POST,
                &format!("/api/notebook/{note_id}/paragraph/{paragraph_id}/move/{index}"),
            );
            self.call_unit(req, url).await
        })
    }

    fn cancel_in_flight(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
    }
}

/// Prefix `http://` when the URL has no scheme and drop trailing slashes.
pub fn format_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

fn send_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_decode() {
        TransportError::Malformed(format!("{url}: {err}"))
    } else {
        TransportError::no_response(url, format!("{err}; possibly due to a local network issue"))
    }
}

fn missing_body(what: &str) -> TransportError {
    TransportError::Malformed(format!("response carried no {what}"))
}
