use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::decode::decode_page;
use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
        }
    }
}

/// A page-rendering session reused for every site of one scan cycle.
#[async_trait::async_trait]
pub trait PageSession: Send {
    /// Navigates to `url`, replacing the current page.
    async fn open(&mut self, url: &str) -> Result<(), FetchError>;

    /// Markup of the page opened last.
    async fn current_document_html(&mut self) -> Result<String, FetchError>;

    /// Drops session state after a failed attempt.
    async fn reset(&mut self) -> Result<(), FetchError>;

    async fn close(&mut self);
}

/// Creates one [`PageSession`] per scan cycle.
pub trait SessionProvider: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn PageSession>, FetchError>;
}

/// Plain HTTP session: fetches markup without running scripts.
pub struct HttpSession {
    settings: FetchSettings,
    client: reqwest::Client,
    page: Option<String>,
}

impl HttpSession {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client,
            page: None,
        })
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, content_len));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        decode_page(&bytes, content_type.as_deref())
    }
}

#[async_trait::async_trait]
impl PageSession for HttpSession {
    async fn open(&mut self, url: &str) -> Result<(), FetchError> {
        self.page = None;
        let html = self.download(url).await?;
        self.page = Some(html);
        Ok(())
    }

    async fn current_document_html(&mut self) -> Result<String, FetchError> {
        self.page
            .clone()
            .ok_or_else(|| FetchError::new(FailureKind::NoPageOpen, "open a page first"))
    }

    async fn reset(&mut self) -> Result<(), FetchError> {
        self.page = None;
        self.client = build_client(&self.settings)?;
        Ok(())
    }

    async fn close(&mut self) {
        self.page = None;
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpSessionProvider {
    settings: FetchSettings,
}

impl HttpSessionProvider {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }
}

impl SessionProvider for HttpSessionProvider {
    fn open_session(&self) -> Result<Box<dyn PageSession>, FetchError> {
        Ok(Box::new(HttpSession::new(self.settings.clone())?))
    }
}

fn build_client(settings: &FetchSettings) -> Result<reqwest::Client, FetchError> {
    let redirect_limit = settings.redirect_limit;
    let policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= redirect_limit {
            attempt.error("redirect limit exceeded")
        } else {
            attempt.follow()
        }
    });

    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .redirect(policy)
        .build()
        .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
