//! `ReqwestExchange`: [`HttpExchange`] over a shared `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use tracing::debug;

use crate::{Body, HttpExchange, Method, Request, Response, TransportError, TransportResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("rust_lg/", env!("CARGO_PKG_VERSION"));

/// Resolves request URIs against a base URL and performs them with one
/// pooled client.
///
/// A URI that already starts with `http://` or `https://` is used as-is;
/// anything else is joined onto the base.
#[derive(Clone, Debug)]
pub struct ReqwestExchange {
    client: Client,
    base:   Url,
}

impl ReqwestExchange {
    pub fn new(base_url: &str) -> TransportResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: &str, client: Client) -> TransportResult<Self> {
        let base = Url::parse(base_url).map_err(|_| TransportError::InvalidUrl(base_url.to_owned()))?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for `request`, after bind-variable substitution.
    pub fn url_for(&self, request: &Request) -> TransportResult<Url> {
        let uri = request.resolved_uri()?;
        let joined = if uri.starts_with("http://") || uri.starts_with("https://") {
            Url::parse(&uri)
        } else {
            let base = self.base.as_str().trim_end_matches('/');
            Url::parse(&format!("{base}/{}", uri.trim_start_matches('/')))
        };
        joined.map_err(|_| TransportError::InvalidUrl(uri))
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn exchange(&self, request: Request) -> TransportResult<Response> {
        let url = self.url_for(&request)?;
        debug!(method = %request.method, %url, "sending request");

        let mut builder = match request.method {
            Method::Get    => self.client.get(url),
            Method::Post   => self.client.post(url),
            Method::Put    => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        builder = builder.headers(header_map(&request.headers)?);

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Text(text) => builder.body(text),
            Body::Files { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let part = Part::bytes(file.bytes)
                        .file_name(file.file_name)
                        .mime_str(&file.content_type)?;
                    form = form.part(file.field, part);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();

        let body = if request.drop_response_body {
            response.bytes().await?;
            String::new()
        } else {
            response.text().await?
        };

        Ok(Response { status, headers, body })
    }
}

fn header_map(headers: &[(String, String)]) -> TransportResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(value.clone()))?;
        map.insert(name, value);
    }
    Ok(map)
}
