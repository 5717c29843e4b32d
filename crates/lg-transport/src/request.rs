//! Request and response values passed across the transport boundary.

use std::collections::BTreeMap;
use std::fmt;

use crate::{TransportError, TransportResult};

const APPLICATION_JSON: &str = "application/json";

// ── Method ────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get    => "GET",
            Method::Post   => "POST",
            Method::Put    => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// One file of a multipart upload.
#[derive(Clone, Debug, PartialEq)]
pub struct FilePart {
    pub field:        String,
    pub file_name:    String,
    pub content_type: String,
    pub bytes:        Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Text(String),
    /// Multipart form: plain fields plus files.
    Files {
        fields: Vec<(String, String)>,
        files:  Vec<FilePart>,
    },
}

// ── Request ───────────────────────────────────────────────────────────────────

/// One HTTP exchange to perform.
///
/// `uri` may contain `{name}` placeholders filled from `bind_vars` by
/// [`Request::resolved_uri`].
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method:             Method,
    pub uri:                String,
    pub bind_vars:          BTreeMap<String, String>,
    pub headers:            Vec<(String, String)>,
    pub body:               Body,
    /// Read and discard the body instead of handing it back.
    pub drop_response_body: bool,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri:                uri.into(),
            bind_vars:          BTreeMap::new(),
            headers:            Vec::new(),
            body:               Body::Empty,
            drop_response_body: false,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::Delete, uri)
    }

    /// POST with a JSON body.  `Accept` and `Content-Type` default to
    /// `application/json`.
    pub fn post_json(uri: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, uri).with_body(Body::Json(body)).json_headers()
    }

    /// PUT with a JSON body; same header defaults as [`post_json`][Self::post_json].
    pub fn put_json(uri: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Put, uri).with_body(Body::Json(body)).json_headers()
    }

    pub fn post_files(
        uri:    impl Into<String>,
        fields: Vec<(String, String)>,
        files:  Vec<FilePart>,
    ) -> Self {
        Self::new(Method::Post, uri).with_body(Body::Files { fields, files })
    }

    // ── Builder methods ───────────────────────────────────────────────────

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bind_vars.insert(name.into(), value.into());
        self
    }

    pub fn bind_all(mut self, vars: BTreeMap<String, String>) -> Self {
        self.bind_vars.extend(vars);
        self
    }

    /// Add a header, replacing any earlier value with the same
    /// (case-insensitive) name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        for (name, value) in headers {
            self = self.header(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn drop_response_body(mut self, drop: bool) -> Self {
        self.drop_response_body = drop;
        self
    }

    fn json_headers(self) -> Self {
        self.header("Accept", APPLICATION_JSON)
            .header("Content-Type", APPLICATION_JSON)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `uri` with every `{name}` placeholder replaced by its bind variable.
    pub fn resolved_uri(&self) -> TransportResult<String> {
        let mut out = String::with_capacity(self.uri.len());
        let mut rest = self.uri.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| TransportError::InvalidUrl(self.uri.clone()))?;
            let var = &after[..close];
            let value = self.bind_vars.get(var).ok_or_else(|| TransportError::Unbound {
                uri: self.uri.clone(),
                var: var.to_owned(),
            })?;
            out.push_str(value);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub status:  u16,
    pub headers: Vec<(String, String)>,
    pub body:    String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
