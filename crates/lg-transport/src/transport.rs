//! The callback-style `Transport` the behavior core talks to.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{FilePart, Request, Response, TransportError};

/// Receives the outcome of one request.
///
/// Exactly one of `completed` / `failed` is called per request, from a task
/// other than the one that called [`Transport::execute`].
pub trait ResponseCallback: Send + Sync + 'static {
    fn completed(&self, response: Response, is_get: bool);
    fn failed(&self, error: TransportError, is_get: bool);
}

/// Non-blocking request executor.
///
/// # Contract
///
/// - `execute` returns immediately; it never calls `callback` before
///   returning.
/// - Every accepted request eventually produces one callback.
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request, callback: Arc<dyn ResponseCallback>);

    // ── Convenience forms ─────────────────────────────────────────────────

    fn execute_get(
        &self,
        uri:                &str,
        bind_vars:          BTreeMap<String, String>,
        headers:            Vec<(String, String)>,
        callback:           Arc<dyn ResponseCallback>,
        drop_response_body: bool,
    ) {
        let request = Request::get(uri)
            .bind_all(bind_vars)
            .headers(headers)
            .drop_response_body(drop_response_body);
        self.execute(request, callback);
    }

    fn execute_post(
        &self,
        uri:                &str,
        body:               serde_json::Value,
        bind_vars:          BTreeMap<String, String>,
        headers:            Vec<(String, String)>,
        callback:           Arc<dyn ResponseCallback>,
        drop_response_body: bool,
    ) {
        let request = Request::post_json(uri, body)
            .bind_all(bind_vars)
            .headers(headers)
            .drop_response_body(drop_response_body);
        self.execute(request, callback);
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_post_files(
        &self,
        uri:                &str,
        fields:             Vec<(String, String)>,
        files:              Vec<FilePart>,
        bind_vars:          BTreeMap<String, String>,
        headers:            Vec<(String, String)>,
        callback:           Arc<dyn ResponseCallback>,
        drop_response_body: bool,
    ) {
        let request = Request::post_files(uri, fields, files)
            .bind_all(bind_vars)
            .headers(headers)
            .drop_response_body(drop_response_body);
        self.execute(request, callback);
    }

    fn execute_put(
        &self,
        uri:                &str,
        body:               serde_json::Value,
        bind_vars:          BTreeMap<String, String>,
        headers:            Vec<(String, String)>,
        callback:           Arc<dyn ResponseCallback>,
        drop_response_body: bool,
    ) {
        let request = Request::put_json(uri, body)
            .bind_all(bind_vars)
            .headers(headers)
            .drop_response_body(drop_response_body);
        self.execute(request, callback);
    }

    fn execute_delete(
        &self,
        uri:                &str,
        bind_vars:          BTreeMap<String, String>,
        headers:            Vec<(String, String)>,
        callback:           Arc<dyn ResponseCallback>,
        drop_response_body: bool,
    ) {
        let request = Request::delete(uri)
            .bind_all(bind_vars)
            .headers(headers)
            .drop_response_body(drop_response_body);
        self.execute(request, callback);
    }
}
