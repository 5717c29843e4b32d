//! Embedded resource discovery for recursive page fetches.
//!
//! ```text
//! stylesheet source (path ends in .css):  url(…)               not recursive
//! anything else:                          src="…"              not recursive
//!                                         <link href="….css"   recursive
//! ```
//!
//! Values may be quoted with `"` or `'`, or with an escaped `\"` as found in
//! inline scripts.  One leading `/` and any number of leading `../` are
//! stripped so the link resolves against the transport's base URL.
//! Template placeholders (anything containing `{` or `}`) and inline `data:`
//! URIs are skipped.

/// One resource to fetch after a recursive GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedLink {
    pub uri:       String,
    /// Parse the fetched resource for further links (stylesheets only).
    pub recursive: bool,
}

/// Every embedded link in `body`, fetched from `source_uri`, in document
/// order and without duplicates.
pub fn embedded_links(source_uri: &str, body: &str) -> Vec<EmbeddedLink> {
    let mut links = Vec::new();
    if is_stylesheet(source_uri) {
        for raw in values_after(body, "url(", true) {
            push_link(&mut links, raw, false);
        }
    } else {
        for raw in values_after(body, "src=", false) {
            push_link(&mut links, raw, false);
        }
        for raw in values_after(body, "<link href=", false) {
            if is_stylesheet(raw) {
                push_link(&mut links, raw, true);
            }
        }
    }
    links
}

/// `true` if the path part of `uri` names a `.css` file.
pub fn is_stylesheet(uri: &str) -> bool {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    uri[..end].ends_with(".css")
}

fn push_link(links: &mut Vec<EmbeddedLink>, raw: &str, recursive: bool) {
    if let Some(uri) = normalize(raw) {
        if !links.iter().any(|l| l.uri == uri) {
            links.push(EmbeddedLink { uri, recursive });
        }
    }
}

fn normalize(raw: &str) -> Option<String> {
    let mut uri = raw.strip_prefix('/').unwrap_or(raw);
    while let Some(rest) = uri.strip_prefix("../") {
        uri = rest;
    }
    let skip = uri.is_empty()
        || uri.contains(['{', '}'])
        || uri.starts_with("data:")
        || uri.starts_with('#');
    (!skip).then(|| uri.to_owned())
}

/// The value following each occurrence of `prefix`.
///
/// With `bare` set, an unquoted value runs up to the next `)`, which is how
/// stylesheets usually write `url(…)`.
fn values_after<'a>(body: &'a str, prefix: &str, bare: bool) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(at) = rest.find(prefix) {
        let tail = &rest[at + prefix.len()..];
        rest = tail;

        let (escaped, tail) = match tail.strip_prefix('\\') {
            Some(t) => (true, t),
            None => (false, tail),
        };
        let quote = match tail.chars().next() {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                if bare && !escaped {
                    if let Some(end) = tail.find(')') {
                        out.push(tail[..end].trim());
                    }
                }
                continue;
            }
        };

        let inner = &tail[1..];
        let end = if escaped {
            inner.find(&format!("\\{quote}"))
        } else {
            inner.find(quote)
        };
        if let Some(end) = end {
            out.push(&inner[..end]);
        }
    }
    out
}
