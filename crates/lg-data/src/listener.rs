//! Response listeners: extract data from a validated response into channels.
//!
//! Listeners run once per validated response, body first and headers second,
//! before the required-substring check.  A listener error fails the
//! operation.  Every channel a listener writes must also be declared in the
//! operation's `contains` set, otherwise [`Bindings::output`] reports
//! [`DataError::Unbound`].

use std::fmt;

use crate::channel::{KeyedMap, Sequence, Slot};
use crate::extract::{self, PairPattern};
use crate::key::ChannelKey;
use crate::store::Bindings;
use crate::{DataError, DataResult};

/// Hook run against a validated response.
///
/// Both methods default to doing nothing, so a listener only implements the
/// half it cares about.
pub trait ResponseListener: Send + Sync + fmt::Debug {
    fn on_body(&self, _body: &str, _bindings: &Bindings) -> DataResult<()> {
        Ok(())
    }

    fn on_headers(&self, _headers: &[(String, String)], _bindings: &Bindings) -> DataResult<()> {
        Ok(())
    }
}

// ── Substring listeners ───────────────────────────────────────────────────────

/// Appends every `search…terminator` match to a `Sequence<String>`.
#[derive(Clone, Debug)]
pub struct SubstringListener {
    key:        ChannelKey<Sequence<String>>,
    search:     String,
    terminator: char,
    multiple:   bool,
    unique:     bool,
}

impl SubstringListener {
    pub fn new(key: ChannelKey<Sequence<String>>, search: impl Into<String>, terminator: char) -> Self {
        Self { key, search: search.into(), terminator, multiple: true, unique: false }
    }

    /// Stop after the first match.
    pub fn first_only(mut self) -> Self {
        self.multiple = false;
        self
    }

    /// Skip values already present in the sequence.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl ResponseListener for SubstringListener {
    fn on_body(&self, body: &str, bindings: &Bindings) -> DataResult<()> {
        let seq = bindings.output(&self.key)?;
        let found = extract::find_all(body, &self.search, self.terminator);
        let take = if self.multiple { found.len() } else { found.len().min(1) };
        for value in found.into_iter().take(take) {
            if self.unique {
                seq.push_unique(value.to_owned());
            } else {
                seq.push(value.to_owned());
            }
        }
        Ok(())
    }
}

/// Stores the first `search…terminator` match in a `Slot<String>`.
///
/// A body without a match leaves the slot untouched.
#[derive(Clone, Debug)]
pub struct SubstringSlotListener {
    key:        ChannelKey<Slot<String>>,
    search:     String,
    terminator: char,
}

impl SubstringSlotListener {
    pub fn new(key: ChannelKey<Slot<String>>, search: impl Into<String>, terminator: char) -> Self {
        Self { key, search: search.into(), terminator }
    }
}

impl ResponseListener for SubstringSlotListener {
    fn on_body(&self, body: &str, bindings: &Bindings) -> DataResult<()> {
        let slot = bindings.output(&self.key)?;
        if let Some((value, _)) = extract::substring_after(body, &self.search, self.terminator) {
            slot.set(value.to_owned());
        }
        Ok(())
    }
}

/// Inserts substring-delimited key/value pairs into a `KeyedMap`.
#[derive(Clone, Debug)]
pub struct KeyValueListener {
    key:     ChannelKey<KeyedMap<String, String>>,
    pattern: PairPattern,
}

impl KeyValueListener {
    pub fn new(key: ChannelKey<KeyedMap<String, String>>, pattern: PairPattern) -> Self {
        Self { key, pattern }
    }
}

impl ResponseListener for KeyValueListener {
    fn on_body(&self, body: &str, bindings: &Bindings) -> DataResult<()> {
        let map = bindings.output(&self.key)?;
        for (k, v) in extract::find_pairs(body, &self.pattern) {
            map.insert(k, v);
        }
        Ok(())
    }
}

// ── JSON listeners ────────────────────────────────────────────────────────────

/// Stores one scalar, addressed by a dotted path, from a JSON body.
///
/// For array bodies the first element is used.  A missing path is an error.
#[derive(Clone, Debug)]
pub struct JsonFieldListener {
    key:  ChannelKey<Slot<String>>,
    path: String,
}

impl JsonFieldListener {
    pub fn new(key: ChannelKey<Slot<String>>, path: impl Into<String>) -> Self {
        Self { key, path: path.into() }
    }
}

impl ResponseListener for JsonFieldListener {
    fn on_body(&self, body: &str, bindings: &Bindings) -> DataResult<()> {
        let slot = bindings.output(&self.key)?;
        let records = extract::json_records(body)?;
        let value = records
            .first()
            .and_then(|r| extract::json_string(r, &self.path))
            .ok_or_else(|| DataError::Extract(format!("no scalar at JSON path {:?}", self.path)))?;
        slot.set(value);
        Ok(())
    }
}

/// Inserts `(key_path, value_path)` pairs from every record of a JSON body.
#[derive(Clone, Debug)]
pub struct JsonMapListener {
    key:        ChannelKey<KeyedMap<String, String>>,
    key_path:   String,
    value_path: String,
}

impl JsonMapListener {
    pub fn new(
        key:        ChannelKey<KeyedMap<String, String>>,
        key_path:   impl Into<String>,
        value_path: impl Into<String>,
    ) -> Self {
        Self { key, key_path: key_path.into(), value_path: value_path.into() }
    }
}

impl ResponseListener for JsonMapListener {
    fn on_body(&self, body: &str, bindings: &Bindings) -> DataResult<()> {
        let map = bindings.output(&self.key)?;
        for record in extract::json_records(body)? {
            let k = extract::json_string(&record, &self.key_path);
            let v = extract::json_string(&record, &self.value_path);
            match (k, v) {
                (Some(k), Some(v)) => {
                    map.insert(k, v);
                }
                _ => {
                    return Err(DataError::Extract(format!(
                        "record lacks {:?} or {:?}",
                        self.key_path, self.value_path
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Raw holders ───────────────────────────────────────────────────────────────

/// Copies one response header (case-insensitive name) into a `Slot<String>`.
#[derive(Clone, Debug)]
pub struct HeaderListener {
    key:    ChannelKey<Slot<String>>,
    header: String,
}

impl HeaderListener {
    pub fn new(key: ChannelKey<Slot<String>>, header: impl Into<String>) -> Self {
        Self { key, header: header.into() }
    }
}

impl ResponseListener for HeaderListener {
    fn on_headers(&self, headers: &[(String, String)], bindings: &Bindings) -> DataResult<()> {
        let slot = bindings.output(&self.key)?;
        if let Some((_, value)) = headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(&self.header)) {
            slot.set(value.clone());
        }
        Ok(())
    }
}

/// Stores the whole body; consumers parse it lazily.
#[derive(Clone, Debug)]
pub struct RawBodyListener {
    key: ChannelKey<Slot<String>>,
}

impl RawBodyListener {
    pub fn new(key: ChannelKey<Slot<String>>) -> Self {
        Self { key }
    }
}

impl ResponseListener for RawBodyListener {
    fn on_body(&self, body: &str, bindings: &Bindings) -> DataResult<()> {
        bindings.output(&self.key)?.set(body.to_owned());
        Ok(())
    }
}
