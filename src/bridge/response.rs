//! Synthetic callback-style response.
//!
//! # Responsibilities
//! - Accumulate the body written by the middleware chain
//! - Hold status, reason phrase and headers until the chain finishes
//! - Expose the event-emitter subset the chain uses for bookkeeping
//! - Signal the bridge exactly once when the response is finished
//!
//! # Design Decisions
//! - The handle is cheap to clone; a middleware may move it into a task
//! - Header names compare ASCII-case-insensitively, spelling is preserved
//! - Listeners and callbacks run with the state lock released
//! - Finishing drops every listener, so closures that captured the handle
//!   do not outlive the exchange

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use thiserror::Error;

use crate::bridge::events::{EventRegistry, Listener};
use crate::bridge::forward::{Completion, CompletionSignal};

/// Padding-agnostic decoder; chunk producers are not consistent about `=`.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors raised by response mutations.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response already finished")]
    Finished,

    #[error("invalid status code {0}")]
    InvalidStatus(u16),
}

/// Errors raised while turning a chunk into bytes.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("invalid base64 chunk: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Text encodings accepted for string chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    /// One byte per char, high bits discarded.
    Latin1,
    Base64,
}

impl Encoding {
    fn decode(self, text: &str) -> Result<Vec<u8>, ChunkError> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => Ok(text.chars().map(|c| (c as u32 & 0xff) as u8).collect()),
            Encoding::Base64 => Ok(BASE64.decode(text)?),
        }
    }
}

/// A body chunk handed to `write` or `end`.
#[derive(Debug, Clone)]
pub enum Chunk {
    Text(String, Encoding),
    Bytes(Bytes),
}

impl Chunk {
    pub fn encoded(text: impl Into<String>, encoding: Encoding) -> Self {
        Chunk::Text(text.into(), encoding)
    }

    fn into_bytes(self) -> Result<Vec<u8>, ChunkError> {
        match self {
            Chunk::Text(text, encoding) => encoding.decode(&text),
            Chunk::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_string(), Encoding::Utf8)
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text, Encoding::Utf8)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(bytes))
    }
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Insert or replace; the latest spelling of the name wins.
    pub fn set(&mut self, name: String, value: String) {
        match self.position(&name) {
            Some(index) => self.entries[index] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutable state behind a [`LegacyResponse`].
#[derive(Debug)]
pub(crate) struct ResponseState {
    body: Vec<u8>,
    headers: HeaderList,
    status_code: u16,
    status_message: Option<String>,
    headers_sent: bool,
    finished: bool,
    events: EventRegistry,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            body: Vec::new(),
            headers: HeaderList::default(),
            status_code: 200,
            status_message: None,
            headers_sent: false,
            finished: false,
            events: EventRegistry::new(),
        }
    }
}

/// Final status, headers and body of a finished response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseParts {
    pub status_code: u16,
    pub status_message: Option<String>,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl ResponseState {
    pub(crate) fn take_parts(&mut self) -> ResponseParts {
        ResponseParts {
            status_code: self.status_code,
            status_message: self.status_message.take(),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        }
    }

    /// Detach the listener registry; the caller drops it outside the lock.
    pub(crate) fn take_listeners(&mut self) -> EventRegistry {
        std::mem::take(&mut self.events)
    }

    /// Extend the body unless the response is finished.
    fn append_locked(&mut self, bytes: &[u8]) -> bool {
        if self.finished {
            tracing::debug!(len = bytes.len(), "Write after end ignored");
            return false;
        }
        self.body.extend_from_slice(bytes);
        self.headers_sent = true;
        true
    }

    fn ensure_open(&self) -> Result<(), ResponseError> {
        if self.finished {
            Err(ResponseError::Finished)
        } else {
            Ok(())
        }
    }
}

/// Callback-style response handed to the middleware chain.
#[derive(Clone)]
pub struct LegacyResponse {
    state: Arc<Mutex<ResponseState>>,
    signal: Arc<CompletionSignal>,
}

impl LegacyResponse {
    pub(crate) fn new(signal: Arc<CompletionSignal>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState::default())),
            signal,
        }
    }

    /// Shared state without the completion signal, kept by the bridge.
    pub(crate) fn state(&self) -> Arc<Mutex<ResponseState>> {
        self.state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status_code(&self) -> u16 {
        self.lock().status_code
    }

    pub fn set_status_code(&self, code: u16) -> Result<(), ResponseError> {
        validate_status(code)?;
        let mut state = self.lock();
        state.ensure_open()?;
        state.status_code = code;
        Ok(())
    }

    pub fn status_message(&self) -> Option<String> {
        self.lock().status_message.clone()
    }

    pub fn headers_sent(&self) -> bool {
        self.lock().headers_sent
    }

    /// True once `end` has run.
    pub fn finished(&self) -> bool {
        self.lock().finished
    }

    pub fn set_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ResponseError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.headers.set(name.into(), value.into());
        Ok(())
    }

    pub fn get_header(&self, name: &str) -> Option<String> {
        self.lock().headers.get(name).map(str::to_string)
    }

    pub fn get_headers(&self) -> HeaderList {
        self.lock().headers.clone()
    }

    pub fn remove_header(&self, name: &str) -> Result<(), ResponseError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.headers.remove(name);
        Ok(())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.lock().headers.contains(name)
    }

    /// Write the status line and merge `headers` over the current set.
    pub fn write_head<I, K, V>(&self, code: u16, headers: I) -> Result<(), ResponseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.write_status_line(code, None, headers)
    }

    /// Same as [`write_head`](Self::write_head) with an explicit reason phrase.
    pub fn write_head_with_reason<I, K, V>(
        &self,
        code: u16,
        reason: impl Into<String>,
        headers: I,
    ) -> Result<(), ResponseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.write_status_line(code, Some(reason.into()), headers)
    }

    fn write_status_line<I, K, V>(
        &self,
        code: u16,
        reason: Option<String>,
        headers: I,
    ) -> Result<(), ResponseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        validate_status(code)?;
        let mut state = self.lock();
        state.ensure_open()?;
        state.status_code = code;
        if reason.is_some() {
            state.status_message = reason;
        }
        for (name, value) in headers {
            state.headers.set(name.into(), value.into());
        }
        state.headers_sent = true;
        Ok(())
    }

    /// Append a body chunk. Returns `false` if the chunk was rejected.
    pub fn write(&self, chunk: impl Into<Chunk>) -> bool {
        self.append(chunk.into())
    }

    /// Append a body chunk and run `callback` once it is buffered.
    pub fn write_then(&self, chunk: impl Into<Chunk>, callback: impl FnOnce()) -> bool {
        let accepted = self.append(chunk.into());
        if accepted {
            callback();
        }
        accepted
    }

    fn append(&self, chunk: Chunk) -> bool {
        match decode(chunk) {
            Some(bytes) => self.lock().append_locked(&bytes),
            None => false,
        }
    }

    /// Finish the response, optionally appending a final chunk.
    pub fn end(&self, chunk: Option<Chunk>) {
        self.finish(chunk, None::<fn()>);
    }

    /// Finish the response and run `callback` after the `finish` event.
    pub fn end_then(&self, chunk: Option<Chunk>, callback: impl FnOnce()) {
        self.finish(chunk, Some(callback));
    }

    fn finish<F: FnOnce()>(&self, chunk: Option<Chunk>, callback: Option<F>) {
        let bytes = chunk.and_then(decode);
        let mut events = {
            let mut state = self.lock();
            if state.finished {
                return;
            }
            if let Some(bytes) = &bytes {
                state.append_locked(bytes);
            }
            state.finished = true;
            state.headers_sent = true;
            state.take_listeners()
        };
        for listener in events.take_for_emit("finish") {
            listener(self, &[]);
        }
        drop(events);
        if let Some(callback) = callback {
            callback();
        }
        self.signal.fire(Completion::Finished);
    }

    pub fn on(&self, event: &str, listener: Listener) -> &Self {
        self.lock().events.on(event, listener);
        self
    }

    pub fn once(&self, event: &str, listener: Listener) -> &Self {
        self.lock().events.once(event, listener);
        self
    }

    /// Invoke listeners for `event`. Returns whether any were registered.
    pub fn emit(&self, event: &str, args: &[String]) -> bool {
        let listeners = self.lock().events.take_for_emit(event);
        for listener in &listeners {
            listener(self, args);
        }
        !listeners.is_empty()
    }

    pub fn remove_listener(&self, event: &str, listener: &Listener) -> &Self {
        self.lock().events.remove_listener(event, listener);
        self
    }

    pub fn remove_all_listeners(&self, event: Option<&str>) -> &Self {
        self.lock().events.remove_all_listeners(event);
        self
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().events.listener_count(event)
    }

    // Stream-control calls the chain may make; buffering makes them moot.
    pub fn cork(&self) {}
    pub fn uncork(&self) {}
    pub fn flush_headers(&self) {}
    pub fn set_timeout(&self, _millis: u64) {}
    pub fn destroy(&self) {}
}

impl std::fmt::Debug for LegacyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LegacyResponse")
            .field("status_code", &state.status_code)
            .field("headers", &state.headers)
            .field("body_len", &state.body.len())
            .field("finished", &state.finished)
            .finish()
    }
}

fn decode(chunk: Chunk) -> Option<Vec<u8>> {
    match chunk.into_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable response chunk");
            None
        }
    }
}

fn validate_status(code: u16) -> Result<(), ResponseError> {
    if (100..=999).contains(&code) {
        Ok(())
    } else {
        Err(ResponseError::InvalidStatus(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn response() -> (LegacyResponse, tokio::sync::oneshot::Receiver<Completion>) {
        let (signal, rx) = CompletionSignal::new();
        (LegacyResponse::new(signal), rx)
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let (res, _rx) = response();
        assert!(res.write("<h1>"));
        assert!(res.write(b"hello".to_vec()));
        assert!(res.write(Chunk::encoded("PC9oMT4", Encoding::Base64)));
        res.end(None);

        let parts = res.state().lock().unwrap().take_parts();
        assert_eq!(parts.body, b"<h1>hello</h1>");
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let (res, _rx) = response();
        res.set_header("Content-Type", "text/css").unwrap();
        assert_eq!(res.get_header("content-type").as_deref(), Some("text/css"));
        assert!(res.has_header("CONTENT-TYPE"));

        res.set_header("content-type", "text/plain").unwrap();
        let headers = res.get_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));

        res.remove_header("Content-type").unwrap();
        assert!(!res.has_header("content-type"));
    }

    #[test]
    fn test_write_head_forms() {
        let (res, _rx) = response();
        res.write_head(404, [("x-a", "1")]).unwrap();
        assert_eq!(res.status_code(), 404);
        assert!(res.headers_sent());
        assert_eq!(res.status_message(), None);

        res.write_head_with_reason(304, "Not Modified", [("etag", "\"abc\"")])
            .unwrap();
        assert_eq!(res.status_code(), 304);
        assert_eq!(res.status_message().as_deref(), Some("Not Modified"));
        assert_eq!(res.get_header("x-a").as_deref(), Some("1"));
        assert_eq!(res.get_header("ETag").as_deref(), Some("\"abc\""));

        assert!(matches!(
            res.write_head(42, Vec::<(String, String)>::new()),
            Err(ResponseError::InvalidStatus(42))
        ));
    }

    #[test]
    fn test_end_is_final() {
        let (res, mut rx) = response();
        res.write("body");
        res.end(Some("!".into()));

        assert!(res.finished());
        assert!(!res.write("late"));
        assert!(matches!(res.set_header("x", "y"), Err(ResponseError::Finished)));
        assert!(matches!(res.set_status_code(500), Err(ResponseError::Finished)));

        let parts = res.state().lock().unwrap().take_parts();
        assert_eq!(parts.body, b"body!");
        assert_eq!(rx.try_recv().unwrap(), Completion::Finished);
    }

    #[test]
    fn test_end_runs_finish_listeners_then_callback() {
        let (res, _rx) = response();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        res.once(
            "finish",
            Arc::new(move |_res: &LegacyResponse, _args: &[String]| {
                o.lock().unwrap().push("finish")
            }),
        );
        let o = order.clone();
        res.end_then(None, move || o.lock().unwrap().push("callback"));
        res.end(None);

        assert_eq!(*order.lock().unwrap(), vec!["finish", "callback"]);
    }

    #[test]
    fn test_write_callback_runs_only_when_accepted() {
        let (res, _rx) = response();
        let called = Arc::new(AtomicBool::new(false));

        let c = called.clone();
        assert!(res.write_then("a", move || c.store(true, Ordering::SeqCst)));
        assert!(called.swap(false, Ordering::SeqCst));

        res.end(None);
        let c = called.clone();
        assert!(!res.write_then("b", move || c.store(true, Ordering::SeqCst)));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_emit_reports_listeners_and_allows_reentry() {
        let (res, _rx) = response();
        assert!(!res.emit("close", &[]));

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        res.on(
            "close",
            Arc::new(move |res: &LegacyResponse, args: &[String]| {
                h.fetch_add(args.len(), Ordering::SeqCst);
                res.set_header("x-closed", "1").unwrap();
            }),
        );

        assert!(res.emit("close", &["a".into(), "b".into()]));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(res.has_header("x-closed"));
    }

    #[test]
    fn test_end_drops_listeners() {
        let (res, _rx) = response();
        let token = Arc::new(());
        let t = token.clone();
        let inner = res.clone();
        res.on(
            "close",
            Arc::new(move |_res: &LegacyResponse, _args: &[String]| {
                let _ = (&t, inner.finished());
            }),
        );
        assert_eq!(Arc::strong_count(&token), 2);

        res.end(None);
        assert_eq!(res.listener_count("close"), 0);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn test_concurrent_end_keeps_one_final_chunk() {
        for _ in 0..50 {
            let (res, _rx) = response();
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let threads: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|chunk| {
                    let res = res.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        res.end(Some(chunk.into()));
                    })
                })
                .collect();
            for thread in threads {
                thread.join().unwrap();
            }

            let body = res.state().lock().unwrap().take_parts().body;
            assert!(body == b"a" || body == b"b", "body was {body:?}");
        }
    }

    #[test]
    fn test_latin1_and_bad_base64() {
        let (res, _rx) = response();
        assert!(res.write(Chunk::encoded("\u{e9}", Encoding::Latin1)));
        assert!(!res.write(Chunk::encoded("***", Encoding::Base64)));
        res.end(None);

        let parts = res.state().lock().unwrap().take_parts();
        assert_eq!(parts.body, vec![0xe9]);
    }
}
