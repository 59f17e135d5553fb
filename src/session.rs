//! Per-run conversion context: document cache, fetcher seam, cancellation.
//!
//! All shared state of a conversion lives here with an explicit lifetime
//! (created per run, discarded after), keeping concurrent runs isolated.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use quick_xml::events::Event;
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// Retrieves raw document bytes for an absolute URI.
///
/// Network retrieval is an external collaborator; the library ships a
/// filesystem implementation and callers plug in their own transport here.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, uri: &Url) -> io::Result<Vec<u8>>;
}

/// Reads `file:` URIs from disk and serves remote URIs from a local
/// mirror directory (`<cache_dir>/<host>/<path>`) when one is configured.
pub struct FileFetcher {
    cache_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }

    fn mirror_path(&self, uri: &Url) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let host = uri.host_str()?;
        let mut path = dir.join(host);
        for segment in uri.path_segments()? {
            if !segment.is_empty() {
                path.push(segment);
            }
        }
        Some(path)
    }
}

impl DocumentFetcher for FileFetcher {
    fn fetch(&self, uri: &Url) -> io::Result<Vec<u8>> {
        match uri.scheme() {
            "file" => {
                let path = uri
                    .to_file_path()
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad file URI"))?;
                std::fs::read(path)
            }
            "http" | "https" => {
                let path = self.mirror_path(uri).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no cache directory configured")
                })?;
                std::fs::read(path)
            }
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported scheme '{other}'"),
            )),
        }
    }
}

/// Root element classification of a fetched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Schema,
    Linkbase,
    Instance,
    InlineXbrl,
    Unknown,
}

/// A fetched document with its resolved URI and sniffed kind.
#[derive(Debug)]
pub struct SourceDocument {
    pub uri: Url,
    pub kind: DocKind,
    pub bytes: Vec<u8>,
}

fn sniff_kind(bytes: &[u8]) -> DocKind {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner()).unwrap_or("");
                return match local {
                    "schema" => DocKind::Schema,
                    "linkbase" => DocKind::Linkbase,
                    "xbrl" => DocKind::Instance,
                    "html" => DocKind::InlineXbrl,
                    _ => DocKind::Unknown,
                };
            }
            Ok(Event::Eof) | Err(_) => return DocKind::Unknown,
            _ => {}
        }
        buf.clear();
    }
}

/// Caller-supplied cancellation signal with an optional deadline.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

/// Shared state for one conversion run: the fetch-once document cache and
/// the cancellation token. Each distinct absolute URI is fetched and sniffed
/// exactly once; concurrent requesters reuse the first writer's entry.
pub struct Session {
    fetcher: Box<dyn DocumentFetcher>,
    cache: DashMap<Url, Arc<SourceDocument>>,
    cancel: CancelToken,
}

impl Session {
    pub fn new(fetcher: Box<dyn DocumentFetcher>, cancel: CancelToken) -> Self {
        Self {
            fetcher,
            cache: DashMap::new(),
            cancel,
        }
    }

    /// Session reading local files only, no remote mirror.
    pub fn local() -> Self {
        Self::new(Box::new(FileFetcher::new(None)), CancelToken::new())
    }

    pub fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fetch and classify a document, or return the cached copy.
    pub fn document(&self, uri: &Url) -> Result<Arc<SourceDocument>> {
        self.check_cancel()?;
        if let Some(doc) = self.cache.get(uri) {
            return Ok(doc.clone());
        }
        let bytes = self
            .fetcher
            .fetch(uri)
            .map_err(|e| Error::UnreachableDocument {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
        let kind = sniff_kind(&bytes);
        debug!(uri = %uri, ?kind, len = bytes.len(), "fetched document");
        let doc = Arc::new(SourceDocument {
            uri: uri.clone(),
            kind,
            bytes,
        });
        // First writer wins; a concurrent fetch of the same URI resolves to
        // whichever entry landed first.
        let entry = self.cache.entry(uri.clone()).or_insert(doc);
        Ok(entry.clone())
    }

    pub fn cached_documents(&self) -> usize {
        self.cache.len()
    }
}

/// Turn a CLI locator (URL or filesystem path) into an absolute URI.
pub fn locator_to_url(locator: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(locator) {
        if !url.cannot_be_a_base() {
            return Ok(url);
        }
    }
    let path = std::fs::canonicalize(locator).map_err(|e| Error::UnreachableDocument {
        uri: locator.to_string(),
        reason: e.to_string(),
    })?;
    Url::from_file_path(&path).map_err(|_| Error::UnreachableDocument {
        uri: locator.to_string(),
        reason: "not a valid file path".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sniffs_document_kinds() {
        assert_eq!(
            sniff_kind(b"<?xml version=\"1.0\"?><xs:schema xmlns:xs=\"x\"/>"),
            DocKind::Schema
        );
        assert_eq!(
            sniff_kind(b"<link:linkbase xmlns:link=\"l\"/>"),
            DocKind::Linkbase
        );
        assert_eq!(sniff_kind(b"<xbrli:xbrl xmlns:xbrli=\"i\"/>"), DocKind::Instance);
        assert_eq!(sniff_kind(b"<html><body/></html>"), DocKind::InlineXbrl);
        assert_eq!(sniff_kind(b"not xml"), DocKind::Unknown);
    }

    #[test]
    fn caches_by_absolute_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xsd");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"<xs:schema xmlns:xs=\"x\"/>").unwrap();

        let session = Session::local();
        let uri = Url::from_file_path(&path).unwrap();
        let first = session.document(&uri).unwrap();
        std::fs::remove_file(&path).unwrap();
        // Second request is served from cache even though the file is gone.
        let second = session.document(&uri).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.cached_documents(), 1);
    }

    #[test]
    fn cancelled_token_fails_fast() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let session = Session::new(Box::new(FileFetcher::new(None)), cancel);
        let uri = Url::parse("file:///nonexistent.xsd").unwrap();
        assert!(matches!(session.document(&uri), Err(Error::Cancelled)));
    }

    #[test]
    fn deadline_in_past_cancels() {
        let token = CancelToken::with_deadline(Duration::from_secs(0));
        assert!(token.is_cancelled());
    }
}
