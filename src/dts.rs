//! Discoverable Taxonomy Set discovery.
//!
//! Breadth-first traversal over schema import/include and linkbase
//! reference edges, with a visited set keyed by resolved absolute URI.
//! Cycles among schemas are legal; the visited set guarantees termination
//! and that a document reachable via several relative paths is fetched and
//! parsed once.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use quick_xml::events::Event;
use tracing::debug;
use url::Url;

use crate::session::{Session, SourceDocument};
use crate::{Error, Result};

/// The closed set of documents belonging to one taxonomy, in stable
/// discovery order. Discovery order is the deterministic tie-break for
/// ambiguous arc sets downstream.
#[derive(Debug)]
pub struct Dts {
    pub entry: Url,
    pub documents: Vec<Arc<SourceDocument>>,
    index: AHashMap<Url, u32>,
}

impl Dts {
    /// Discovery index of a document, used to order arcs.
    pub fn index_of(&self, uri: &Url) -> Option<u32> {
        self.index.get(uri).copied()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Starting from an entry point, transitively follow schema imports,
/// includes, and linkbase references to the closed document set.
///
/// Fetch failures are fatal: a taxonomy cannot be partially resolved.
pub fn discover(entry: &Url, session: &Session) -> Result<Dts> {
    let mut documents = Vec::new();
    let mut index = AHashMap::new();
    let mut visited = AHashSet::new();
    let mut queue = VecDeque::new();

    let mut entry_uri = entry.clone();
    entry_uri.set_fragment(None);
    visited.insert(entry_uri.clone());
    queue.push_back(entry_uri);

    while let Some(uri) = queue.pop_front() {
        session.check_cancel()?;
        let doc = session.document(&uri)?;
        let refs = scan_references(&doc)?;
        debug!(uri = %uri, refs = refs.len(), "discovered document");

        index.insert(uri.clone(), documents.len() as u32);
        documents.push(doc);

        for target in refs {
            if visited.insert(target.clone()) {
                queue.push_back(target);
            }
        }
    }

    Ok(Dts {
        entry: entry.clone(),
        documents,
        index,
    })
}

/// Outbound DTS edges of one document: schemaLocation attributes on
/// import/include/schemaRef, and xlink:href on linkbaseRef, loc, roleRef,
/// and arcroleRef elements. Hrefs are resolved against the document URI and
/// stripped of fragments so that two paths to one document become one node.
fn scan_references(doc: &SourceDocument) -> Result<Vec<Url>> {
    let mut reader = quick_xml::Reader::from_reader(doc.bytes.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut refs = Vec::new();
    let mut seen = AHashSet::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner()).unwrap_or("");
                let href_attr = match local {
                    "import" | "include" => "schemaLocation",
                    "schemaRef" | "linkbaseRef" | "loc" | "roleRef" | "arcroleRef" => "href",
                    _ => {
                        buf.clear();
                        continue;
                    }
                };
                for attr in e.attributes().flatten() {
                    let key = attr.key;
                    let key_local =
                        std::str::from_utf8(key.local_name().into_inner()).unwrap_or("");
                    if key_local != href_attr {
                        continue;
                    }
                    let value = attr.unescape_value().unwrap_or_default();
                    if value.is_empty() {
                        continue;
                    }
                    if let Ok(mut target) = doc.uri.join(&value) {
                        target.set_fragment(None);
                        if target != doc.uri && seen.insert(target.clone()) {
                            refs.push(target);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Parse(format!(
                    "reference scan failed in {}: {e}",
                    doc.uri
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::io::Write;
    use std::path::Path;

    fn write_file(dir: &Path, name: &str, content: &str) -> Url {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        Url::from_file_path(path).unwrap()
    }

    #[test]
    fn cyclic_imports_terminate_with_each_document_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(
            dir.path(),
            "a.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:import schemaLocation="b.xsd" namespace="urn:b"/>
               </xs:schema>"#,
        );
        write_file(
            dir.path(),
            "b.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:import schemaLocation="a.xsd" namespace="urn:a"/>
               </xs:schema>"#,
        );

        let session = Session::local();
        let dts = discover(&a, &session).unwrap();
        assert_eq!(dts.len(), 2);
        assert_eq!(dts.index_of(&a), Some(0));
        assert_eq!(session.cached_documents(), 2);
    }

    #[test]
    fn linkbase_refs_and_locs_join_the_dts() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_file(
            dir.path(),
            "entry.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                          xmlns:link="http://www.xbrl.org/2003/linkbase"
                          xmlns:xlink="http://www.w3.org/1999/xlink">
                 <xs:annotation><xs:appinfo>
                   <link:linkbaseRef xlink:type="simple" xlink:href="pre.xml"/>
                 </xs:appinfo></xs:annotation>
               </xs:schema>"#,
        );
        write_file(
            dir.path(),
            "pre.xml",
            r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
                             xmlns:xlink="http://www.w3.org/1999/xlink">
                 <link:presentationLink xlink:type="extended" xlink:role="urn:role">
                   <link:loc xlink:type="locator" xlink:href="other.xsd#c1" xlink:label="c1"/>
                 </link:presentationLink>
               </link:linkbase>"#,
        );
        write_file(
            dir.path(),
            "other.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#,
        );

        let session = Session::local();
        let dts = discover(&entry, &session).unwrap();
        // entry, pre.xml, other.xsd; the loc fragment is stripped.
        assert_eq!(dts.len(), 3);
    }

    #[test]
    fn unreachable_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_file(
            dir.path(),
            "entry.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:import schemaLocation="missing.xsd" namespace="urn:m"/>
               </xs:schema>"#,
        );
        let session = Session::local();
        let err = discover(&entry, &session).unwrap_err();
        assert!(matches!(err, Error::UnreachableDocument { .. }));
    }

    #[test]
    fn discovery_order_is_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_file(
            dir.path(),
            "entry.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:import schemaLocation="z.xsd" namespace="urn:z"/>
                 <xs:import schemaLocation="a.xsd" namespace="urn:a"/>
               </xs:schema>"#,
        );
        write_file(dir.path(), "z.xsd", "<xs:schema xmlns:xs=\"x\"/>");
        write_file(dir.path(), "a.xsd", "<xs:schema xmlns:xs=\"x\"/>");

        let order: Vec<Vec<Url>> = (0..2)
            .map(|_| {
                let session = Session::local();
                discover(&entry, &session)
                    .unwrap()
                    .documents
                    .iter()
                    .map(|d| d.uri.clone())
                    .collect()
            })
            .collect();
        assert_eq!(order[0], order[1]);
        // Document order follows reference order, not lexicographic order.
        assert!(order[0][1].as_str().ends_with("z.xsd"));
    }
}
