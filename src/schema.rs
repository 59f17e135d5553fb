//! Schema indexing: concept declarations out of taxonomy schemas.
//!
//! `index` is side-effect free; the caller merges per-document tables
//! across the DTS through [`ConceptTable::merge`], which resolves duplicate
//! declarations (identical ones silently, conflicting ones with a
//! `DuplicateConcept` warning keeping the first).

use ahash::AHashMap;
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;
use url::Url;

use crate::model::{ArcroleType, Balance, Concept, PeriodType, QName, RoleType};
use crate::session::SourceDocument;
use crate::{Error, Result, Warning};

/// Everything indexed from one schema document.
#[derive(Debug)]
pub struct SchemaIndex {
    pub target_namespace: CompactString,
    pub concepts: Vec<Concept>,
    pub role_types: Vec<RoleType>,
    pub arcrole_types: Vec<ArcroleType>,
}

/// The merged concept table of a DTS.
///
/// Keeps first-declaration order so iteration (and therefore RDF emission)
/// is deterministic.
#[derive(Default)]
pub struct ConceptTable {
    by_qname: AHashMap<QName, Concept>,
    by_id: AHashMap<(Url, CompactString), QName>,
    order: Vec<QName>,
}

impl ConceptTable {
    pub fn get(&self, qname: &QName) -> Option<&Concept> {
        self.by_qname.get(qname)
    }

    pub fn contains(&self, qname: &QName) -> bool {
        self.by_qname.contains_key(qname)
    }

    /// Look up the concept a locator points at: `href = doc#id`.
    pub fn by_locator(&self, doc: &Url, id: &str) -> Option<&QName> {
        self.by_id.get(&(doc.clone(), CompactString::from(id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.order.iter().filter_map(|q| self.by_qname.get(q))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Merge one document's index. The same concept declared identically via
    /// several traversal paths is accepted silently; a conflicting
    /// redeclaration keeps the first and records a warning.
    pub fn merge(&mut self, doc_uri: &Url, index: SchemaIndex, warnings: &mut Vec<Warning>) {
        for concept in index.concepts {
            if let Some(id) = &concept.id {
                self.by_id
                    .entry((doc_uri.clone(), id.clone()))
                    .or_insert_with(|| concept.qname.clone());
            }
            match self.by_qname.get(&concept.qname) {
                None => {
                    self.order.push(concept.qname.clone());
                    self.by_qname.insert(concept.qname.clone(), concept);
                }
                Some(existing) if *existing == concept => {}
                Some(_) => {
                    warnings.push(Warning::DuplicateConcept {
                        qname: concept.qname.clone(),
                        uri: doc_uri.to_string(),
                    });
                }
            }
        }
    }
}

/// Accumulated xmlns prefix map for QName resolution.
pub(crate) struct Prefixes {
    map: AHashMap<CompactString, CompactString>,
}

impl Prefixes {
    pub(crate) fn new() -> Self {
        Self {
            map: AHashMap::new(),
        }
    }

    /// Collect xmlns declarations from a start tag. Schemas declare their
    /// prefixes on the root element; nested redefinition is rare enough in
    /// taxonomy schemas that a flat accumulated map suffices.
    pub(crate) fn collect(&mut self, e: &BytesStart) {
        for attr in e.attributes().flatten() {
            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
            if let Some(prefix) = key.strip_prefix("xmlns:") {
                let value = attr.unescape_value().unwrap_or_default();
                self.map
                    .insert(CompactString::from(prefix), CompactString::from(&*value));
            } else if key == "xmlns" {
                let value = attr.unescape_value().unwrap_or_default();
                self.map
                    .insert(CompactString::new(""), CompactString::from(&*value));
            }
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<QName> {
        let (prefix, local) = match name.split_once(':') {
            Some((p, l)) => (p, l),
            None => ("", name),
        };
        self.map
            .get(prefix)
            .map(|ns| QName::new(ns.clone(), local))
    }
}

/// Extract concept declarations and role/arcrole type declarations from a
/// schema document.
///
/// Fails with `MalformedDeclaration` when a top-level element that claims a
/// substitution group or type cannot resolve its name or those references.
pub fn index(doc: &SourceDocument) -> Result<SchemaIndex> {
    let mut reader = quick_xml::Reader::from_reader(doc.bytes.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut prefixes = Prefixes::new();
    let mut target_namespace = CompactString::new("");
    let mut concepts = Vec::new();
    let mut role_types = Vec::new();
    let mut arcrole_types = Vec::new();

    let mut depth = 0usize;
    let mut current_role: Option<RoleType> = None;
    let mut current_arcrole: Option<ArcroleType> = None;
    // Which child of roleType/arcroleType is collecting text.
    let mut pending_text: Option<&'static str> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Parse(format!("schema parse error in {}: {e}", doc.uri)))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(&event, Event::Empty(_));
                prefixes.collect(e);
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner()).unwrap_or("");

                match local {
                    "schema" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"targetNamespace" {
                                let v = attr.unescape_value().unwrap_or_default();
                                target_namespace = CompactString::from(&*v);
                            }
                        }
                    }
                    "element" if depth == 1 => {
                        if let Some(concept) =
                            parse_element(e, &prefixes, &target_namespace, &doc.uri)?
                        {
                            concepts.push(concept);
                        }
                    }
                    "roleType" => {
                        current_role = Some(RoleType {
                            uri: attr_value(e, "roleURI").unwrap_or_default(),
                            id: attr_value(e, "id"),
                            definition: None,
                            used_on: Vec::new(),
                        });
                    }
                    "arcroleType" => {
                        current_arcrole = Some(ArcroleType {
                            uri: attr_value(e, "arcroleURI").unwrap_or_default(),
                            id: attr_value(e, "id"),
                            definition: None,
                        });
                    }
                    "definition" if current_role.is_some() || current_arcrole.is_some() => {
                        pending_text = Some("definition");
                    }
                    "usedOn" if current_role.is_some() => {
                        pending_text = Some("usedOn");
                    }
                    _ => {}
                }
                if !is_empty {
                    depth += 1;
                }
            }
            Event::Text(ref t) => {
                if let Some(kind) = pending_text {
                    let text = t.unescape().unwrap_or_default().trim().to_string();
                    match kind {
                        "definition" => {
                            if let Some(r) = current_role.as_mut() {
                                r.definition = Some(text);
                            } else if let Some(a) = current_arcrole.as_mut() {
                                a.definition = Some(text);
                            }
                        }
                        "usedOn" => {
                            if let Some(r) = current_role.as_mut() {
                                if let Some(q) = prefixes.resolve(&text) {
                                    r.used_on.push(q);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner()).unwrap_or("");
                match local {
                    "roleType" => {
                        if let Some(r) = current_role.take() {
                            role_types.push(r);
                        }
                    }
                    "arcroleType" => {
                        if let Some(a) = current_arcrole.take() {
                            arcrole_types.push(a);
                        }
                    }
                    "definition" | "usedOn" => pending_text = None,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(uri = %doc.uri, concepts = concepts.len(), "indexed schema");
    Ok(SchemaIndex {
        target_namespace,
        concepts,
        role_types,
        arcrole_types,
    })
}

fn attr_value(e: &BytesStart, name: &str) -> Option<CompactString> {
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.local_name().into_inner()).unwrap_or("");
        if key == name {
            let v = attr.unescape_value().unwrap_or_default();
            return Some(CompactString::from(&*v));
        }
    }
    None
}

/// Build a concept from a top-level element declaration.
///
/// Elements declaring neither a type nor a substitution group are plain XML
/// schema plumbing, not concepts, and are skipped.
fn parse_element(
    e: &BytesStart,
    prefixes: &Prefixes,
    target_namespace: &str,
    uri: &Url,
) -> Result<Option<Concept>> {
    let mut name = None;
    let mut id = None;
    let mut type_ref = None;
    let mut subst_ref = None;
    let mut is_abstract = false;
    let mut nillable = false;
    let mut period_type = None;
    let mut balance = None;

    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.local_name().into_inner()).unwrap_or("");
        let value = attr.unescape_value().unwrap_or_default();
        match key {
            "name" => name = Some(CompactString::from(&*value)),
            "id" => id = Some(CompactString::from(&*value)),
            "type" => type_ref = Some(value.to_string()),
            "substitutionGroup" => subst_ref = Some(value.to_string()),
            "abstract" => is_abstract = &*value == "true",
            "nillable" => nillable = &*value == "true",
            "periodType" => period_type = PeriodType::parse(&value),
            "balance" => balance = Balance::parse(&value),
            _ => {}
        }
    }

    if type_ref.is_none() && subst_ref.is_none() {
        return Ok(None);
    }
    let name = name.ok_or_else(|| Error::MalformedDeclaration {
        uri: uri.to_string(),
        reason: "concept element without a name".to_string(),
    })?;
    let concept_type = match &type_ref {
        Some(t) => Some(prefixes.resolve(t).ok_or_else(|| Error::MalformedDeclaration {
            uri: uri.to_string(),
            reason: format!("unresolvable type '{t}' on concept '{name}'"),
        })?),
        None => None,
    };
    let substitution_group = match &subst_ref {
        Some(s) => Some(prefixes.resolve(s).ok_or_else(|| Error::MalformedDeclaration {
            uri: uri.to_string(),
            reason: format!("unresolvable substitutionGroup '{s}' on concept '{name}'"),
        })?),
        None => None,
    };

    Ok(Some(Concept {
        qname: QName::new(target_namespace, name.as_str()),
        id,
        concept_type,
        substitution_group,
        is_abstract,
        nillable,
        period_type,
        balance,
    }))
}
