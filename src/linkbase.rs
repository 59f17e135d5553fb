//! Linkbase parsing: extended links, locators, resources, arcs.
//!
//! XLink label/locator indirection is resolved here. Arcs leave this module
//! carrying concept identifiers (or inline resource content), never internal
//! labels, so the relationship resolver works purely on signatures.

use ahash::{AHashMap, AHashSet};
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;
use url::Url;

use crate::model::{Arc, ArcEndpoint, ArcUse, LinkResource, QName};
use crate::schema::{ConceptTable, Prefixes};
use crate::session::SourceDocument;
use crate::{Error, Result};

/// One extended link with its resolved arcs, in document order.
#[derive(Debug)]
pub struct ExtendedLink {
    /// Element qname of the container, e.g. `link:presentationLink`.
    pub element: QName,
    /// Extended-link-role URI.
    pub role: CompactString,
    pub arcs: Vec<Arc>,
}

/// Parse result for one linkbase document. Dangling locators (hrefs that do
/// not land on an indexed concept) are collected, not fatal: the remaining
/// arcs of the DTS still resolve.
#[derive(Debug, Default)]
pub struct ParsedLinkbase {
    pub links: Vec<ExtendedLink>,
    pub dangling: Vec<Error>,
}

#[derive(Debug)]
struct RawArc {
    arcrole: CompactString,
    from: CompactString,
    to: CompactString,
    order: f64,
    weight: Option<f64>,
    priority: i32,
    arc_use: ArcUse,
    preferred_label: Option<CompactString>,
}

struct LinkCtx {
    element: QName,
    role: CompactString,
    labels: AHashMap<CompactString, Vec<ArcEndpoint>>,
    /// Labels whose locator could not be resolved; arcs over them are
    /// skipped because the defect was already reported.
    dangling_labels: AHashSet<CompactString>,
    arcs: Vec<RawArc>,
    inner_depth: usize,
}

/// Extract extended links from a label, reference, presentation, calculation,
/// definition, or generic linkbase document.
///
/// Fails with `UnresolvedLocator` if an arc names a label with no locator or
/// resource in the same extended link.
pub fn parse(
    doc: &SourceDocument,
    doc_index: u32,
    concepts: &ConceptTable,
) -> Result<ParsedLinkbase> {
    let mut reader = quick_xml::Reader::from_reader(doc.bytes.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut prefixes = Prefixes::new();
    let mut out = ParsedLinkbase::default();
    let mut link: Option<LinkCtx> = None;
    // Resource under construction: (xlink:label, resource, inside-part qname).
    let mut resource: Option<(CompactString, LinkResource)> = None;
    let mut part: Option<QName> = None;
    let mut arc_seq: u32 = 0;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Parse(format!("linkbase parse error in {}: {e}", doc.uri)))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(&event, Event::Empty(_));
                prefixes.collect(e);
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner())
                    .unwrap_or("")
                    .to_string();
                let full = std::str::from_utf8(name.as_ref()).unwrap_or("").to_string();
                let xlink_type = xlink_attr(e, "type");

                if link.is_none() {
                    if is_extended(&local, xlink_type.as_deref()) && !is_empty {
                        link = Some(LinkCtx {
                            element: prefixes
                                .resolve(&full)
                                .unwrap_or_else(|| QName::new("", local.as_str())),
                            role: xlink_attr(e, "role").unwrap_or_default(),
                            labels: AHashMap::new(),
                            dangling_labels: AHashSet::new(),
                            arcs: Vec::new(),
                            inner_depth: 0,
                        });
                    }
                    buf.clear();
                    continue;
                }

                let ctx = link.as_mut().unwrap();
                if let Some((_, res)) = resource.as_mut() {
                    // Child element of a resource: a reference part.
                    if let Some(q) = prefixes.resolve(&full) {
                        res.parts.push((q.clone(), String::new()));
                        if !is_empty {
                            part = Some(q);
                        }
                    }
                    if !is_empty {
                        ctx.inner_depth += 1;
                    }
                    buf.clear();
                    continue;
                }

                match classify(&local, xlink_type.as_deref()) {
                    Some(XlinkKind::Locator) => {
                        handle_locator(e, doc, concepts, ctx, &mut out.dangling);
                    }
                    Some(XlinkKind::Resource) => {
                        let label = xlink_attr(e, "label").unwrap_or_default();
                        let res = LinkResource {
                            element: prefixes
                                .resolve(&full)
                                .unwrap_or_else(|| QName::new("", local.as_str())),
                            role: xlink_attr(e, "role"),
                            lang: attr_local(e, "lang"),
                            text: String::new(),
                            parts: Vec::new(),
                        };
                        if is_empty {
                            ctx.labels.entry(label).or_default().push(ArcEndpoint::Resource(res));
                        } else {
                            resource = Some((label, res));
                        }
                    }
                    Some(XlinkKind::Arc) => {
                        ctx.arcs.push(parse_arc(e));
                    }
                    None => {}
                }
                if !is_empty {
                    ctx.inner_depth += 1;
                }
            }
            Event::Text(ref t) => {
                if let Some((_, res)) = resource.as_mut() {
                    let text = t.unescape().unwrap_or_default();
                    if let Some(p) = &part {
                        if let Some(last) = res.parts.last_mut() {
                            if last.0 == *p {
                                last.1.push_str(text.trim());
                            }
                        }
                    } else {
                        res.text.push_str(&text);
                    }
                }
            }
            Event::End(_) => {
                if let Some(ctx) = link.as_mut() {
                    if part.is_some() {
                        part = None;
                        ctx.inner_depth -= 1;
                    } else if let Some((label, mut res)) = resource.take() {
                        res.text = res.text.trim().to_string();
                        ctx.labels.entry(label).or_default().push(ArcEndpoint::Resource(res));
                        ctx.inner_depth -= 1;
                    } else if ctx.inner_depth == 0 {
                        let ctx = link.take().unwrap();
                        let resolved = resolve_link(ctx, doc, doc_index, &mut arc_seq)?;
                        out.links.push(resolved);
                    } else {
                        ctx.inner_depth -= 1;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(uri = %doc.uri, links = out.links.len(), "parsed linkbase");
    Ok(out)
}

enum XlinkKind {
    Locator,
    Resource,
    Arc,
}

fn is_extended(local: &str, xlink_type: Option<&str>) -> bool {
    xlink_type == Some("extended")
        || matches!(
            local,
            "presentationLink"
                | "calculationLink"
                | "definitionLink"
                | "labelLink"
                | "referenceLink"
                | "footnoteLink"
        )
}

fn classify(local: &str, xlink_type: Option<&str>) -> Option<XlinkKind> {
    match xlink_type {
        Some("locator") => return Some(XlinkKind::Locator),
        Some("resource") => return Some(XlinkKind::Resource),
        Some("arc") => return Some(XlinkKind::Arc),
        _ => {}
    }
    if local == "loc" {
        Some(XlinkKind::Locator)
    } else if local.ends_with("Arc") {
        Some(XlinkKind::Arc)
    } else if matches!(local, "label" | "reference" | "footnote") {
        Some(XlinkKind::Resource)
    } else {
        None
    }
}

fn xlink_attr(e: &BytesStart, name: &str) -> Option<CompactString> {
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
        let matches_name = key
            .strip_prefix("xlink:")
            .map(|k| k == name)
            .unwrap_or(key == name);
        if matches_name {
            let v = attr.unescape_value().unwrap_or_default();
            return Some(CompactString::from(&*v));
        }
    }
    None
}

fn attr_local(e: &BytesStart, name: &str) -> Option<CompactString> {
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.local_name().into_inner()).unwrap_or("");
        if key == name {
            let v = attr.unescape_value().unwrap_or_default();
            return Some(CompactString::from(&*v));
        }
    }
    None
}

fn handle_locator(
    e: &BytesStart,
    doc: &SourceDocument,
    concepts: &ConceptTable,
    ctx: &mut LinkCtx,
    dangling: &mut Vec<Error>,
) {
    let label = xlink_attr(e, "label").unwrap_or_default();
    let href = xlink_attr(e, "href").unwrap_or_default();
    let (doc_part, fragment) = match href.split_once('#') {
        Some((d, f)) => (d, f),
        None => (href.as_str(), ""),
    };
    let target_doc: Option<Url> = if doc_part.is_empty() {
        Some(doc.uri.clone())
    } else {
        doc.uri.join(doc_part).ok().map(|mut u| {
            u.set_fragment(None);
            u
        })
    };
    let concept = target_doc
        .as_ref()
        .and_then(|d| concepts.by_locator(d, fragment));
    match concept {
        Some(qname) => {
            // Several locators may point at the same concept under distinct
            // labels; all of them normalize to the concept identifier here.
            ctx.labels
                .entry(label)
                .or_default()
                .push(ArcEndpoint::Concept(qname.clone()));
        }
        None => {
            ctx.dangling_labels.insert(label.clone());
            dangling.push(Error::UnresolvedLocator {
                uri: doc.uri.to_string(),
                role: ctx.role.to_string(),
                label: format!("{label} -> {href}"),
            });
        }
    }
}

fn parse_arc(e: &BytesStart) -> RawArc {
    let mut arc = RawArc {
        arcrole: xlink_attr(e, "arcrole").unwrap_or_default(),
        from: xlink_attr(e, "from").unwrap_or_default(),
        to: xlink_attr(e, "to").unwrap_or_default(),
        order: 1.0,
        weight: None,
        priority: 0,
        arc_use: ArcUse::Optional,
        preferred_label: None,
    };
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.local_name().into_inner()).unwrap_or("");
        let value = attr.unescape_value().unwrap_or_default();
        match key {
            "order" => {
                if let Ok(v) = value.parse() {
                    arc.order = v;
                }
            }
            "weight" => arc.weight = value.parse().ok(),
            "priority" => {
                if let Ok(v) = value.parse() {
                    arc.priority = v;
                }
            }
            "use" => {
                if &*value == "prohibited" {
                    arc.arc_use = ArcUse::Prohibited;
                }
            }
            "preferredLabel" => arc.preferred_label = Some(CompactString::from(&*value)),
            _ => {}
        }
    }
    arc
}

/// Expand raw arcs over their label endpoints. A label held by several
/// locators yields one arc per (from, to) endpoint pair.
fn resolve_link(
    ctx: LinkCtx,
    doc: &SourceDocument,
    doc_index: u32,
    arc_seq: &mut u32,
) -> Result<ExtendedLink> {
    let mut arcs = Vec::new();
    for raw in &ctx.arcs {
        let sources = match ctx.labels.get(&raw.from) {
            Some(s) => s,
            None if ctx.dangling_labels.contains(&raw.from) => continue,
            None => {
                return Err(Error::UnresolvedLocator {
                    uri: doc.uri.to_string(),
                    role: ctx.role.to_string(),
                    label: raw.from.to_string(),
                })
            }
        };
        let targets = match ctx.labels.get(&raw.to) {
            Some(t) => t,
            None if ctx.dangling_labels.contains(&raw.to) => continue,
            None => {
                return Err(Error::UnresolvedLocator {
                    uri: doc.uri.to_string(),
                    role: ctx.role.to_string(),
                    label: raw.to.to_string(),
                })
            }
        };
        for source in sources {
            let source = match source {
                ArcEndpoint::Concept(q) => q.clone(),
                // Arcs out of resources are outside fact/taxonomy scope.
                ArcEndpoint::Resource(_) => continue,
            };
            for target in targets {
                arcs.push(Arc {
                    link_name: ctx.element.clone(),
                    link_role: ctx.role.clone(),
                    arcrole: raw.arcrole.clone(),
                    source: source.clone(),
                    target: target.clone(),
                    order: raw.order,
                    weight: raw.weight,
                    priority: raw.priority,
                    arc_use: raw.arc_use,
                    preferred_label: raw.preferred_label.clone(),
                    doc_order: (doc_index, *arc_seq),
                });
                *arc_seq += 1;
            }
        }
    }
    Ok(ExtendedLink {
        element: ctx.element,
        role: ctx.role,
        arcs,
    })
}
