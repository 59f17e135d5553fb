//! RDF projection of resolved taxonomies and bound instance facts.
//!
//! URI minting for concepts is `namespace#localName`. Contexts, units,
//! labels, and qualified relationships have no natural URI and become blank
//! nodes; the allocator hands out the same node for the same source entity
//! within one projector, so projecting twice in a run never re-mints.

use std::io::Write;

use ahash::{AHashMap, AHashSet};
use oxrdf::vocab::{rdf, rdfs, xsd};
use oxrdf::{BlankNode, GraphName, Literal, NamedNode, NamedOrBlankNode, Quad, Term, Triple};
use oxrdfio::{RdfFormat, RdfSerializer};
use parking_lot::Mutex;
use tracing::debug;

use crate::instance::InstanceReport;
use crate::model::{ns, ArcEndpoint, Decimals, LinkResource, Period, QName, UnitMeasure};
use crate::taxonomy::Taxonomy;
use crate::{Error, Result};

/// Fixed projection vocabulary.
pub mod vocab {
    use oxrdf::NamedNodeRef;

    pub const XBRLL: &str = "https://w3id.org/vocab/xbrll#";

    pub const REPORT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#Report");
    pub const FACT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#Fact");
    pub const HAS_FACT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#hasFact");
    pub const CONCEPT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#concept");
    pub const VALUE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#value");
    pub const DECIMALS: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#decimals");
    pub const UNIT_REF: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#unitRef");
    pub const NUMERATOR: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#numerator");
    pub const DENOMINATOR: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#denominator");
    pub const PERIOD: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#period");
    pub const START_PERIOD: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#startPeriod");
    pub const END_PERIOD: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#endPeriod");
    pub const HAS_ENTITY: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("https://w3id.org/vocab/xbrll#hasEntity");

    pub const SAME_AS: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#sameAs");

    pub const XSD_ID: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#id");
    pub const XSD_ABSTRACT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#abstract");
    pub const XSD_NILLABLE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#nillable");
    pub const XSD_SUBSTITUTION_GROUP: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#substitutionGroup");

    pub const XBRLI_PERIOD_TYPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.xbrl.org/2003/instance#periodType");
    pub const XBRLI_BALANCE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.xbrl.org/2003/instance#balance");

    pub const XLINK_ROLE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/xlink#role");
    pub const XLINK_ARCROLE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/xlink#arcrole");
    pub const XLINK_FROM: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/xlink#from");
    pub const XLINK_TO: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/xlink#to");
    pub const XLINK_PREFERRED_LABEL: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/xlink#preferredLabel");

    pub const LINK_ORDER: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.xbrl.org/2003/linkbase#order");
    pub const LINK_DEFINITION: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.xbrl.org/2003/linkbase#definition");
    pub const LINK_USED_ON: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.xbrl.org/2003/linkbase#usedOn");
    pub const LINK_ROLE_TYPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.xbrl.org/2003/linkbase#roleType");
}

/// Output syntax for the serialized dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum RdfDialect {
    #[default]
    Turtle,
    Trig,
}

impl RdfDialect {
    fn format(self) -> RdfFormat {
        match self {
            RdfDialect::Turtle => RdfFormat::Turtle,
            RdfDialect::Trig => RdfFormat::TriG,
        }
    }
}

/// Namespaces whose element declarations are XBRL plumbing, not reportable
/// concepts.
const EXCLUDED_NAMESPACES: &[&str] = &[
    ns::XSD,
    ns::XBRLI,
    ns::LINK,
    ns::XLINK,
    ns::XL,
    ns::XBRLDT,
    ns::XBRLDI,
    ns::XHTML,
    ns::IX_2013,
    ns::IX_2008,
];

/// Strip date path segments (`/2024`, `/2024-01`, `/2024-01-31`) and a
/// trailing year in the fragment, producing the version-independent twin of a
/// versioned concept URI.
pub fn normalise_uri(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = String::with_capacity(uri.len());
    // Copy whole slices between date segments; the segment boundaries are
    // ASCII ('/' and digits), so slicing stays on UTF-8 boundaries.
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' {
            if let Some(end) = date_segment_end(bytes, i + 1) {
                out.push_str(&uri[copied..i]);
                copied = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&uri[copied..]);

    // Trailing year inside the fragment: ...#NetIncomeLoss2024
    if let Some(hash) = out.find('#') {
        let fragment = &out[hash + 1..];
        let trimmed = fragment.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = fragment.len() - trimmed.len();
        if digits == 4 && !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            out.truncate(hash + 1 + trimmed.len());
        }
    }

    // Dangling slash left before the fragment or at the end.
    if let Some(hash) = out.find('#') {
        if out[..hash].ends_with('/') {
            out.remove(hash - 1);
        }
    } else if out.ends_with('/') {
        out.pop();
    }
    out
}

/// Length check for `\d{4}(-\d{2}){0,2}` starting at `from`.
fn date_segment_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    for _ in 0..4 {
        if i >= bytes.len() || !bytes[i].is_ascii_digit() {
            return None;
        }
        i += 1;
    }
    for _ in 0..2 {
        if bytes.get(i) == Some(&b'-')
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
            && bytes.get(i + 2).is_some_and(u8::is_ascii_digit)
        {
            i += 3;
        }
    }
    Some(i)
}

#[derive(Default)]
struct BnodeAllocator {
    next: u64,
    by_key: AHashMap<String, BlankNode>,
}

/// Triple accumulator with set semantics and stable first-insertion order.
#[derive(Default)]
struct GraphBuf {
    triples: Vec<Triple>,
    seen: AHashSet<Triple>,
}

impl GraphBuf {
    fn add(
        &mut self,
        subject: impl Into<NamedOrBlankNode>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) {
        let subject: NamedOrBlankNode = subject.into();
        let triple = Triple::new(subject, predicate, object);
        if self.seen.insert(triple.clone()) {
            self.triples.push(triple);
        }
    }
}

/// Deterministic triple projector for one conversion run.
#[derive(Default)]
pub struct Projector {
    bnodes: Mutex<BnodeAllocator>,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The blank node for a source entity, minted once per run.
    fn bnode(&self, key: &str) -> BlankNode {
        let mut alloc = self.bnodes.lock();
        if let Some(node) = alloc.by_key.get(key) {
            return node.clone();
        }
        let node = BlankNode::new_unchecked(format!("b{}", alloc.next));
        alloc.next += 1;
        alloc.by_key.insert(key.to_string(), node.clone());
        node
    }

    /// Project a resolved taxonomy: concept declarations, labels, role-type
    /// metadata, and qualified relationship reification.
    pub fn project_taxonomy(&self, taxonomy: &Taxonomy) -> Vec<Triple> {
        let mut graph = GraphBuf::default();

        for concept in taxonomy.concepts.iter() {
            if EXCLUDED_NAMESPACES.contains(&concept.qname.namespace.as_str()) {
                continue;
            }
            let subject = NamedNode::new_unchecked(concept.qname.expanded());

            let normalised = normalise_uri(subject.as_str());
            if normalised != subject.as_str() {
                graph.add(
                    subject.clone(),
                    vocab::SAME_AS,
                    NamedNode::new_unchecked(normalised),
                );
            }
            if let Some(id) = &concept.id {
                graph.add(
                    subject.clone(),
                    vocab::XSD_ID,
                    Literal::new_simple_literal(id.as_str()),
                );
            }
            graph.add(
                subject.clone(),
                rdfs::IS_DEFINED_BY,
                NamedNode::new_unchecked(concept.qname.namespace.as_str()),
            );
            if let Some(concept_type) = &concept.concept_type {
                graph.add(
                    subject.clone(),
                    rdf::TYPE,
                    NamedNode::new_unchecked(concept_type.expanded()),
                );
            }
            graph.add(
                subject.clone(),
                vocab::XSD_ABSTRACT,
                Literal::new_typed_literal(bool_str(concept.is_abstract), xsd::BOOLEAN),
            );
            graph.add(
                subject.clone(),
                vocab::XSD_NILLABLE,
                Literal::new_typed_literal(bool_str(concept.nillable), xsd::BOOLEAN),
            );
            if let Some(group) = &concept.substitution_group {
                graph.add(
                    subject.clone(),
                    vocab::XSD_SUBSTITUTION_GROUP,
                    NamedNode::new_unchecked(group.expanded()),
                );
            }
            if let Some(period_type) = concept.period_type {
                graph.add(
                    subject.clone(),
                    vocab::XBRLI_PERIOD_TYPE,
                    Literal::new_simple_literal(period_type.as_str()),
                );
            }
            if let Some(balance) = concept.balance {
                graph.add(
                    subject.clone(),
                    vocab::XBRLI_BALANCE,
                    Literal::new_simple_literal(balance.as_str()),
                );
            }

            for label in taxonomy.labels(&concept.qname) {
                let role = label.role.as_deref().unwrap_or(ns::STANDARD_LABEL);
                graph.add(
                    subject.clone(),
                    NamedNode::new_unchecked(role),
                    text_literal(&label.text, label.lang.as_deref()),
                );
                if role == ns::STANDARD_LABEL {
                    graph.add(
                        subject.clone(),
                        rdfs::LABEL,
                        text_literal(&label.text, label.lang.as_deref()),
                    );
                }
            }
        }

        for ((link_role, arcrole), rels) in &taxonomy.resolution.networks {
            // Arcs missing either role URI cannot mint valid IRIs.
            if link_role.is_empty() || arcrole.is_empty() {
                continue;
            }
            let link_role_node = NamedNode::new_unchecked(link_role.as_str());
            graph.add(link_role_node.clone(), rdf::TYPE, rdfs::CLASS);
            for role_type in taxonomy.role_types.iter().filter(|r| r.uri == *link_role) {
                graph.add(link_role_node.clone(), rdf::TYPE, vocab::LINK_ROLE_TYPE);
                if let Some(definition) = &role_type.definition {
                    graph.add(
                        link_role_node.clone(),
                        vocab::LINK_DEFINITION,
                        Literal::new_simple_literal(definition.as_str()),
                    );
                }
                if let Some(id) = &role_type.id {
                    graph.add(
                        link_role_node.clone(),
                        vocab::XSD_ID,
                        Literal::new_simple_literal(id.as_str()),
                    );
                }
                for used_on in &role_type.used_on {
                    graph.add(
                        link_role_node.clone(),
                        vocab::LINK_USED_ON,
                        NamedNode::new_unchecked(used_on.expanded()),
                    );
                }
            }

            for rel in rels {
                let source = NamedNode::new_unchecked(rel.source.expanded());
                let arcrole_node = NamedNode::new_unchecked(arcrole.as_str());

                let to_term: Term = match &rel.target {
                    ArcEndpoint::Concept(target) => {
                        let target_node = NamedNode::new_unchecked(target.expanded());
                        graph.add(source.clone(), arcrole_node.clone(), target_node.clone());
                        graph.add(target_node.clone(), rdf::TYPE, link_role_node.clone());
                        target_node.into()
                    }
                    ArcEndpoint::Resource(resource) => {
                        let qualified = self.resource_bnode(&mut graph, rel, resource);
                        graph.add(source.clone(), arcrole_node.clone(), qualified.clone());
                        qualified.into()
                    }
                };
                graph.add(source.clone(), rdf::TYPE, link_role_node.clone());

                // Arc metadata (order, preferredLabel) survives as a
                // qualified reification of the relationship.
                let arc = self.bnode(&format!(
                    "arc|{link_role}|{arcrole}|{}|{}",
                    rel.source.expanded(),
                    rel.target.ident()
                ));
                graph.add(
                    arc.clone(),
                    rdf::TYPE,
                    NamedNode::new_unchecked(rel.link_name.expanded()),
                );
                graph.add(arc.clone(), vocab::XLINK_ARCROLE, arcrole_node);
                graph.add(arc.clone(), vocab::XLINK_FROM, source);
                graph.add(arc.clone(), vocab::XLINK_TO, to_term);
                graph.add(
                    arc.clone(),
                    vocab::LINK_ORDER,
                    Literal::new_typed_literal(format_order(rel.order), xsd::DECIMAL),
                );
                if let Some(preferred) = &rel.preferred_label {
                    graph.add(
                        arc,
                        vocab::XLINK_PREFERRED_LABEL,
                        NamedNode::new_unchecked(preferred.as_str()),
                    );
                }
            }
        }

        debug!(triples = graph.triples.len(), "projected taxonomy");
        graph.triples
    }

    fn resource_bnode(
        &self,
        graph: &mut GraphBuf,
        rel: &crate::model::Relationship,
        resource: &LinkResource,
    ) -> BlankNode {
        let node = self.bnode(&format!(
            "res|{}|{}|{}",
            rel.link_role,
            rel.source.expanded(),
            rel.target.ident()
        ));
        graph.add(
            node.clone(),
            rdf::TYPE,
            NamedNode::new_unchecked(resource.element.expanded()),
        );
        if let Some(role) = &resource.role {
            graph.add(
                node.clone(),
                vocab::XLINK_ROLE,
                NamedNode::new_unchecked(role.as_str()),
            );
        }
        graph.add(
            node.clone(),
            rdf::VALUE,
            text_literal(resource.text.trim(), resource.lang.as_deref()),
        );
        for (part, value) in &resource.parts {
            graph.add(
                node.clone(),
                NamedNode::new_unchecked(part.expanded()),
                Literal::new_simple_literal(value.as_str()),
            );
        }
        node
    }

    /// Project a bound instance: one `xbrll:Fact` per surviving fact, hung
    /// off an `xbrll:Report` named after the document.
    pub fn project_instance(&self, report: &InstanceReport) -> Vec<Triple> {
        let mut graph = GraphBuf::default();
        let report_node = NamedNode::new_unchecked(report.uri.as_str());
        graph.add(report_node.clone(), rdf::TYPE, vocab::REPORT);

        for bound in &report.facts {
            let key = format!(
                "fact|{}|{}|{}|{}|{}",
                report.uri,
                bound.fact.concept.expanded(),
                bound.fact.context_ref,
                bound.fact.unit_ref.as_deref().unwrap_or(""),
                bound.fact.value.as_deref().unwrap_or("")
            );
            let fact = self.bnode(&key);
            graph.add(fact.clone(), rdf::TYPE, vocab::FACT);
            graph.add(report_node.clone(), vocab::HAS_FACT, fact.clone());
            graph.add(
                fact.clone(),
                vocab::CONCEPT,
                NamedNode::new_unchecked(bound.fact.concept.expanded()),
            );

            if let Some(value) = &bound.fact.value {
                graph.add(
                    fact.clone(),
                    vocab::VALUE,
                    typed_value(value, bound.concept.concept_type.as_ref()),
                );
            }
            if let Some(decimals) = bound.fact.decimals {
                let literal = match decimals {
                    Decimals::Finite(n) => Literal::new_typed_literal(n.to_string(), xsd::INTEGER),
                    Decimals::Infinite => Literal::new_typed_literal("INF", xsd::STRING),
                };
                graph.add(fact.clone(), vocab::DECIMALS, literal);
            }

            for dimension in &bound.context.dimensions {
                match dimension {
                    crate::model::DimensionValue::Explicit { dimension, member } => {
                        graph.add(
                            fact.clone(),
                            NamedNode::new_unchecked(dimension.expanded()),
                            NamedNode::new_unchecked(member.expanded()),
                        );
                    }
                    crate::model::DimensionValue::Typed { dimension, value } => {
                        graph.add(
                            fact.clone(),
                            NamedNode::new_unchecked(dimension.expanded()),
                            Literal::new_simple_literal(value.as_str()),
                        );
                    }
                }
            }

            let entity = &bound.context.entity;
            if !entity.identifier.is_empty() {
                graph.add(
                    fact.clone(),
                    vocab::HAS_ENTITY,
                    NamedNode::new_unchecked(format!(
                        "{}{}",
                        entity.scheme.trim(),
                        entity.identifier.trim()
                    )),
                );
            }

            match &bound.context.period {
                Period::Instant(instant) => {
                    graph.add(
                        fact.clone(),
                        vocab::PERIOD,
                        Literal::new_typed_literal(instant.format("%Y-%m-%d").to_string(), xsd::DATE),
                    );
                }
                Period::Duration { start, end } => {
                    let period = self.bnode(&format!("{key}|period"));
                    graph.add(fact.clone(), vocab::PERIOD, period.clone());
                    graph.add(
                        period.clone(),
                        vocab::START_PERIOD,
                        Literal::new_typed_literal(start.format("%Y-%m-%d").to_string(), xsd::DATE),
                    );
                    graph.add(
                        period,
                        vocab::END_PERIOD,
                        Literal::new_typed_literal(end.format("%Y-%m-%d").to_string(), xsd::DATE),
                    );
                }
                Period::Forever => {}
            }

            if let Some(unit) = &bound.unit {
                match &unit.measure {
                    UnitMeasure::Simple(measures) => {
                        for measure in measures {
                            graph.add(
                                fact.clone(),
                                vocab::UNIT_REF,
                                NamedNode::new_unchecked(measure.expanded()),
                            );
                        }
                    }
                    UnitMeasure::Divide {
                        numerators,
                        denominators,
                    } => {
                        let unit_node = self.bnode(&format!("{key}|unit"));
                        graph.add(fact.clone(), vocab::UNIT_REF, unit_node.clone());
                        for measure in numerators {
                            graph.add(
                                unit_node.clone(),
                                vocab::NUMERATOR,
                                NamedNode::new_unchecked(measure.expanded()),
                            );
                        }
                        for measure in denominators {
                            graph.add(
                                unit_node.clone(),
                                vocab::DENOMINATOR,
                                NamedNode::new_unchecked(measure.expanded()),
                            );
                        }
                    }
                }
            }
        }

        debug!(triples = graph.triples.len(), "projected instance");
        graph.triples
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Integral orders print without the fractional part quick-xml preserved.
fn format_order(order: f64) -> String {
    if order.fract() == 0.0 && order.abs() < 1e15 {
        format!("{}", order as i64)
    } else {
        format!("{order}")
    }
}

fn text_literal(text: &str, lang: Option<&str>) -> Literal {
    match lang {
        Some(lang) => Literal::new_language_tagged_literal(text, lang.to_ascii_lowercase())
            .unwrap_or_else(|_| Literal::new_simple_literal(text)),
        None => Literal::new_simple_literal(text),
    }
}

/// Map a fact value to a typed literal by the concept's xbrli item type,
/// leaving unknown types as plain literals.
fn typed_value(value: &str, concept_type: Option<&QName>) -> Literal {
    let local = match concept_type {
        Some(t) if t.namespace == ns::XBRLI => t.local.as_str(),
        _ => return Literal::new_simple_literal(value),
    };
    match local {
        "booleanItemType" => Literal::new_typed_literal(bool_str(value == "true"), xsd::BOOLEAN),
        "monetaryItemType" | "decimalItemType" | "sharesItemType" | "pureItemType" => {
            Literal::new_typed_literal(value, xsd::DECIMAL)
        }
        "dateItemType" => {
            let date = value.split('T').next().unwrap_or(value);
            Literal::new_typed_literal(date, xsd::DATE)
        }
        "durationItemType" => Literal::new_typed_literal(value, xsd::DURATION),
        _ => Literal::new_simple_literal(value),
    }
}

/// Serialize triples to the writer in the requested dialect. For TriG the
/// whole projection lands in one named graph.
pub fn serialize<W: Write>(
    triples: &[Triple],
    dialect: RdfDialect,
    graph: Option<&NamedNode>,
    writer: W,
) -> Result<W> {
    let mut serializer = RdfSerializer::from_format(dialect.format()).for_writer(writer);
    match (dialect, graph) {
        (RdfDialect::Trig, Some(graph)) => {
            for triple in triples {
                let quad = Quad::new(
                    triple.subject.clone(),
                    triple.predicate.clone(),
                    triple.object.clone(),
                    GraphName::NamedNode(graph.clone()),
                );
                serializer.serialize_quad(&quad)?;
            }
        }
        _ => {
            for triple in triples {
                serializer.serialize_triple(triple)?;
            }
        }
    }
    serializer.finish().map_err(Error::Io)
}

/// Serialize to an in-memory string.
pub fn to_string(triples: &[Triple], dialect: RdfDialect, graph: Option<&NamedNode>) -> Result<String> {
    let buffer = serialize(triples, dialect, graph, Vec::new())?;
    String::from_utf8(buffer).map_err(|e| Error::Rdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::BoundFact;
    use crate::model::{Concept, Context, Entity, Fact, Unit};
    use chrono::NaiveDate;
    use compact_str::CompactString;
    use pretty_assertions::assert_eq;
    use url::Url;

    #[test]
    fn normalise_uri_strips_date_segments() {
        assert_eq!(
            normalise_uri("http://fasb.org/us-gaap/2024#NetIncomeLoss"),
            "http://fasb.org/us-gaap#NetIncomeLoss"
        );
        assert_eq!(
            normalise_uri("http://example.org/tax/2024-01-31/schema"),
            "http://example.org/tax/schema"
        );
        assert_eq!(
            normalise_uri("http://example.org/roles#Assets2024"),
            "http://example.org/roles#Assets"
        );
        // No date, nothing changes.
        assert_eq!(
            normalise_uri("http://example.org/plain#Thing"),
            "http://example.org/plain#Thing"
        );
    }

    #[test]
    fn normalise_uri_preserves_non_ascii_iris() {
        assert_eq!(
            normalise_uri("http://exämple.org/täx#Thing"),
            "http://exämple.org/täx#Thing"
        );
        assert_eq!(
            normalise_uri("http://exämple.org/täx/2024#Vermögen"),
            "http://exämple.org/täx#Vermögen"
        );
    }

    #[test]
    fn bnodes_are_stable_within_a_run() {
        let projector = Projector::new();
        let a = projector.bnode("fact|x");
        let b = projector.bnode("fact|y");
        let again = projector.bnode("fact|x");
        assert_eq!(a, again);
        assert_ne!(a, b);
    }

    fn sample_report() -> InstanceReport {
        let concept = QName::new("http://fasb.org/us-gaap/2024", "NetIncomeLoss");
        InstanceReport {
            uri: Url::parse("file:///t/report.xml").unwrap(),
            facts: vec![BoundFact {
                fact: Fact {
                    concept: concept.clone(),
                    context_ref: CompactString::from("c1"),
                    unit_ref: Some(CompactString::from("usd")),
                    value: Some("21448000000.0".to_string()),
                    decimals: Some(Decimals::Finite(-6)),
                    precision: None,
                    nil: false,
                },
                concept: Concept {
                    qname: concept,
                    id: None,
                    concept_type: Some(QName::new(ns::XBRLI, "monetaryItemType")),
                    substitution_group: Some(QName::new(ns::XBRLI, "item")),
                    is_abstract: false,
                    nillable: true,
                    period_type: Some(crate::model::PeriodType::Instant),
                    balance: None,
                },
                context: Context {
                    id: CompactString::from("c1"),
                    entity: Entity {
                        scheme: CompactString::from("http://www.sec.gov/CIK"),
                        identifier: CompactString::from("CIK0000320193"),
                    },
                    period: Period::Instant(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()),
                    dimensions: Vec::new(),
                },
                unit: Some(Unit {
                    id: CompactString::from("usd"),
                    measure: UnitMeasure::Simple(vec![QName::new(
                        "http://www.xbrl.org/2003/iso4217",
                        "USD",
                    )]),
                }),
            }],
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn instance_projection_emits_one_fact_with_value_and_period() {
        let projector = Projector::new();
        let triples = projector.project_instance(&sample_report());

        let fact_type_count = triples
            .iter()
            .filter(|t| t.predicate == rdf::TYPE && t.object == Term::from(vocab::FACT))
            .count();
        assert_eq!(fact_type_count, 1);

        let value = triples
            .iter()
            .find(|t| t.predicate == vocab::VALUE)
            .expect("value triple");
        assert_eq!(
            value.object,
            Term::from(Literal::new_typed_literal("21448000000.0", xsd::DECIMAL))
        );

        let decimals = triples
            .iter()
            .find(|t| t.predicate == vocab::DECIMALS)
            .expect("decimals triple");
        assert_eq!(
            decimals.object,
            Term::from(Literal::new_typed_literal("-6", xsd::INTEGER))
        );

        let period = triples
            .iter()
            .find(|t| t.predicate == vocab::PERIOD)
            .expect("period triple");
        assert_eq!(
            period.object,
            Term::from(Literal::new_typed_literal("2024-06-30", xsd::DATE))
        );

        let unit = triples
            .iter()
            .find(|t| t.predicate == vocab::UNIT_REF)
            .expect("unit triple");
        assert_eq!(
            unit.object,
            Term::from(NamedNode::new_unchecked(
                "http://www.xbrl.org/2003/iso4217#USD"
            ))
        );

        let entity = triples
            .iter()
            .find(|t| t.predicate == vocab::HAS_ENTITY)
            .expect("entity triple");
        assert_eq!(
            entity.object,
            Term::from(NamedNode::new_unchecked(
                "http://www.sec.gov/CIKCIK0000320193"
            ))
        );
    }

    #[test]
    fn projecting_twice_reuses_the_same_fact_bnode() {
        let projector = Projector::new();
        let report = sample_report();
        let first = projector.project_instance(&report);
        let second = projector.project_instance(&report);
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_to_turtle_text() {
        let projector = Projector::new();
        let triples = projector.project_instance(&sample_report());
        let text = to_string(&triples, RdfDialect::Turtle, None).unwrap();
        assert!(text.contains("xbrll#Fact"));
        assert!(text.contains("21448000000.0"));
    }

    #[test]
    fn trig_output_names_the_graph() {
        let projector = Projector::new();
        let triples = projector.project_instance(&sample_report());
        let graph = NamedNode::new_unchecked("file:///t/report.xml");
        let text = to_string(&triples, RdfDialect::Trig, Some(&graph)).unwrap();
        assert!(text.contains("file:///t/report.xml"));
    }
}
