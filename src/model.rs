//! Core data model shared by the taxonomy and instance resolvers.
//!
//! XLink's loosely-typed attribute bag is narrowed into the closed set of
//! types below at the parser boundary; resolution logic never sees raw
//! attribute maps.

use chrono::NaiveDate;
use compact_str::CompactString;

/// Well-known XBRL namespace and role URIs.
pub mod ns {
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";
    pub const XBRLI: &str = "http://www.xbrl.org/2003/instance";
    pub const LINK: &str = "http://www.xbrl.org/2003/linkbase";
    pub const XLINK: &str = "http://www.w3.org/1999/xlink";
    pub const XL: &str = "http://www.xbrl.org/2003/XLink";
    pub const XBRLDT: &str = "http://xbrl.org/2005/xbrldt";
    pub const XBRLDI: &str = "http://xbrl.org/2006/xbrldi";
    pub const XHTML: &str = "http://www.w3.org/1999/xhtml";
    pub const IX_2013: &str = "http://www.xbrl.org/2013/inlineXBRL";
    pub const IX_2008: &str = "http://www.xbrl.org/2008/inlineXBRL";

    pub const ARCROLE_CONCEPT_LABEL: &str = "http://www.xbrl.org/2003/arcrole/concept-label";
    pub const ARCROLE_CONCEPT_REFERENCE: &str =
        "http://www.xbrl.org/2003/arcrole/concept-reference";
    pub const ARCROLE_PARENT_CHILD: &str = "http://www.xbrl.org/2003/arcrole/parent-child";
    pub const ARCROLE_HYPERCUBE_DIMENSION: &str =
        "http://xbrl.org/int/dim/arcrole/hypercube-dimension";
    pub const ARCROLE_DIMENSION_DOMAIN: &str = "http://xbrl.org/int/dim/arcrole/dimension-domain";
    pub const ARCROLE_DOMAIN_MEMBER: &str = "http://xbrl.org/int/dim/arcrole/domain-member";

    pub const STANDARD_LABEL: &str = "http://www.xbrl.org/2003/role/label";
}

/// A (namespace, local-name) pair identifying a concept, type, or element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: CompactString,
    pub local: CompactString,
}

impl QName {
    pub fn new(namespace: impl Into<CompactString>, local: impl Into<CompactString>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Expanded URI form used for RDF minting: `namespace#localName`.
    pub fn expanded(&self) -> String {
        let ns = self.namespace.trim_end_matches('#');
        format!("{}#{}", ns, self.local)
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expanded())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Instant,
    Duration,
}

impl PeriodType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instant" => Some(PeriodType::Instant),
            "duration" => Some(PeriodType::Duration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Instant => "instant",
            PeriodType::Duration => "duration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    Debit,
    Credit,
}

impl Balance {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(Balance::Debit),
            "credit" => Some(Balance::Credit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Balance::Debit => "debit",
            Balance::Credit => "credit",
        }
    }
}

/// A concept declaration extracted from a taxonomy schema.
///
/// Immutable once indexed; relationships, labels, references, and facts
/// refer to it by `qname`.
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub qname: QName,
    /// Schema element `id` attribute; locators address concepts by it.
    pub id: Option<CompactString>,
    pub concept_type: Option<QName>,
    pub substitution_group: Option<QName>,
    pub is_abstract: bool,
    pub nillable: bool,
    pub period_type: Option<PeriodType>,
    pub balance: Option<Balance>,
}

/// A `link:roleType` declaration.
#[derive(Debug, Clone)]
pub struct RoleType {
    pub uri: CompactString,
    pub id: Option<CompactString>,
    pub definition: Option<String>,
    pub used_on: Vec<QName>,
}

/// A `link:arcroleType` declaration.
#[derive(Debug, Clone)]
pub struct ArcroleType {
    pub uri: CompactString,
    pub id: Option<CompactString>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArcUse {
    #[default]
    Optional,
    Prohibited,
}

/// An inline XLink resource (label or reference content).
#[derive(Debug, Clone, PartialEq)]
pub struct LinkResource {
    /// Element qname of the resource, e.g. `link:label`.
    pub element: QName,
    pub role: Option<CompactString>,
    pub lang: Option<CompactString>,
    pub text: String,
    /// Reference parts, in document order.
    pub parts: Vec<(QName, String)>,
}

/// Either end of an arc after locator/resource indirection is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ArcEndpoint {
    Concept(QName),
    Resource(LinkResource),
}

impl ArcEndpoint {
    /// Stable identifier used for deterministic ordering and warnings.
    pub fn ident(&self) -> String {
        match self {
            ArcEndpoint::Concept(q) => q.expanded(),
            ArcEndpoint::Resource(r) => {
                let mut id = format!(
                    "{}|{}|{}",
                    r.role.as_deref().unwrap_or(""),
                    r.lang.as_deref().unwrap_or(""),
                    r.text
                );
                for (name, value) in &r.parts {
                    id.push('|');
                    id.push_str(&name.expanded());
                    id.push('=');
                    id.push_str(value);
                }
                id
            }
        }
    }
}

/// A fully resolved arc declaration, the unit of conflict for the
/// effective-relationship algorithm.
#[derive(Debug, Clone)]
pub struct Arc {
    /// Extended link element, e.g. `link:presentationLink`.
    pub link_name: QName,
    /// Extended-link-role URI scoping equivalence and override.
    pub link_role: CompactString,
    pub arcrole: CompactString,
    pub source: QName,
    pub target: ArcEndpoint,
    pub order: f64,
    pub weight: Option<f64>,
    pub priority: i32,
    pub arc_use: ArcUse,
    pub preferred_label: Option<CompactString>,
    /// (DTS discovery index of the origin document, arc sequence within it).
    /// The deterministic tie-break for ambiguous arc sets.
    pub doc_order: (u32, u32),
}

/// An effective relationship that survived prohibition/override resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub link_name: QName,
    pub link_role: CompactString,
    pub arcrole: CompactString,
    pub source: QName,
    pub target: ArcEndpoint,
    pub order: f64,
    pub weight: Option<f64>,
    pub preferred_label: Option<CompactString>,
}

// ---------------------------------------------------------------------------
// Instance model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub scheme: CompactString,
    pub identifier: CompactString,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Period {
    Instant(NaiveDate),
    Duration { start: NaiveDate, end: NaiveDate },
    Forever,
}

impl Period {
    pub fn kind(&self) -> PeriodType {
        match self {
            Period::Instant(_) => PeriodType::Instant,
            _ => PeriodType::Duration,
        }
    }
}

/// One dimension binding inside a context segment or scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionValue {
    Explicit { dimension: QName, member: QName },
    Typed { dimension: QName, value: String },
}

/// A reporting context. Contexts with identical content remain distinct
/// entities; no canonicalization is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub id: CompactString,
    pub entity: Entity,
    pub period: Period,
    /// Segment and scenario members, in document order.
    pub dimensions: Vec<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitMeasure {
    Simple(Vec<QName>),
    Divide {
        numerators: Vec<QName>,
        denominators: Vec<QName>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: CompactString,
    pub measure: UnitMeasure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decimals {
    Finite(i32),
    Infinite,
}

impl Decimals {
    pub fn parse(s: &str) -> Option<Self> {
        if s == "INF" {
            Some(Decimals::Infinite)
        } else {
            s.parse().ok().map(Decimals::Finite)
        }
    }
}

/// A reported fact, bound to exactly one context and, if numeric, one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub concept: QName,
    pub context_ref: CompactString,
    pub unit_ref: Option<CompactString>,
    /// `None` for nil facts.
    pub value: Option<String>,
    pub decimals: Option<Decimals>,
    pub precision: Option<CompactString>,
    pub nil: bool,
}
