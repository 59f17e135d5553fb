//! xbrlld - Convert XBRL taxonomies and instance documents to RDF
//!
//! Licensed under AGPL-3.0
//!
//! The crate resolves the full Discoverable Taxonomy Set (DTS) behind an
//! entry schema, computes effective relationship networks per XBRL 2.1
//! prohibition/override semantics, binds instance facts to resolved
//! concepts, and projects the result as RDF (Turtle or TriG).

pub mod dts;
pub mod instance;
pub mod linkbase;
pub mod model;
pub mod rdf;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod taxonomy;

pub use instance::{Instance, InstanceReport};
pub use model::{Concept, Fact, QName, Relationship};
pub use rdf::{Projector, RdfDialect};
pub use session::{CancelToken, Session};
pub use taxonomy::Taxonomy;

use std::path::PathBuf;
use std::time::Duration;

/// Configuration accepted from the caller for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Output RDF dialect.
    pub dialect: RdfDialect,
    /// Include the referenced taxonomy's graph alongside instance facts.
    pub with_taxonomy: bool,
    /// Directory holding pre-fetched copies of remote documents.
    pub cache_dir: Option<PathBuf>,
    /// Abort the run once this much time has elapsed.
    pub timeout: Option<Duration>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            dialect: RdfDialect::Turtle,
            with_taxonomy: false,
            cache_dir: None,
            timeout: None,
        }
    }
}

/// Counters reported alongside a conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionStats {
    pub documents: usize,
    pub concepts: usize,
    pub relationships: usize,
    pub contexts: usize,
    pub units: usize,
    pub facts: usize,
    pub triples: usize,
}

/// Outcome of a one-call conversion.
///
/// `Err` means the run could not produce output at all (unreachable entry
/// point, unparseable instance, cancellation). A non-empty `errors` on `Ok`
/// means partial success: output was produced, but structural defects or
/// per-fact binding failures were skipped along the way.
#[derive(Debug)]
pub struct Conversion {
    /// Serialized RDF in the requested dialect.
    pub rdf: String,
    pub warnings: Vec<Warning>,
    pub errors: Vec<Error>,
    pub stats: ConversionStats,
}

fn make_session(options: &ConvertOptions) -> Session {
    let cancel = match options.timeout {
        Some(timeout) => CancelToken::with_deadline(timeout),
        None => CancelToken::new(),
    };
    Session::new(
        Box::new(session::FileFetcher::new(options.cache_dir.clone())),
        cancel,
    )
}

/// One-call conversion of a taxonomy entry point to serialized RDF.
pub fn convert_taxonomy(locator: &str, options: &ConvertOptions) -> Result<Conversion> {
    let session = make_session(options);
    let entry = session::locator_to_url(locator)?;
    let mut taxonomy = Taxonomy::load(&entry, &session)?;
    let warnings = std::mem::take(&mut taxonomy.warnings);
    let errors = std::mem::take(&mut taxonomy.errors);

    let projector = Projector::new();
    let triples = projector.project_taxonomy(&taxonomy);
    let graph = oxrdf::NamedNode::new_unchecked(entry.as_str());
    let rdf = rdf::to_string(&triples, options.dialect, Some(&graph))?;
    Ok(Conversion {
        rdf,
        warnings,
        errors,
        stats: ConversionStats {
            documents: taxonomy.dts.len(),
            concepts: taxonomy.concepts.len(),
            relationships: taxonomy.resolution.relationship_count(),
            triples: triples.len(),
            ..ConversionStats::default()
        },
    })
}

/// One-call conversion of an instance document to serialized RDF. The
/// taxonomies behind its `schemaRef`s are resolved for fact binding.
pub fn convert_instance(locator: &str, options: &ConvertOptions) -> Result<Conversion> {
    let session = make_session(options);
    let uri = session::locator_to_url(locator)?;
    let doc = session.document(&uri)?;
    let instance = Instance::parse(&doc)?;

    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let mut taxonomies = Vec::new();
    for schema_ref in &instance.schema_refs {
        let mut taxonomy = Taxonomy::load(schema_ref, &session)?;
        warnings.append(&mut taxonomy.warnings);
        errors.append(&mut taxonomy.errors);
        taxonomies.push(taxonomy);
    }
    let refs: Vec<&Taxonomy> = taxonomies.iter().collect();
    let mut report = instance.bind(&refs);
    warnings.append(&mut report.warnings);
    errors.append(&mut report.errors);

    let projector = Projector::new();
    let mut triples = projector.project_instance(&report);
    if options.with_taxonomy {
        for taxonomy in &taxonomies {
            triples.extend(projector.project_taxonomy(taxonomy));
        }
    }
    let graph = oxrdf::NamedNode::new_unchecked(uri.as_str());
    let rdf = rdf::to_string(&triples, options.dialect, Some(&graph))?;
    Ok(Conversion {
        rdf,
        warnings,
        errors,
        stats: ConversionStats {
            contexts: instance.contexts.len(),
            units: instance.units.len(),
            facts: report.facts.len(),
            triples: triples.len(),
            ..ConversionStats::default()
        },
    })
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreachable document {uri}: {reason}")]
    UnreachableDocument { uri: String, reason: String },

    #[error("cyclic import with no forward progress at {0}")]
    CyclicImport(String),

    #[error("malformed declaration in {uri}: {reason}")]
    MalformedDeclaration { uri: String, reason: String },

    #[error("unresolved locator '{label}' in extended link {role} of {uri}")]
    UnresolvedLocator {
        uri: String,
        role: String,
        label: String,
    },

    #[error("unknown concept {0}")]
    UnknownConcept(QName),

    #[error("unknown contextRef '{0}'")]
    UnknownContextRef(String),

    #[error("unknown unitRef '{0}'")]
    UnknownUnitRef(String),

    #[error("conversion cancelled")]
    Cancelled,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("RDF serialization error: {0}")]
    Rdf(String),
}

/// Non-fatal findings collected while resolving a DTS or an instance.
///
/// Ambiguous inputs are common in real-world taxonomies; they are reported
/// and resolved with a documented deterministic tie-break, never raised as
/// hard failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Two declarations of the same concept disagree on attributes; the
    /// first-discovered declaration wins.
    DuplicateConcept { qname: QName, uri: String },
    /// Arcs at equal maximal priority disagree on order/weight without a
    /// prohibition; the arc from the first-discovered document wins.
    AmbiguousArcSet {
        link_role: String,
        arcrole: String,
        source: QName,
        target: String,
    },
    /// A fact's context period kind does not match its concept's period type.
    PeriodTypeMismatch { concept: QName, context: String },
    /// A context carries a dimension member outside the taxonomy's
    /// domain-member subgraph.
    DimensionMismatch {
        dimension: QName,
        member: QName,
        context: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DuplicateConcept { qname, uri } => {
                write!(f, "duplicate concept {qname} redeclared with conflicting attributes in {uri}; first declaration kept")
            }
            Warning::AmbiguousArcSet {
                link_role,
                arcrole,
                source,
                target,
            } => {
                write!(f, "ambiguous arcs for ({link_role}, {arcrole}) {source} -> {target}; first-discovered arc kept")
            }
            Warning::PeriodTypeMismatch { concept, context } => {
                write!(
                    f,
                    "period kind of context '{context}' does not match periodType of {concept}"
                )
            }
            Warning::DimensionMismatch {
                dimension,
                member,
                context,
            } => {
                write!(
                    f,
                    "context '{context}' uses member {member} outside the domain of dimension {dimension}"
                )
            }
        }
    }
}
