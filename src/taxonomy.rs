//! The resolved in-memory taxonomy: concepts, effective relationship
//! networks, labels, references, and the dimensional subgraph.
//!
//! `Taxonomy::load` orchestrates discovery, schema indexing, linkbase
//! parsing, and relationship resolution. Fetch failures during discovery are
//! fatal; structural defects in individual documents are aggregated in
//! `errors` while the rest of the DTS continues to resolve.

use ahash::AHashSet;
use tracing::{debug, warn};
use url::Url;

use crate::dts::{self, Dts};
use crate::model::{ns, ArcEndpoint, ArcroleType, Concept, LinkResource, QName, Relationship, RoleType};
use crate::resolver::{self, Resolution};
use crate::schema::{self, ConceptTable};
use crate::session::{DocKind, Session};
use crate::{linkbase, Error, Result, Warning};

pub struct Taxonomy {
    pub entry: Url,
    pub dts: Dts,
    pub concepts: ConceptTable,
    pub resolution: Resolution,
    pub role_types: Vec<RoleType>,
    pub arcrole_types: Vec<ArcroleType>,
    /// Non-fatal findings: duplicate concepts, ambiguous arc sets.
    pub warnings: Vec<Warning>,
    /// Structural defects aggregated across the DTS: malformed declarations,
    /// unresolved locators, dangling relationship endpoints.
    pub errors: Vec<Error>,
}

impl Taxonomy {
    /// Discover, index, parse, and resolve the DTS behind an entry point.
    pub fn load(entry: &Url, session: &Session) -> Result<Taxonomy> {
        let dts = dts::discover(entry, session)?;
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let mut concepts = ConceptTable::default();
        let mut role_types: Vec<RoleType> = Vec::new();
        let mut arcrole_types: Vec<ArcroleType> = Vec::new();
        for doc in &dts.documents {
            if doc.kind != DocKind::Schema {
                continue;
            }
            match schema::index(doc) {
                Ok(mut index) => {
                    role_types.append(&mut index.role_types);
                    arcrole_types.append(&mut index.arcrole_types);
                    concepts.merge(&doc.uri, index, &mut warnings);
                }
                Err(e) => {
                    warn!(uri = %doc.uri, error = %e, "schema failed to index");
                    errors.push(e);
                }
            }
        }

        session.check_cancel()?;

        let mut arcs = Vec::new();
        for doc in &dts.documents {
            if doc.kind != DocKind::Linkbase {
                continue;
            }
            let doc_index = dts.index_of(&doc.uri).unwrap_or(u32::MAX);
            match linkbase::parse(doc, doc_index, &concepts) {
                Ok(parsed) => {
                    errors.extend(parsed.dangling);
                    for link in parsed.links {
                        arcs.extend(link.arcs);
                    }
                }
                Err(e) => {
                    warn!(uri = %doc.uri, error = %e, "linkbase failed to parse");
                    errors.push(e);
                }
            }
        }

        session.check_cancel()?;
        let mut resolution = resolver::resolve(arcs);
        warnings.append(&mut resolution.warnings);

        let mut taxonomy = Taxonomy {
            entry: entry.clone(),
            dts,
            concepts,
            resolution,
            role_types,
            arcrole_types,
            warnings,
            errors,
        };
        taxonomy.check_endpoints();
        debug!(
            concepts = taxonomy.concepts.len(),
            relationships = taxonomy.resolution.relationship_count(),
            errors = taxonomy.errors.len(),
            "taxonomy loaded"
        );
        Ok(taxonomy)
    }

    /// Every effective relationship endpoint must exist in the merged
    /// concept table; violations are resolution errors, never dropped.
    fn check_endpoints(&mut self) {
        let mut missing = Vec::new();
        for rels in self.resolution.networks.values() {
            for rel in rels {
                if !self.concepts.contains(&rel.source) {
                    missing.push(rel.source.clone());
                }
                if let ArcEndpoint::Concept(target) = &rel.target {
                    if !self.concepts.contains(target) {
                        missing.push(target.clone());
                    }
                }
            }
        }
        for qname in missing {
            self.errors.push(Error::UnknownConcept(qname));
        }
    }

    pub fn concept(&self, qname: &QName) -> Option<&Concept> {
        self.concepts.get(qname)
    }

    /// Label resources attached to a concept via concept-label arcs.
    pub fn labels<'a>(&'a self, concept: &QName) -> impl Iterator<Item = &'a LinkResource> {
        self.resources_for(concept, ns::ARCROLE_CONCEPT_LABEL)
    }

    /// Reference resources attached to a concept via concept-reference arcs.
    pub fn references<'a>(&'a self, concept: &QName) -> impl Iterator<Item = &'a LinkResource> {
        self.resources_for(concept, ns::ARCROLE_CONCEPT_REFERENCE)
    }

    fn resources_for<'a>(
        &'a self,
        concept: &QName,
        arcrole: &'a str,
    ) -> impl Iterator<Item = &'a LinkResource> {
        let concept = concept.clone();
        self.resolution
            .by_arcrole(arcrole)
            .filter(move |rel| rel.source == concept)
            .filter_map(|rel| match &rel.target {
                ArcEndpoint::Resource(r) => Some(r),
                ArcEndpoint::Concept(_) => None,
            })
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.resolution.networks.values().flatten()
    }

    /// Dimension concepts of the definition subgraph: targets of
    /// hypercube-dimension arcs plus anything declared in the
    /// `xbrldt:dimensionItem` substitution group.
    pub fn dimensions(&self) -> AHashSet<QName> {
        let mut dims: AHashSet<QName> = self
            .resolution
            .by_arcrole(ns::ARCROLE_HYPERCUBE_DIMENSION)
            .filter_map(|rel| match &rel.target {
                ArcEndpoint::Concept(q) => Some(q.clone()),
                _ => None,
            })
            .collect();
        for concept in self.concepts.iter() {
            if let Some(sg) = &concept.substitution_group {
                if sg.namespace == ns::XBRLDT && sg.local == "dimensionItem" {
                    dims.insert(concept.qname.clone());
                }
            }
        }
        dims
    }

    /// Transitive member domain of a dimension: dimension-domain targets
    /// expanded through domain-member arcs. Cycles in authored taxonomies
    /// are tolerated via the visited set.
    pub fn dimension_domain(&self, dimension: &QName) -> AHashSet<QName> {
        let mut members = AHashSet::new();
        let mut frontier: Vec<QName> = self
            .resolution
            .by_arcrole(ns::ARCROLE_DIMENSION_DOMAIN)
            .filter(|rel| &rel.source == dimension)
            .filter_map(|rel| match &rel.target {
                ArcEndpoint::Concept(q) => Some(q.clone()),
                _ => None,
            })
            .collect();
        while let Some(concept) = frontier.pop() {
            if !members.insert(concept.clone()) {
                continue;
            }
            for rel in self.resolution.by_arcrole(ns::ARCROLE_DOMAIN_MEMBER) {
                if rel.source == concept {
                    if let ArcEndpoint::Concept(q) = &rel.target {
                        frontier.push(q.clone());
                    }
                }
            }
        }
        members
    }
}
