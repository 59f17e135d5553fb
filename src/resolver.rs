//! Effective-relationship resolution per XBRL 2.1 prohibition/override
//! semantics.
//!
//! For each (extended-link-role, arcrole) network, arcs are hash-grouped by
//! (source, target) signature in a single pass. Within a signature group the
//! maximum priority wins, a prohibition at that priority suppresses the
//! relationship, and residual order/weight disagreement is reported and
//! broken deterministically in favor of the arc from the first document in
//! DTS discovery order.

use std::collections::BTreeMap;

use ahash::AHashMap;
use compact_str::CompactString;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::model::{Arc, ArcUse, QName, Relationship};
use crate::Warning;

/// (extended-link-role, arcrole) identifying one relationship network.
pub type NetworkKey = (CompactString, CompactString);

/// The resolved, deduplicated, conflict-free relationship networks of a DTS.
///
/// Networks are keyed and iterated in sorted order; relationships within a
/// network are sorted by `order` ascending, ties broken by target identifier,
/// so repeated resolutions of the same inputs are byte-identical.
#[derive(Debug, Default)]
pub struct Resolution {
    pub networks: BTreeMap<NetworkKey, Vec<Relationship>>,
    pub warnings: Vec<Warning>,
}

impl Resolution {
    pub fn network(&self, link_role: &str, arcrole: &str) -> &[Relationship] {
        self.networks
            .get(&(CompactString::from(link_role), CompactString::from(arcrole)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All relationships carrying the given arcrole, across link roles.
    pub fn by_arcrole<'a>(&'a self, arcrole: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.networks
            .iter()
            .filter(move |((_, a), _)| a.as_str() == arcrole)
            .flat_map(|(_, rels)| rels.iter())
    }

    pub fn relationship_count(&self) -> usize {
        self.networks.values().map(Vec::len).sum()
    }
}

/// Resolve all arcs of a DTS into effective relationship networks.
///
/// Each network is independent; with the `parallel` feature resolution is
/// sharded across networks.
pub fn resolve(arcs: Vec<Arc>) -> Resolution {
    let mut networks: BTreeMap<NetworkKey, Vec<Arc>> = BTreeMap::new();
    for arc in arcs {
        networks
            .entry((arc.link_role.clone(), arc.arcrole.clone()))
            .or_default()
            .push(arc);
    }

    let entries: Vec<(NetworkKey, Vec<Arc>)> = networks.into_iter().collect();

    #[cfg(feature = "parallel")]
    let resolved: Vec<(NetworkKey, Vec<Relationship>, Vec<Warning>)> = entries
        .into_par_iter()
        .map(|(key, arcs)| {
            let (rels, warnings) = resolve_network(&key, arcs);
            (key, rels, warnings)
        })
        .collect();

    #[cfg(not(feature = "parallel"))]
    let resolved: Vec<(NetworkKey, Vec<Relationship>, Vec<Warning>)> = entries
        .into_iter()
        .map(|(key, arcs)| {
            let (rels, warnings) = resolve_network(&key, arcs);
            (key, rels, warnings)
        })
        .collect();

    let mut out = Resolution::default();
    for (key, rels, warnings) in resolved {
        debug!(
            link_role = %key.0,
            arcrole = %key.1,
            relationships = rels.len(),
            "resolved network"
        );
        out.networks.insert(key, rels);
        out.warnings.extend(warnings);
    }
    out
}

/// Resolve one (link-role, arcrole) network. Linear in arc count: one
/// grouping pass, one pass per signature group.
fn resolve_network(key: &NetworkKey, mut arcs: Vec<Arc>) -> (Vec<Relationship>, Vec<Warning>) {
    // Group in discovery order so signature iteration, and therefore
    // warning emission and tie-breaking, is reproducible.
    arcs.sort_by_key(|a| a.doc_order);

    let mut groups: AHashMap<(QName, String), Vec<Arc>> = AHashMap::new();
    let mut group_order: Vec<(QName, String)> = Vec::new();
    for arc in arcs {
        let sig = (arc.source.clone(), arc.target.ident());
        let slot = groups.entry(sig.clone()).or_default();
        if slot.is_empty() {
            group_order.push(sig);
        }
        slot.push(arc);
    }

    let mut relationships = Vec::new();
    let mut warnings = Vec::new();

    for sig in group_order {
        let group = match groups.remove(&sig) {
            Some(g) => g,
            None => continue,
        };
        let max_priority = group.iter().map(|a| a.priority).max().unwrap_or(0);
        let top: Vec<&Arc> = group
            .iter()
            .filter(|a| a.priority == max_priority)
            .collect();

        // Prohibition wins over any optional arc at the same priority.
        if top.iter().any(|a| a.arc_use == ArcUse::Prohibited) {
            continue;
        }

        // First-discovered arc is the deterministic representative.
        let winner = match top.iter().min_by_key(|a| a.doc_order) {
            Some(w) => *w,
            None => continue,
        };
        let ambiguous = top
            .iter()
            .any(|a| a.order != winner.order || a.weight != winner.weight);
        if ambiguous {
            warnings.push(Warning::AmbiguousArcSet {
                link_role: key.0.to_string(),
                arcrole: key.1.to_string(),
                source: winner.source.clone(),
                target: winner.target.ident(),
            });
        }

        relationships.push(Relationship {
            link_name: winner.link_name.clone(),
            link_role: winner.link_role.clone(),
            arcrole: winner.arcrole.clone(),
            source: winner.source.clone(),
            target: winner.target.clone(),
            order: winner.order,
            weight: winner.weight,
            preferred_label: winner.preferred_label.clone(),
        });
    }

    relationships.sort_by(|a, b| {
        a.order
            .total_cmp(&b.order)
            .then_with(|| a.target.ident().cmp(&b.target.ident()))
            .then_with(|| a.source.cmp(&b.source))
    });
    (relationships, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArcEndpoint, QName};
    use pretty_assertions::assert_eq;

    fn concept(local: &str) -> QName {
        QName::new("urn:test", local)
    }

    fn arc(
        source: &str,
        target: &str,
        order: f64,
        priority: i32,
        arc_use: ArcUse,
        doc_order: (u32, u32),
    ) -> Arc {
        Arc {
            link_name: QName::new("http://www.xbrl.org/2003/linkbase", "presentationLink"),
            link_role: CompactString::from("urn:role/bs"),
            arcrole: CompactString::from("http://www.xbrl.org/2003/arcrole/parent-child"),
            source: concept(source),
            target: ArcEndpoint::Concept(concept(target)),
            order,
            weight: None,
            priority,
            arc_use,
            preferred_label: None,
            doc_order,
        }
    }

    #[test]
    fn prohibition_at_equal_max_priority_yields_nothing() {
        let resolution = resolve(vec![
            arc("A", "B", 1.0, 0, ArcUse::Optional, (0, 0)),
            arc("A", "B", 1.0, 0, ArcUse::Prohibited, (1, 0)),
        ]);
        assert_eq!(resolution.relationship_count(), 0);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn higher_priority_optional_survives_lower_prohibition() {
        let resolution = resolve(vec![
            arc("A", "B", 1.0, 1, ArcUse::Optional, (0, 0)),
            arc("A", "B", 1.0, 0, ArcUse::Prohibited, (1, 0)),
        ]);
        assert_eq!(resolution.relationship_count(), 1);
    }

    #[test]
    fn higher_priority_wins_between_optional_arcs() {
        let resolution = resolve(vec![
            arc("A", "B", 5.0, 0, ArcUse::Optional, (0, 0)),
            arc("A", "B", 9.0, 2, ArcUse::Optional, (1, 0)),
        ]);
        let rels = resolution.network("urn:role/bs", "http://www.xbrl.org/2003/arcrole/parent-child");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].order, 9.0);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn identical_duplicates_collapse_silently() {
        let resolution = resolve(vec![
            arc("A", "B", 2.0, 0, ArcUse::Optional, (0, 0)),
            arc("A", "B", 2.0, 0, ArcUse::Optional, (1, 0)),
        ]);
        assert_eq!(resolution.relationship_count(), 1);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn conflicting_order_at_max_priority_warns_and_keeps_first_discovered() {
        let arcs = vec![
            arc("A", "B", 7.0, 0, ArcUse::Optional, (2, 0)),
            arc("A", "B", 3.0, 0, ArcUse::Optional, (1, 0)),
        ];
        let resolution = resolve(arcs.clone());
        assert_eq!(resolution.warnings.len(), 1);
        let rels = resolution.network("urn:role/bs", "http://www.xbrl.org/2003/arcrole/parent-child");
        // Document 1 was discovered before document 2.
        assert_eq!(rels[0].order, 3.0);

        // Stable across repeated runs regardless of input order.
        let mut reversed = arcs;
        reversed.reverse();
        let again = resolve(reversed);
        assert_eq!(again.network("urn:role/bs", "http://www.xbrl.org/2003/arcrole/parent-child"), rels);
    }

    #[test]
    fn networks_are_scoped_by_link_role() {
        let mut other = arc("A", "B", 1.0, 0, ArcUse::Prohibited, (1, 0));
        other.link_role = CompactString::from("urn:role/is");
        let resolution = resolve(vec![
            arc("A", "B", 1.0, 0, ArcUse::Optional, (0, 0)),
            other,
        ]);
        // The prohibition lives in a different extended-link-role and does
        // not suppress the first network's relationship.
        assert_eq!(
            resolution
                .network("urn:role/bs", "http://www.xbrl.org/2003/arcrole/parent-child")
                .len(),
            1
        );
    }

    #[test]
    fn output_sorted_by_order_then_target() {
        let resolution = resolve(vec![
            arc("A", "C", 2.0, 0, ArcUse::Optional, (0, 0)),
            arc("A", "B", 2.0, 0, ArcUse::Optional, (0, 1)),
            arc("A", "D", 1.0, 0, ArcUse::Optional, (0, 2)),
        ]);
        let rels = resolution.network("urn:role/bs", "http://www.xbrl.org/2003/arcrole/parent-child");
        let targets: Vec<String> = rels.iter().map(|r| r.target.ident()).collect();
        assert_eq!(
            targets,
            vec!["urn:test#D", "urn:test#B", "urn:test#C"]
        );
    }

    #[test]
    fn repeated_resolution_is_deterministic() {
        let arcs: Vec<Arc> = (0..50)
            .map(|i| {
                arc(
                    &format!("S{}", i % 7),
                    &format!("T{}", i % 11),
                    (i % 5) as f64,
                    (i % 3) as i32,
                    if i % 13 == 0 { ArcUse::Prohibited } else { ArcUse::Optional },
                    (i as u32 % 4, i as u32),
                )
            })
            .collect();
        let first = resolve(arcs.clone());
        let second = resolve(arcs);
        let a: Vec<_> = first.networks.values().flatten().collect();
        let b: Vec<_> = second.networks.values().flatten().collect();
        assert_eq!(a, b);
        assert_eq!(first.warnings, second.warnings);
    }
}
