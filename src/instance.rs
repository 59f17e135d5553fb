//! Instance document resolution: contexts, units, facts, and binding of
//! facts to taxonomy concepts.
//!
//! Per-fact binding failures are collected and reported; they never abort
//! conversion of the remaining facts.

use ahash::{AHashMap, AHashSet};
use chrono::NaiveDate;
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};
use url::Url;

use crate::model::{
    Concept, Context, Decimals, DimensionValue, Entity, Fact, Period, QName, Unit, UnitMeasure,
};
use crate::schema::Prefixes;
use crate::session::{DocKind, SourceDocument};
use crate::taxonomy::Taxonomy;
use crate::{Error, Result, Warning};

/// A parsed instance document, before binding against taxonomies.
pub struct Instance {
    pub uri: Url,
    pub contexts: AHashMap<CompactString, Context>,
    pub units: AHashMap<CompactString, Unit>,
    /// Facts in document order.
    pub facts: Vec<Fact>,
    /// Taxonomy entry points referenced via `link:schemaRef`.
    pub schema_refs: Vec<Url>,
}

/// A fact bound to its concept, context, and unit.
#[derive(Debug, Clone)]
pub struct BoundFact {
    pub fact: Fact,
    pub concept: Concept,
    pub context: Context,
    pub unit: Option<Unit>,
}

/// Outcome of binding an instance: surviving facts plus aggregated per-fact
/// errors and cross-check warnings.
pub struct InstanceReport {
    pub uri: Url,
    pub facts: Vec<BoundFact>,
    pub errors: Vec<Error>,
    pub warnings: Vec<Warning>,
}

impl Instance {
    /// Parse a regular or inline-XBRL instance document.
    pub fn parse(doc: &SourceDocument) -> Result<Instance> {
        if !matches!(doc.kind, DocKind::Instance | DocKind::InlineXbrl) {
            return Err(Error::Parse(format!(
                "{} is not an XBRL instance document",
                doc.uri
            )));
        }
        parse_document(doc)
    }

    /// Bind facts to concepts across the referenced taxonomies.
    ///
    /// Complete-duplicate facts (same concept, context, unit, value) are
    /// emitted once. Dimensional members are cross-checked against the
    /// taxonomies' domain-member subgraph as a best effort; a mismatch is a
    /// warning because source taxonomies are not always internally
    /// consistent.
    pub fn bind(&self, taxonomies: &[&Taxonomy]) -> InstanceReport {
        let mut facts = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = AHashSet::new();

        for fact in &self.facts {
            let dedup_key = (
                fact.concept.clone(),
                fact.context_ref.clone(),
                fact.unit_ref.clone(),
                fact.value.clone(),
            );
            if !seen.insert(dedup_key) {
                continue;
            }

            let concept = taxonomies.iter().find_map(|t| t.concept(&fact.concept));
            let concept = match concept {
                Some(c) => c.clone(),
                None => {
                    errors.push(Error::UnknownConcept(fact.concept.clone()));
                    continue;
                }
            };
            let context = match self.contexts.get(&fact.context_ref) {
                Some(c) => c.clone(),
                None => {
                    errors.push(Error::UnknownContextRef(fact.context_ref.to_string()));
                    continue;
                }
            };
            let unit = match &fact.unit_ref {
                Some(unit_ref) => match self.units.get(unit_ref) {
                    Some(u) => Some(u.clone()),
                    None => {
                        errors.push(Error::UnknownUnitRef(unit_ref.to_string()));
                        continue;
                    }
                },
                None => None,
            };

            if let Some(period_type) = concept.period_type {
                if period_type != context.period.kind() {
                    warnings.push(Warning::PeriodTypeMismatch {
                        concept: concept.qname.clone(),
                        context: context.id.to_string(),
                    });
                }
            }
            check_dimensions(&context, taxonomies, &mut warnings);

            facts.push(BoundFact {
                fact: fact.clone(),
                concept,
                context,
                unit,
            });
        }

        debug!(
            uri = %self.uri,
            bound = facts.len(),
            errors = errors.len(),
            "instance bound"
        );
        InstanceReport {
            uri: self.uri.clone(),
            facts,
            errors,
            warnings,
        }
    }
}

fn check_dimensions(context: &Context, taxonomies: &[&Taxonomy], warnings: &mut Vec<Warning>) {
    for value in &context.dimensions {
        let (dimension, member) = match value {
            DimensionValue::Explicit { dimension, member } => (dimension, member),
            DimensionValue::Typed { .. } => continue,
        };
        for taxonomy in taxonomies {
            if !taxonomy.dimensions().contains(dimension) {
                continue;
            }
            let domain = taxonomy.dimension_domain(dimension);
            if !domain.is_empty() && !domain.contains(member) {
                warn!(dimension = %dimension, member = %member, "member outside dimension domain");
                warnings.push(Warning::DimensionMismatch {
                    dimension: dimension.clone(),
                    member: member.clone(),
                    context: context.id.to_string(),
                });
            }
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct ContextBuild {
    id: CompactString,
    scheme: CompactString,
    identifier: CompactString,
    instant: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    forever: bool,
    dimensions: Vec<DimensionValue>,
}

struct UnitBuild {
    id: CompactString,
    numerators: Vec<QName>,
    denominators: Vec<QName>,
    in_denominator: bool,
    divide: bool,
}

struct FactBuild {
    concept: QName,
    context_ref: CompactString,
    unit_ref: Option<CompactString>,
    decimals: Option<Decimals>,
    precision: Option<CompactString>,
    nil: bool,
    text: String,
    scale: i32,
    negate: bool,
    local: String,
}

/// Text slot a context or unit element is currently filling.
#[derive(Clone, Copy, PartialEq)]
enum TextSlot {
    None,
    Identifier,
    Instant,
    StartDate,
    EndDate,
    Measure,
    ExplicitMember,
    TypedMember,
}

fn parse_document(doc: &SourceDocument) -> Result<Instance> {
    let mut reader = quick_xml::Reader::from_reader(doc.bytes.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut prefixes = Prefixes::new();
    let mut contexts = AHashMap::new();
    let mut units = AHashMap::new();
    let mut facts = Vec::new();
    let mut schema_refs = Vec::new();

    let mut context: Option<ContextBuild> = None;
    let mut unit: Option<UnitBuild> = None;
    let mut slot = TextSlot::None;
    let mut pending_dimension: Option<QName> = None;
    let mut fact_stack: Vec<FactBuild> = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Parse(format!("instance parse error in {}: {e}", doc.uri)))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(&event, Event::Empty(_));
                prefixes.collect(e);
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner())
                    .unwrap_or("")
                    .to_string();
                let full = std::str::from_utf8(name.as_ref()).unwrap_or("").to_string();

                if let Some(ctx) = context.as_mut() {
                    match local.as_str() {
                        "identifier" => {
                            ctx.scheme = attr(e, "scheme").unwrap_or_default();
                            slot = TextSlot::Identifier;
                        }
                        "instant" => slot = TextSlot::Instant,
                        "startDate" => slot = TextSlot::StartDate,
                        "endDate" => slot = TextSlot::EndDate,
                        "forever" => ctx.forever = true,
                        "explicitMember" => {
                            pending_dimension =
                                attr(e, "dimension").and_then(|d| prefixes.resolve(&d));
                            slot = TextSlot::ExplicitMember;
                        }
                        "typedMember" => {
                            pending_dimension =
                                attr(e, "dimension").and_then(|d| prefixes.resolve(&d));
                            slot = TextSlot::TypedMember;
                        }
                        _ => {}
                    }
                } else if let Some(u) = unit.as_mut() {
                    match local.as_str() {
                        "measure" => slot = TextSlot::Measure,
                        "divide" => u.divide = true,
                        "unitNumerator" => u.in_denominator = false,
                        "unitDenominator" => u.in_denominator = true,
                        _ => {}
                    }
                } else {
                    match local.as_str() {
                        "context" => {
                            context = Some(ContextBuild {
                                id: attr(e, "id").unwrap_or_default(),
                                scheme: CompactString::new(""),
                                identifier: CompactString::new(""),
                                instant: None,
                                start: None,
                                end: None,
                                forever: false,
                                dimensions: Vec::new(),
                            });
                        }
                        "unit" => {
                            unit = Some(UnitBuild {
                                id: attr(e, "id").unwrap_or_default(),
                                numerators: Vec::new(),
                                denominators: Vec::new(),
                                in_denominator: false,
                                divide: false,
                            });
                        }
                        "schemaRef" => {
                            if let Some(href) = xlink_href(e) {
                                if let Ok(mut target) = doc.uri.join(&href) {
                                    target.set_fragment(None);
                                    schema_refs.push(target);
                                }
                            }
                        }
                        "nonFraction" | "nonNumeric" => {
                            // Inline XBRL fact host; the concept comes from
                            // the name attribute, not the element itself.
                            let concept = attr(e, "name")
                                .and_then(|n| prefixes.resolve(&n));
                            if let Some(concept) = concept {
                                let fact = inline_fact(e, concept, &local);
                                if is_empty {
                                    facts.push(fact.finish());
                                } else {
                                    fact_stack.push(fact);
                                }
                            }
                        }
                        _ => {
                            if let Some(context_ref) = attr(e, "contextRef") {
                                if let Some(concept) = prefixes.resolve(&full) {
                                    let fact = FactBuild {
                                        concept,
                                        context_ref,
                                        unit_ref: attr(e, "unitRef"),
                                        decimals: attr(e, "decimals")
                                            .and_then(|d| Decimals::parse(&d)),
                                        precision: attr(e, "precision"),
                                        nil: attr(e, "nil").map(|v| v == "true").unwrap_or(false),
                                        text: String::new(),
                                        scale: 0,
                                        negate: false,
                                        local: local.clone(),
                                    };
                                    if is_empty {
                                        facts.push(fact.finish());
                                    } else {
                                        fact_stack.push(fact);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Event::Text(ref t) => {
                let text = t.unescape().unwrap_or_default();
                if let Some(ctx) = context.as_mut() {
                    apply_context_text(ctx, slot, &text, &pending_dimension, &prefixes, &doc.uri)?;
                } else if let Some(u) = unit.as_mut() {
                    if slot == TextSlot::Measure {
                        if let Some(q) = prefixes.resolve(text.trim()) {
                            if u.in_denominator {
                                u.denominators.push(q);
                            } else {
                                u.numerators.push(q);
                            }
                        }
                    }
                } else if let Some(fact) = fact_stack.last_mut() {
                    fact.text.push_str(&text);
                }
            }
            Event::End(ref e) => {
                let name = e.name();
                let local = std::str::from_utf8(name.local_name().into_inner()).unwrap_or("");
                match local {
                    "context" => {
                        if let Some(ctx) = context.take() {
                            let built = ctx.finish(&doc.uri)?;
                            contexts.insert(built.id.clone(), built);
                        }
                    }
                    "unit" => {
                        if let Some(u) = unit.take() {
                            let built = u.finish();
                            units.insert(built.id.clone(), built);
                        }
                    }
                    "identifier" | "instant" | "startDate" | "endDate" | "measure"
                    | "explicitMember" | "typedMember" => {
                        slot = TextSlot::None;
                        pending_dimension = None;
                    }
                    _ => {
                        if context.is_none() && unit.is_none() {
                            let closes_fact = fact_stack
                                .last()
                                .map(|f| f.local == local)
                                .unwrap_or(false);
                            if closes_fact {
                                if let Some(fact) = fact_stack.pop() {
                                    facts.push(fact.finish());
                                }
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(Instance {
        uri: doc.uri.clone(),
        contexts,
        units,
        facts,
        schema_refs,
    })
}

fn apply_context_text(
    ctx: &mut ContextBuild,
    slot: TextSlot,
    text: &str,
    pending_dimension: &Option<QName>,
    prefixes: &Prefixes,
    uri: &Url,
) -> Result<()> {
    match slot {
        TextSlot::Identifier => ctx.identifier = CompactString::from(text.trim()),
        TextSlot::Instant => ctx.instant = Some(parse_date(text, uri)?),
        TextSlot::StartDate => ctx.start = Some(parse_date(text, uri)?),
        TextSlot::EndDate => ctx.end = Some(parse_date(text, uri)?),
        TextSlot::ExplicitMember => {
            if let (Some(dimension), Some(member)) =
                (pending_dimension.clone(), prefixes.resolve(text.trim()))
            {
                ctx.dimensions
                    .push(DimensionValue::Explicit { dimension, member });
            }
        }
        TextSlot::TypedMember => {
            if let Some(dimension) = pending_dimension.clone() {
                ctx.dimensions.push(DimensionValue::Typed {
                    dimension,
                    value: text.trim().to_string(),
                });
            }
        }
        _ => {}
    }
    Ok(())
}

impl ContextBuild {
    fn finish(self, uri: &Url) -> Result<Context> {
        let period = if self.forever {
            Period::Forever
        } else if let Some(instant) = self.instant {
            Period::Instant(instant)
        } else if let (Some(start), Some(end)) = (self.start, self.end) {
            Period::Duration { start, end }
        } else {
            return Err(Error::Parse(format!(
                "context '{}' in {uri} has no usable period",
                self.id
            )));
        };
        Ok(Context {
            id: self.id,
            entity: Entity {
                scheme: self.scheme,
                identifier: self.identifier,
            },
            period,
            dimensions: self.dimensions,
        })
    }
}

impl UnitBuild {
    fn finish(self) -> Unit {
        let measure = if self.divide {
            UnitMeasure::Divide {
                numerators: self.numerators,
                denominators: self.denominators,
            }
        } else {
            UnitMeasure::Simple(self.numerators)
        };
        Unit {
            id: self.id,
            measure,
        }
    }
}

impl FactBuild {
    fn finish(self) -> Fact {
        let value = if self.nil {
            None
        } else {
            Some(apply_inline_transforms(
                self.text.trim(),
                self.scale,
                self.negate,
            ))
        };
        Fact {
            concept: self.concept,
            context_ref: self.context_ref,
            unit_ref: self.unit_ref,
            value,
            decimals: self.decimals,
            precision: self.precision,
            nil: self.nil,
        }
    }
}

fn inline_fact(e: &BytesStart, concept: QName, local: &str) -> FactBuild {
    FactBuild {
        concept,
        context_ref: attr(e, "contextRef").unwrap_or_default(),
        unit_ref: attr(e, "unitRef"),
        decimals: attr(e, "decimals").and_then(|d| Decimals::parse(&d)),
        precision: attr(e, "precision"),
        nil: attr(e, "nil").map(|v| v == "true").unwrap_or(false),
        text: String::new(),
        scale: attr(e, "scale").and_then(|s| s.parse().ok()).unwrap_or(0),
        negate: attr(e, "sign").map(|s| s == "-").unwrap_or(false),
        local: local.to_string(),
    }
}

/// Apply inline-XBRL numeric transforms: thousands separators, sign, scale.
fn apply_inline_transforms(text: &str, scale: i32, negate: bool) -> String {
    if scale == 0 && !negate {
        return text.to_string();
    }
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != ' ').collect();
    match cleaned.parse::<f64>() {
        Ok(v) => {
            let scaled = v * 10f64.powi(scale);
            let signed = if negate { -scaled } else { scaled };
            if signed.fract() == 0.0 {
                format!("{}", signed as i64)
            } else {
                format!("{signed}")
            }
        }
        Err(_) => text.to_string(),
    }
}

fn parse_date(text: &str, uri: &Url) -> Result<NaiveDate> {
    let trimmed = text.trim();
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| Error::Parse(format!("bad date '{trimmed}' in {uri}: {e}")))
}

fn attr(e: &BytesStart, name: &str) -> Option<CompactString> {
    for a in e.attributes().flatten() {
        let key = std::str::from_utf8(a.key.local_name().into_inner()).unwrap_or("");
        if key == name {
            let v = a.unescape_value().unwrap_or_default();
            return Some(CompactString::from(&*v));
        }
    }
    None
}

fn xlink_href(e: &BytesStart) -> Option<CompactString> {
    attr(e, "href")
}
