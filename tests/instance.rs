//! End-to-end instance conversion: parse, bind, project, serialize.

use std::fs;
use std::path::Path;

use oxrdf::vocab::{rdf, xsd};
use oxrdf::{Literal, NamedNode, Term};
use url::Url;
use xbrlld::rdf::{to_string, vocab, RdfDialect};
use xbrlld::session::Session;
use xbrlld::{Instance, Projector, Taxonomy, Warning};

const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:xbrli="http://www.xbrl.org/2003/instance"
           targetNamespace="http://fasb.org/us-gaap/2024">
  <xs:element name="NetIncomeLoss" id="us-gaap_NetIncomeLoss"
              type="xbrli:monetaryItemType" substitutionGroup="xbrli:item"
              xbrli:periodType="instant"/>
</xs:schema>"#;

const INSTANCE: &str = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:link="http://www.xbrl.org/2003/linkbase"
            xmlns:xlink="http://www.w3.org/1999/xlink"
            xmlns:iso4217="http://www.xbrl.org/2003/iso4217"
            xmlns:us-gaap="http://fasb.org/us-gaap/2024">
  <link:schemaRef xlink:type="simple" xlink:href="entry.xsd"/>
  <xbrli:context id="AsOf2024Q2">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">CIK0000320193</xbrli:identifier>
    </xbrli:entity>
    <xbrli:period><xbrli:instant>2024-06-30</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
  <us-gaap:NetIncomeLoss contextRef="AsOf2024Q2" unitRef="usd"
      decimals="-6">21448000000.0</us-gaap:NetIncomeLoss>
</xbrli:xbrl>"#;

fn write_fixture(dir: &Path) -> Url {
    fs::write(dir.join("entry.xsd"), SCHEMA).unwrap();
    fs::write(dir.join("report.xml"), INSTANCE).unwrap();
    Url::from_file_path(dir.join("report.xml")).unwrap()
}

#[test]
fn instance_binds_and_projects_one_fact() {
    let dir = tempfile::tempdir().unwrap();
    let uri = write_fixture(dir.path());

    let session = Session::local();
    let doc = session.document(&uri).unwrap();
    let instance = Instance::parse(&doc).unwrap();
    assert_eq!(instance.schema_refs.len(), 1);

    let taxonomy = Taxonomy::load(&instance.schema_refs[0], &session).unwrap();
    let report = instance.bind(&[&taxonomy]);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.facts.len(), 1);

    let bound = &report.facts[0];
    assert_eq!(bound.context.entity.identifier, "CIK0000320193");
    assert_eq!(bound.fact.value.as_deref(), Some("21448000000.0"));

    let projector = Projector::new();
    let triples = projector.project_instance(&report);

    let fact_count = triples
        .iter()
        .filter(|t| t.predicate == rdf::TYPE && t.object == Term::from(vocab::FACT))
        .count();
    assert_eq!(fact_count, 1);

    assert!(triples.iter().any(|t| {
        t.predicate == vocab::VALUE
            && t.object == Term::from(Literal::new_typed_literal("21448000000.0", xsd::DECIMAL))
    }));
    assert!(triples.iter().any(|t| {
        t.predicate == vocab::DECIMALS
            && t.object == Term::from(Literal::new_typed_literal("-6", xsd::INTEGER))
    }));
    assert!(triples.iter().any(|t| {
        t.predicate == vocab::UNIT_REF
            && t.object
                == Term::from(NamedNode::new_unchecked(
                    "http://www.xbrl.org/2003/iso4217#USD",
                ))
    }));
    assert!(triples.iter().any(|t| {
        t.predicate == vocab::PERIOD
            && t.object == Term::from(Literal::new_typed_literal("2024-06-30", xsd::DATE))
    }));

    let turtle = to_string(&triples, RdfDialect::Turtle, None).unwrap();
    assert!(turtle.contains("xbrll#Fact"));
    assert!(turtle.contains("21448000000.0"));
}

#[test]
fn period_type_mismatch_is_a_warning_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let duration_schema = SCHEMA.replace("instant", "duration");
    fs::write(dir.path().join("entry.xsd"), duration_schema).unwrap();
    fs::write(dir.path().join("report.xml"), INSTANCE).unwrap();
    let uri = Url::from_file_path(dir.path().join("report.xml")).unwrap();

    let session = Session::local();
    let doc = session.document(&uri).unwrap();
    let instance = Instance::parse(&doc).unwrap();
    let taxonomy = Taxonomy::load(&instance.schema_refs[0], &session).unwrap();

    let report = instance.bind(&[&taxonomy]);
    assert_eq!(report.facts.len(), 1);
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::PeriodTypeMismatch { .. })));
}

#[test]
fn one_call_conversion_reports_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    let with_stray = INSTANCE.replace(
        "</xbrli:xbrl>",
        r#"<us-gaap:NoSuchConcept contextRef="AsOf2024Q2">1</us-gaap:NoSuchConcept></xbrli:xbrl>"#,
    );
    fs::write(dir.path().join("entry.xsd"), SCHEMA).unwrap();
    fs::write(dir.path().join("report.xml"), with_stray).unwrap();
    let locator = dir.path().join("report.xml");

    let conversion = xbrlld::convert_instance(
        locator.to_str().unwrap(),
        &xbrlld::ConvertOptions::default(),
    )
    .unwrap();

    // The bad fact is reported, the good one still converts.
    assert_eq!(conversion.errors.len(), 1);
    assert!(matches!(
        conversion.errors[0],
        xbrlld::Error::UnknownConcept(_)
    ));
    assert_eq!(conversion.stats.facts, 1);
    assert!(conversion.rdf.contains("xbrll#Fact"));
    assert!(conversion.rdf.contains("21448000000.0"));
}

#[test]
fn one_call_taxonomy_conversion_counts_the_dts() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("entry.xsd"), SCHEMA).unwrap();
    let locator = dir.path().join("entry.xsd");

    let conversion = xbrlld::convert_taxonomy(
        locator.to_str().unwrap(),
        &xbrlld::ConvertOptions::default(),
    )
    .unwrap();
    assert!(conversion.errors.is_empty());
    assert_eq!(conversion.stats.documents, 1);
    assert_eq!(conversion.stats.concepts, 1);
    assert!(conversion.rdf.contains("NetIncomeLoss"));
}

#[test]
fn unknown_concept_is_collected_and_binding_continues() {
    let dir = tempfile::tempdir().unwrap();
    let with_stray = INSTANCE.replace(
        "</xbrli:xbrl>",
        r#"<us-gaap:NoSuchConcept contextRef="AsOf2024Q2">1</us-gaap:NoSuchConcept></xbrli:xbrl>"#,
    );
    fs::write(dir.path().join("entry.xsd"), SCHEMA).unwrap();
    fs::write(dir.path().join("report.xml"), with_stray).unwrap();
    let uri = Url::from_file_path(dir.path().join("report.xml")).unwrap();

    let session = Session::local();
    let doc = session.document(&uri).unwrap();
    let instance = Instance::parse(&doc).unwrap();
    let taxonomy = Taxonomy::load(&instance.schema_refs[0], &session).unwrap();

    let report = instance.bind(&[&taxonomy]);
    assert_eq!(report.facts.len(), 1);
    assert_eq!(report.errors.len(), 1);
}
