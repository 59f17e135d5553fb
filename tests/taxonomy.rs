//! End-to-end taxonomy resolution over on-disk fixtures.

use std::fs;
use std::path::Path;

use url::Url;
use xbrlld::model::{ns, ArcEndpoint, QName};
use xbrlld::session::Session;
use xbrlld::{Taxonomy, Warning};

const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:xbrli="http://www.xbrl.org/2003/instance"
           xmlns:link="http://www.xbrl.org/2003/linkbase"
           xmlns:xlink="http://www.w3.org/1999/xlink"
           targetNamespace="http://example.org/gaap/2024">
  <xs:annotation><xs:appinfo>
    <link:linkbaseRef xlink:type="simple" xlink:href="pre1.xml"/>
    <link:linkbaseRef xlink:type="simple" xlink:href="pre2.xml"/>
  </xs:appinfo></xs:annotation>
  <xs:element name="Assets" id="g_Assets" type="xbrli:monetaryItemType"
              substitutionGroup="xbrli:item" xbrli:periodType="instant"/>
  <xs:element name="Cash" id="g_Cash" type="xbrli:monetaryItemType"
              substitutionGroup="xbrli:item" xbrli:periodType="instant"/>
</xs:schema>"#;

fn presentation(order: &str) -> String {
    format!(
        r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
               xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="urn:role/bs">
    <link:loc xlink:type="locator" xlink:href="entry.xsd#g_Assets" xlink:label="parent"/>
    <link:loc xlink:type="locator" xlink:href="entry.xsd#g_Cash" xlink:label="child"/>
    <link:presentationArc xlink:type="arc"
        xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
        xlink:from="parent" xlink:to="child" order="{order}"/>
  </link:presentationLink>
</link:linkbase>"#
    )
}

fn write_fixture(dir: &Path, first_order: &str, second_order: &str) -> Url {
    fs::write(dir.join("entry.xsd"), SCHEMA).unwrap();
    fs::write(dir.join("pre1.xml"), presentation(first_order)).unwrap();
    fs::write(dir.join("pre2.xml"), presentation(second_order)).unwrap();
    Url::from_file_path(dir.join("entry.xsd")).unwrap()
}

fn concept(local: &str) -> QName {
    QName::new("http://example.org/gaap/2024", local)
}

#[test]
fn conflicting_orders_across_linkbases_warn_and_pick_first_discovered() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_fixture(dir.path(), "3.0", "7.0");

    let session = Session::local();
    let taxonomy = Taxonomy::load(&entry, &session).unwrap();

    assert!(taxonomy
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::AmbiguousArcSet { .. })));

    let rels = taxonomy
        .resolution
        .network("urn:role/bs", ns::ARCROLE_PARENT_CHILD);
    assert_eq!(rels.len(), 1);
    // pre1.xml was discovered before pre2.xml.
    assert_eq!(rels[0].order, 3.0);
    assert_eq!(rels[0].target, ArcEndpoint::Concept(concept("Cash")));
}

#[test]
fn identical_linkbases_resolve_without_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_fixture(dir.path(), "2.0", "2.0");

    let session = Session::local();
    let taxonomy = Taxonomy::load(&entry, &session).unwrap();

    assert!(taxonomy.warnings.is_empty());
    let rels = taxonomy
        .resolution
        .network("urn:role/bs", ns::ARCROLE_PARENT_CHILD);
    assert_eq!(rels.len(), 1);
}

#[test]
fn resolving_the_same_dts_twice_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_fixture(dir.path(), "3.0", "7.0");

    let first = Taxonomy::load(&entry, &Session::local()).unwrap();
    let second = Taxonomy::load(&entry, &Session::local()).unwrap();

    let a: Vec<_> = first.relationships().collect();
    let b: Vec<_> = second.relationships().collect();
    assert_eq!(a, b);
    assert_eq!(first.warnings, second.warnings);
}

#[test]
fn cyclic_imports_terminate_with_each_document_once() {
    let dir = tempfile::tempdir().unwrap();
    let a = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                 xmlns:xbrli="http://www.xbrl.org/2003/instance"
                 targetNamespace="urn:a">
      <xs:import namespace="urn:b" schemaLocation="b.xsd"/>
      <xs:element name="A" id="a_A" type="xbrli:monetaryItemType"
                  substitutionGroup="xbrli:item"/>
    </xs:schema>"#;
    let b = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                 xmlns:xbrli="http://www.xbrl.org/2003/instance"
                 targetNamespace="urn:b">
      <xs:import namespace="urn:a" schemaLocation="a.xsd"/>
      <xs:element name="B" id="b_B" type="xbrli:monetaryItemType"
                  substitutionGroup="xbrli:item"/>
    </xs:schema>"#;
    fs::write(dir.path().join("a.xsd"), a).unwrap();
    fs::write(dir.path().join("b.xsd"), b).unwrap();

    let entry = Url::from_file_path(dir.path().join("a.xsd")).unwrap();
    let taxonomy = Taxonomy::load(&entry, &Session::local()).unwrap();
    assert_eq!(taxonomy.dts.len(), 2);
    assert_eq!(taxonomy.concepts.len(), 2);
}
