//! End-to-end query tests against the seeded fixture registry.

use cairn_core::{ArtifactKind, ArtifactType, EntityType, ErrorKind, StoredQuery};
use cairn_query::{PageRequest, QueryManager, QueryParam, QueryState};
use cairn_storage::{MemoryBackend, Registry};
use cairn_test_utils::assertions::*;
use cairn_test_utils::fixtures::seeded_registry;
use cairn_test_utils::{Relationship, Target};
use chrono::{Duration, Utc};

fn seeded() -> Registry<MemoryBackend> {
    seeded_registry().expect("fixture registry")
}

fn names(registry: &Registry<MemoryBackend>, query: &str) -> Vec<String> {
    QueryManager::new(registry)
        .execute(query, &PageRequest::new().count(100), &[])
        .expect("query runs")
        .artifacts()
        .map(|a| a.name.clone())
        .collect()
}

// ============================================================================
// LOCATION PATHS AND PROPERTIES
// ============================================================================

#[test]
fn test_documents_by_type_ordered_by_name() {
    let registry = seeded();
    assert_eq!(
        names(&registry, "/s-ramp/core/Document"),
        vec!["guide.txt", "readme.txt"]
    );
    assert_eq!(names(&registry, "/core/Document"), names(&registry, "//Document"));
}

#[test]
fn test_custom_properties_and_not() {
    let registry = seeded();
    assert_eq!(names(&registry, "/s-ramp/core/Document[@owner = 'ops']"), vec!["readme.txt"]);
    assert_eq!(
        names(&registry, "/s-ramp/core/Document[not(@owner = 'ops')]"),
        vec!["guide.txt"]
    );
    assert_eq!(
        names(&registry, "/s-ramp[@owner or @region]"),
        vec!["acme", "guide.txt", "readme.txt"]
    );
}

#[test]
fn test_existence_after_metadata_update() {
    let registry = cairn_test_utils::fixtures::registry();
    let doc = ArtifactType::of(ArtifactKind::Document);
    for id in ["d1", "d2", "d3"] {
        let artifact = cairn_core::Artifact::new(doc.clone(), id).with_uuid(id);
        registry.create(&doc, artifact, Some(b"x".as_slice())).unwrap();
    }
    for id in ["d1", "d3"] {
        let artifact = registry.get_artifact(&doc, id).unwrap().with_property("prop2", "set");
        registry.update_metadata(&doc, artifact).unwrap();
    }

    let mut found = names(&registry, "/core/Document[@prop2]");
    found.sort();
    assert_eq!(found, vec!["d1", "d3"]);
}

#[test]
fn test_core_fields() {
    let registry = seeded();
    assert_eq!(names(&registry, "/s-ramp/core/Document[@contentSize > 5]"), vec!["guide.txt"]);
    assert_eq!(names(&registry, "/s-ramp/core/Document[@version = '2.0']"), vec!["guide.txt"]);
    assert_eq!(
        names(&registry, "/s-ramp/xsd[@derived = 'false']"),
        vec!["common.xsd", "orders.xsd"]
    );
    assert_eq!(
        names(&registry, "/s-ramp/xsd/XsdDocument[@targetNamespace = 'urn:common']"),
        vec!["common.xsd"]
    );
    assert_eq!(
        names(&registry, "/s-ramp/core/Document[@createdBy = 'tester' and @uuid = 'readme']"),
        vec!["readme.txt"]
    );
}

#[test]
fn test_dates_compare_against_timestamps() {
    let registry = seeded();
    let yesterday = (Utc::now() - Duration::days(1)).date_naive();
    let manager = QueryManager::new(&registry);

    let after = manager
        .new_query("/s-ramp/core/Document[@createdTimestamp > ?]")
        .set_date(yesterday)
        .query()
        .unwrap();
    assert_eq!(after.total(), 2);

    let before = manager
        .new_query("/s-ramp/core/Document[@lastModifiedTimestamp < ?]")
        .set_date(yesterday)
        .query()
        .unwrap();
    assert_eq!(before.total(), 0);
}

#[test]
fn test_regex_and_full_text() {
    let registry = seeded();
    assert_eq!(
        names(&registry, "/s-ramp/core/Document[fn:matches(@name, 'read.*')]"),
        vec!["readme.txt"]
    );
    assert_eq!(names(&registry, "/s-ramp[matches(., 'OPERATOR')]"), vec!["guide.txt"]);
}

#[test]
fn test_full_text_finds_comments() {
    let registry = seeded();
    let doc = ArtifactType::of(ArtifactKind::Document);
    registry.add_comment(&doc, "readme", "Reviewed by legal").unwrap();
    assert_eq!(names(&registry, "/s-ramp[matches(., 'legal')]"), vec!["readme.txt"]);
}

// ============================================================================
// DERIVED ARTIFACTS AND RELATIONSHIPS
// ============================================================================

#[test]
fn test_derived_declarations_and_related_document() {
    let registry = seeded();
    assert_eq!(
        names(&registry, "/s-ramp/xsd/ElementDeclaration[@namespace = 'urn:orders']"),
        vec!["invoice", "order"]
    );
    assert_eq!(
        names(
            &registry,
            "/s-ramp/xsd/ElementDeclaration[relatedDocument[@name = 'orders.xsd']]"
        ),
        vec!["invoice", "order"]
    );
    assert_eq!(
        names(&registry, "//ElementDeclaration[@name = 'order']/relatedDocument"),
        vec!["orders.xsd"]
    );
}

#[test]
fn test_imports_navigate_to_target_schema() {
    let registry = seeded();
    assert_eq!(
        names(
            &registry,
            "/s-ramp/xsd/XsdDocument[importedXsds[@targetNamespace = 'urn:common']]"
        ),
        vec!["orders.xsd"]
    );
}

#[test]
fn test_top_level_steps_select_targets() {
    let registry = seeded();
    let manager = QueryManager::new(&registry);
    let query = manager
        .new_query("/s-ramp/wsdl/PortType[@name = ?]/operation[@name = ?]")
        .set_string("OrderPortType")
        .set_string("submit");
    assert_eq!(query.state(), QueryState::Parameterized);

    let results: Vec<_> = query.query().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "submit");
    assert_eq!(results[0].kind(), ArtifactKind::Operation);
}

#[test]
fn test_generic_relationship_navigation() {
    let registry = seeded();
    assert_eq!(
        names(
            &registry,
            "/s-ramp/serviceImplementation/Organization[dependsOn[@owner = 'ops']]"
        ),
        vec!["acme"]
    );
    assert!(names(
        &registry,
        "/s-ramp/serviceImplementation/Organization[dependsOn[@owner = 'dev']]"
    )
    .is_empty());
}

#[test]
fn test_relationship_and_target_attributes() {
    let registry = seeded();
    let org = ArtifactType::of(ArtifactKind::Organization);
    let globex = cairn_core::Artifact::new(org.clone(), "globex")
        .with_uuid("globex")
        .with_relationship(
            Relationship::generic("dependsOn")
                .with_attribute("strength", "hard")
                .with_target(Target::new("guide").with_attribute("note", "pinned")),
        );
    registry.create(&org, globex, None).unwrap();

    assert_eq!(
        names(
            &registry,
            "/s-ramp/serviceImplementation/Organization[dependsOn[s-ramp:getRelationshipAttribute(., 'strength') = 'hard']]"
        ),
        vec!["globex"]
    );
    assert_eq!(
        names(
            &registry,
            "/s-ramp/serviceImplementation/Organization[dependsOn[getTargetAttribute(., 'note')]]"
        ),
        vec!["globex"]
    );

    let outside = QueryManager::new(&registry).execute(
        "/s-ramp[getTargetAttribute(., 'note') = 'pinned']",
        &PageRequest::new(),
        &[],
    );
    assert_kind(&outside, ErrorKind::Parse);
}

// ============================================================================
// CLASSIFIERS
// ============================================================================

#[test]
fn test_classifier_functions() {
    let registry = seeded();
    assert_eq!(names(&registry, "/s-ramp[s-ramp:classifiedByAnyOf(., 'Asia')]"), vec!["acme"]);
    assert_eq!(
        names(&registry, "/s-ramp[classifiedByAllOf(., 'World')]"),
        vec!["acme", "guide.txt"]
    );
    assert_eq!(
        names(&registry, "/s-ramp[classifiedByAnyOf(., 'Japan', 'Germany')]"),
        vec!["acme", "guide.txt"]
    );
    assert!(names(&registry, "/s-ramp[exactlyClassifiedByAnyOf(., 'Europe')]").is_empty());
    assert_eq!(
        names(&registry, "/s-ramp[exactlyClassifiedByAllOf(., 'Germany')]"),
        vec!["guide.txt"]
    );
}

#[test]
fn test_unknown_class_fails_query() {
    let registry = seeded();
    let result = QueryManager::new(&registry).execute(
        "/s-ramp[classifiedByAnyOf(., 'Atlantis')]",
        &PageRequest::new(),
        &[],
    );
    assert_not_found(&result, EntityType::OntologyClass);
}

// ============================================================================
// LIFECYCLE, ORDERING AND PAGING
// ============================================================================

#[test]
fn test_param_count_checked_both_ways() {
    let registry = seeded();
    let manager = QueryManager::new(&registry);

    let none = manager.new_query("/s-ramp/core/Document[@name = ?]");
    assert_eq!(none.state(), QueryState::Built);
    assert_param_count(&none.query().map(|_| ()), 1, 0);

    let extra = manager
        .new_query("/s-ramp/core/Document[@name = ?]")
        .set_string("readme.txt")
        .set_string("guide.txt");
    assert_param_count(&extra.query().map(|_| ()), 1, 2);

    let unexpected = manager.new_query("/s-ramp/core/Document").set_number(1.0);
    assert_param_count(&unexpected.query().map(|_| ()), 0, 1);
}

#[test]
fn test_parse_errors_reported() {
    let registry = seeded();
    let result = QueryManager::new(&registry).execute("/s-ramp/core/Document[", &PageRequest::new(), &[]);
    let message = assert_parse_error(&result);
    assert!(!message.is_empty());

    let result = QueryManager::new(&registry).execute("/s-ramp[fn:upper-case(@name)]", &PageRequest::new(), &[]);
    assert_kind(&result, ErrorKind::Parse);
}

#[test]
fn test_ordering_and_pagination() {
    let registry = seeded();
    let manager = QueryManager::new(&registry);

    let first = manager
        .execute(
            "/s-ramp/core/Document",
            &PageRequest::new().order_by("version").ascending(false).count(1),
            &[],
        )
        .unwrap();
    assert_eq!(first.total, 2);
    assert!(first.has_more);
    assert_eq!(first.artifacts().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["guide.txt"]);

    let second = manager
        .execute(
            "/s-ramp/core/Document",
            &PageRequest::new()
                .order_by("version")
                .ascending(false)
                .count(1)
                .start_index(1),
            &[],
        )
        .unwrap();
    assert!(!second.has_more);
    assert_eq!(second.start_index, 1);
    assert_eq!(second.artifacts().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["readme.txt"]);

    let past_end = manager
        .execute("/s-ramp/core/Document", &PageRequest::new().start_index(10), &[])
        .unwrap();
    assert!(past_end.is_empty());
    assert_eq!(past_end.total, 2);
}

#[test]
fn test_missing_order_values_sort_first() {
    let registry = seeded();
    let page = QueryManager::new(&registry)
        .execute(
            "/s-ramp[@owner or @region]",
            &PageRequest::new().order_by("owner").ascending(false),
            &[],
        )
        .unwrap();
    assert_eq!(
        page.artifacts().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        vec!["acme", "readme.txt", "guide.txt"]
    );
}

#[test]
fn test_extra_properties_projected() {
    let registry = seeded();
    let page = QueryManager::new(&registry)
        .execute(
            "/s-ramp/core/Document[@uuid = 'readme']",
            &PageRequest::new(),
            &["owner".to_string(), "version".to_string(), "missing".to_string()],
        )
        .unwrap();
    let entry = &page.entries[0];
    assert_eq!(entry.extra_properties.get("owner").map(String::as_str), Some("ops"));
    assert_eq!(entry.extra_properties.get("version").map(String::as_str), Some("1.0"));
    assert!(!entry.extra_properties.contains_key("missing"));
}

#[test]
fn test_result_set_close() {
    let registry = seeded();
    let mut results = QueryManager::new(&registry)
        .new_query("/s-ramp/core/Document")
        .query()
        .unwrap();
    assert_eq!(results.page_len(), 2);
    assert!(results.next().is_some());
    results.close().unwrap();
    assert!(results.is_closed());
    assert!(results.next().is_none());
}

#[test]
fn test_trashed_artifacts_never_match() {
    let registry = seeded();
    let doc = ArtifactType::of(ArtifactKind::Document);
    registry.delete(&doc, "guide").unwrap();
    assert_eq!(names(&registry, "/s-ramp/core/Document"), vec!["readme.txt"]);
    assert_eq!(names(&registry, "/s-ramp[classifiedByAllOf(., 'World')]"), vec!["acme"]);
}

// ============================================================================
// STORED QUERIES
// ============================================================================

#[test]
fn test_execute_stored_query() {
    let registry = seeded();
    registry
        .persist_stored_query(
            StoredQuery::new("byOwner", "/s-ramp/core/Document[@owner = ?]").with_property_name("owner"),
        )
        .unwrap();
    let manager = QueryManager::new(&registry);

    let page = manager
        .execute_stored("byOwner", vec![QueryParam::from("dev")], &PageRequest::new())
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.entries[0].artifact.name, "guide.txt");
    assert_eq!(
        page.entries[0].extra_properties.get("owner").map(String::as_str),
        Some("dev")
    );

    assert_param_count(&manager.execute_stored("byOwner", vec![], &PageRequest::new()), 1, 0);
    assert_not_found(
        &manager.execute_stored("nope", vec![], &PageRequest::new()),
        EntityType::StoredQuery,
    );
}
