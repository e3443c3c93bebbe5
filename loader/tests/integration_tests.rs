use std::sync::Arc;

use metamodel_core::{AttributeValue, MetaDataError, Scalar, TypeRegistry, ValueKind};
use metamodel_loader::{
    DetachedNode, Loader, LoaderBuilder, LoaderConfig, LoaderError, LoaderState, MetadataSource,
    QueryError, find_loader, registered_loaders,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn isolated(name: &str) -> LoaderBuilder {
    Loader::builder(name).registry(Arc::new(TypeRegistry::new()))
}

fn load_one(name: &str, source: MetadataSource) -> Loader {
    isolated(name).source(source).init().unwrap()
}

const COMMON_XML: &str = r#"<metadata package="acme::common">
    <object name="id">
      <field name="value" subType="long" required="true"/>
    </object>
</metadata>"#;

const VEHICLE_XML: &str = r#"<metadata package="acme::vehicle">
    <object name="Car" super="..::common::id" description="A car">
      <field name="wheels" subType="int" maxValue="8" defaultValue="4"/>
      <field name="weight" subType="double" maxValue="100.5"/>
      <validator subType="required"/>
      <key subType="primary" keys="value"/>
    </object>
</metadata>"#;

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn test_same_documents_give_identical_trees() {
    let build = |name: &str| {
        isolated(name)
            .source(MetadataSource::xml("common.xml", COMMON_XML))
            .source(MetadataSource::xml("vehicle.xml", VEHICLE_XML))
            .init()
            .unwrap()
    };
    let first = build("determinism-a");
    let second = build("determinism-b");

    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    let dump = |loader: &Loader| loader.with_tree(|tree| Ok(tree.canonical_dump())).unwrap();
    assert_eq!(dump(&first), dump(&second));
}

// ---------------------------------------------------------------------------
// Cross-format equivalence
// ---------------------------------------------------------------------------

#[test]
fn test_xml_and_json_documents_are_equivalent() {
    let xml = load_one(
        "equivalence-xml",
        MetadataSource::xml(
            "doc.xml",
            r#"<metadata package="acme">
                 <object name="Order">
                   <field name="code" required="true" maxLength="100" priority="2.5" description="x"/>
                   <attr name="tags" subType="stringArray">new,urgent</attr>
                 </object>
               </metadata>"#,
        ),
    );
    let json = load_one(
        "equivalence-json",
        MetadataSource::json(
            "doc.json",
            r#"{"metadata": {"package": "acme", "children": [
                 {"object": {"name": "Order", "children": [
                   {"field": {"name": "code", "@required": true, "@maxLength": 100,
                              "@priority": 2.5, "@description": "x"}},
                   {"attr": {"name": "tags", "subType": "stringArray", "value": ["new", "urgent"]}}
                 ]}}
               ]}}"#,
        ),
    );

    for loader in [&xml, &json] {
        let code = loader
            .find("object", "acme::Order")
            .unwrap()
            .unwrap()
            .get_child("code", "field")
            .unwrap();
        let kind = |name: &str| code.attribute(name).unwrap().map(|v| v.kind());
        assert_eq!(kind("required"), Some(ValueKind::BOOLEAN));
        assert_eq!(kind("maxLength"), Some(ValueKind::INT));
        assert_eq!(kind("priority"), Some(ValueKind::DOUBLE));
        assert_eq!(kind("description"), Some(ValueKind::STRING));
        assert_eq!(code.get_attribute_value_as_string("priority").unwrap(), "2.5");
    }
    assert_eq!(xml.fingerprint().unwrap(), json.fingerprint().unwrap());
}

#[test]
fn test_default_package_applies_in_both_formats() {
    let xml = load_one(
        "default-package-xml",
        MetadataSource::xml(
            "doc.xml",
            r#"<metadata defaultPackage="acme"><object name="Car"/></metadata>"#,
        ),
    );
    let json = load_one(
        "default-package-json",
        MetadataSource::json(
            "doc.json",
            r#"{"metadata": {"defaultPackage": "acme", "children": [
                 {"object": {"name": "Car"}}
               ]}}"#,
        ),
    );

    for loader in [&xml, &json] {
        assert!(loader.find("object", "acme::Car").unwrap().is_some());
        assert!(loader.find("object", "Car").unwrap().is_none());
        assert!(loader.reports()[0].ignored.is_empty());
    }
    assert_eq!(xml.fingerprint().unwrap(), json.fingerprint().unwrap());
}

// ---------------------------------------------------------------------------
// Overlay across sources
// ---------------------------------------------------------------------------

#[test]
fn test_overlay_merges_redeclared_object() {
    let loader = isolated("overlay")
        .source(MetadataSource::xml(
            "a.xml",
            r#"<metadata package="acme"><object name="Foo"><field name="a"/></object></metadata>"#,
        ))
        .source(MetadataSource::json(
            "b.json",
            r#"{"metadata": {"package": "acme", "children": [
                 {"object": {"name": "Foo", "children": [{"field": {"name": "b"}}]}}
               ]}}"#,
        ))
        .init()
        .unwrap();

    let root = loader.root().unwrap();
    let objects: Vec<_> = root.get_children(Some("object"), false).unwrap().collect();
    assert_eq!(objects.len(), 1);

    let fields: Vec<String> = objects[0]
        .get_children(Some("field"), false)
        .unwrap()
        .map(|f| f.short_name().unwrap())
        .collect();
    assert_eq!(fields, ["a", "b"]);
}

#[test]
fn test_explicit_overlay_requires_target() {
    let err = isolated("overlay-missing")
        .source(MetadataSource::xml(
            "a.xml",
            r#"<metadata package="acme"><object name="Foo" overlay="true"/></metadata>"#,
        ))
        .init()
        .unwrap_err();
    match err {
        LoaderError::MetaData { source, .. } => {
            assert!(matches!(source, MetaDataError::OverlayTargetNotFound(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Super references
// ---------------------------------------------------------------------------

#[test]
fn test_relative_super_reference() {
    let loader = isolated("relative-super")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .source(MetadataSource::xml("vehicle.xml", VEHICLE_XML))
        .init()
        .unwrap();

    let car = loader.find("object", "acme::vehicle::Car").unwrap().unwrap();
    let base = car.super_node().unwrap().unwrap();
    assert_eq!(base.get_qualified_name().unwrap(), "acme::common::id");
    assert_eq!(base.get_package().unwrap(), "acme::common");

    // inherited after own children
    let fields: Vec<String> = car
        .get_children(Some("field"), true)
        .unwrap()
        .map(|f| f.short_name().unwrap())
        .collect();
    assert_eq!(fields, ["wheels", "weight", "value"]);
    assert_eq!(car.get_children(Some("field"), false).unwrap().len(), 2);

    let value = car.get_child("value", "field").unwrap();
    assert_eq!(value.subtype().unwrap(), "long");
    assert!(value.has_attribute("required").unwrap());
}

#[test]
fn test_climbing_past_the_root_package_fails() {
    let err = isolated("overclimb")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .source(MetadataSource::xml(
            "vehicle.xml",
            r#"<metadata package="acme::vehicle">
                 <object name="Car" super="..::..::..::common::id"/>
               </metadata>"#,
        ))
        .init()
        .unwrap_err();
    match err {
        LoaderError::MetaData { document, path, source } => {
            assert_eq!(document, "vehicle.xml");
            assert_eq!(path, "object:Car");
            assert!(matches!(source, MetaDataError::InvalidPackagePath { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unknown_super_reference() {
    let err = isolated("missing-super")
        .source(MetadataSource::xml(
            "vehicle.xml",
            r#"<metadata package="acme::vehicle"><object name="Car" super="Vehicle"/></metadata>"#,
        ))
        .init()
        .unwrap_err();
    assert!(matches!(
        err,
        LoaderError::MetaData {
            source: MetaDataError::SuperReferenceNotFound { .. },
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Field-specific inference
// ---------------------------------------------------------------------------

#[test]
fn test_max_value_follows_field_subtype() {
    let loader = isolated("field-inference")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .source(MetadataSource::xml("vehicle.xml", VEHICLE_XML))
        .init()
        .unwrap();
    let car = loader.find("object", "acme::vehicle::Car").unwrap().unwrap();

    let wheels = car.get_child("wheels", "field").unwrap();
    assert_eq!(
        wheels.attribute("maxValue").unwrap(),
        Some(AttributeValue::Scalar(Scalar::Int(8)))
    );
    assert_eq!(
        wheels.default_value().unwrap(),
        Some(AttributeValue::Scalar(Scalar::Int(4)))
    );

    let weight = car.get_child("weight", "field").unwrap();
    assert_eq!(weight.attribute("maxValue").unwrap().map(|v| v.kind()), Some(ValueKind::DOUBLE));
    assert_eq!(weight.get_attribute_value_as_string("maxValue").unwrap(), "100.5");

    let json = load_one(
        "field-inference-json",
        MetadataSource::json(
            "limits.json",
            r#"{"metadata": {"children": [{"object": {"name": "Limits", "children": [
                 {"field": {"name": "count", "subType": "int", "@maxValue": 100}},
                 {"field": {"name": "ratio", "subType": "double", "@maxValue": 100}}
               ]}}]}}"#,
        ),
    );
    let limits = json.find("object", "Limits").unwrap().unwrap();
    let count = limits.get_child("count", "field").unwrap();
    assert_eq!(count.attribute("maxValue").unwrap().map(|v| v.kind()), Some(ValueKind::INT));
    assert_eq!(count.get_attribute_value_as_string("maxValue").unwrap(), "100");
    let ratio = limits.get_child("ratio", "field").unwrap();
    assert_eq!(ratio.attribute("maxValue").unwrap().map(|v| v.kind()), Some(ValueKind::DOUBLE));
}

#[test]
fn test_oversized_integer_text_stays_text() {
    let loader = load_one(
        "oversized-integer",
        MetadataSource::xml(
            "cars.xml",
            r#"<metadata package="acme">
                 <object name="Car" serial="12345678901234567890123" count="42"/>
               </metadata>"#,
        ),
    );
    let car = loader.find("object", "acme::Car").unwrap().unwrap();
    assert_eq!(
        car.attribute("serial").unwrap(),
        Some(AttributeValue::string("12345678901234567890123"))
    );
    assert_eq!(
        car.get_attribute_value_as_string("serial").unwrap(),
        "12345678901234567890123"
    );
    assert_eq!(car.attribute("count").unwrap().map(|v| v.kind()), Some(ValueKind::INT));
}

#[test]
fn test_generated_names_and_keys() {
    let loader = isolated("generated-names")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .source(MetadataSource::xml("vehicle.xml", VEHICLE_XML))
        .init()
        .unwrap();
    let car = loader.find("object", "acme::vehicle::Car").unwrap().unwrap();

    assert!(car.find_child("required1", "validator").unwrap().is_some());
    let key = car.get_child("primary", "key").unwrap();
    assert_eq!(
        key.attribute("keys").unwrap(),
        Some(AttributeValue::Array(
            metamodel_core::ScalarKind::String,
            vec![Scalar::String("value".into())]
        ))
    );
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

#[test]
fn test_rejected_child_aborts_the_load() {
    let err = isolated("constraint")
        .source(MetadataSource::xml(
            "bad.xml",
            r#"<metadata package="acme">
                 <object name="Car"><field name="vin"><object name="Engine"/></field></object>
               </metadata>"#,
        ))
        .init()
        .unwrap_err();
    match err {
        LoaderError::MetaData { path, source, .. } => {
            assert_eq!(path, "object:acme::Car/field:vin/object:Engine");
            assert!(matches!(source, MetaDataError::ConstraintViolation { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_package_segments_follow_the_name_pattern() {
    let bad_package = || {
        MetadataSource::xml(
            "bad.xml",
            r#"<metadata package="9bad::has-dash"><object name="Car"/></metadata>"#,
        )
    };
    let err = isolated("bad-package")
        .source(bad_package())
        .init()
        .unwrap_err();
    match err {
        LoaderError::MetaData { source, .. } => match source {
            MetaDataError::InvalidName { name, reason, .. } => {
                assert_eq!(name, "9bad::has-dash");
                assert!(reason.contains("'9bad'"));
            }
            other => panic!("unexpected model error: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }

    let err = isolated("bad-node-package")
        .source(MetadataSource::json(
            "bad.json",
            r#"{"metadata": {"package": "acme", "children": [
                 {"object": {"name": "fleet::has-dash::Car"}}
               ]}}"#,
        ))
        .init()
        .unwrap_err();
    assert!(matches!(
        err,
        LoaderError::MetaData {
            source: MetaDataError::InvalidName { .. },
            ..
        }
    ));

    let relaxed = isolated("bad-package-relaxed")
        .enforce_name_pattern(false)
        .source(bad_package())
        .init()
        .unwrap();
    assert!(relaxed.find("object", "9bad::has-dash::Car").unwrap().is_some());
}

#[test]
fn test_subtype_collision_on_overlay() {
    let err = isolated("collision")
        .source(MetadataSource::xml(
            "a.xml",
            r#"<metadata package="acme"><object name="Car"><field name="vin" subType="string"/></object></metadata>"#,
        ))
        .source(MetadataSource::xml(
            "b.xml",
            r#"<metadata package="acme"><object name="Car"><field name="vin" subType="int"/></object></metadata>"#,
        ))
        .init()
        .unwrap_err();
    assert!(matches!(
        err,
        LoaderError::MetaData {
            source: MetaDataError::DuplicateChild { .. },
            ..
        }
    ));
}

#[test]
fn test_unknown_elements_are_reported() {
    let loader = load_one(
        "unknown-elements",
        MetadataSource::xml(
            "cars.xml",
            r#"<metadata package="acme"><object name="Car"/><layout name="grid"/></metadata>"#,
        ),
    );
    let reports = loader.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].ignored, vec!["/: layout".to_string()]);

    let strict = isolated("unknown-elements-strict")
        .strict(true)
        .source(MetadataSource::xml(
            "cars.xml",
            r#"<metadata package="acme"><layout name="grid"/></metadata>"#,
        ))
        .init();
    assert!(strict.is_err());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_queries_fail_after_destroy() {
    let loader = isolated("destroyed")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .init()
        .unwrap();
    let base = loader.find("object", "acme::common::id").unwrap().unwrap();
    let mut children = base.get_children(None, true).unwrap();
    assert!(children.next().is_some());

    loader.destroy().unwrap();
    assert_eq!(loader.state(), LoaderState::Destroyed);
    assert!(matches!(base.get_qualified_name(), Err(QueryError::LoaderDestroyed(_))));
    assert!(matches!(base.get_children(None, true), Err(QueryError::LoaderDestroyed(_))));
    assert!(matches!(loader.fingerprint(), Err(QueryError::LoaderDestroyed(_))));

    // handles already produced only carry ids
    children.rewind();
    let child = children.next().unwrap();
    assert!(matches!(child.type_name(), Err(QueryError::LoaderDestroyed(_))));
}

#[test]
fn test_queries_fail_after_loader_dropped() {
    let node = {
        let loader = load_one("dropped", MetadataSource::xml("common.xml", COMMON_XML));
        loader.find("object", "acme::common::id").unwrap().unwrap()
    };
    assert!(matches!(
        node.type_name(),
        Err(QueryError::LoaderDestroyed(name)) if name == "dropped"
    ));
}

#[test]
fn test_lookup_misses_are_soft() {
    let loader = load_one("lookups", MetadataSource::xml("common.xml", COMMON_XML));
    let base = loader.find("object", "acme::common::id").unwrap().unwrap();

    assert!(base.find_child("missing", "field").unwrap().is_none());
    assert!(matches!(base.get_child("missing", "field"), Err(QueryError::NotFound(_))));
    assert!(!base.has_attribute("label").unwrap());
    assert!(matches!(
        base.get_attribute_value_as_string("label"),
        Err(QueryError::NotFound(_))
    ));
    assert!(loader.find("object", "acme::common::Missing").unwrap().is_none());
}

#[test]
fn test_concurrent_loaders_share_the_global_registry() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let loader = Loader::builder(format!("parallel-{i}"))
                    .source(MetadataSource::xml("common.xml", COMMON_XML))
                    .init()
                    .unwrap();
                loader.fingerprint().unwrap()
            })
        })
        .collect();
    let fingerprints: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(fingerprints.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(TypeRegistry::global().is_registered("field", "decimal"));
}

// ---------------------------------------------------------------------------
// Types documents
// ---------------------------------------------------------------------------

#[test]
fn test_types_document_adds_subtype() {
    let loader = isolated("types-doc")
        .types(MetadataSource::json(
            "money.json",
            r#"{"types": [{"name": "field", "subTypes": [
                 {"name": "currency", "inherits": "field.decimal",
                  "attributes": [{"name": "currencyCode", "subType": "string"}]}
               ]}]}"#,
        ))
        .source(MetadataSource::xml(
            "order.xml",
            r#"<metadata package="acme">
                 <object name="Order">
                   <field name="total" subType="currency" currencyCode="978" maxValue="10"/>
                 </object>
               </metadata>"#,
        ))
        .init()
        .unwrap();

    assert!(loader.registry().is_applied("types:money.json"));
    let total = loader
        .find("object", "acme::Order")
        .unwrap()
        .unwrap()
        .get_child("total", "field")
        .unwrap();
    assert_eq!(total.subtype().unwrap(), "currency");
    assert_eq!(
        total.attribute("currencyCode").unwrap(),
        Some(AttributeValue::string("978"))
    );
    assert_eq!(total.attribute("maxValue").unwrap().map(|v| v.kind()), Some(ValueKind::DOUBLE));
}

#[test]
fn test_types_document_for_unknown_type_fails_init() {
    let err = isolated("types-doc-unknown")
        .types(MetadataSource::xml(
            "layout.xml",
            r#"<types><type name="layout"><children><child type="view"/></children></type></types>"#,
        ))
        .init()
        .unwrap_err();
    match err {
        LoaderError::Model(MetaDataError::ProviderFailed { provider, .. }) => {
            assert_eq!(provider, "types:layout.xml");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_fixed_types_document_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let types_path = dir.path().join("layout.json");
    std::fs::write(
        &types_path,
        r#"{"types": [{"name": "layout", "children": [{"type": "view"}]}]}"#,
    )
    .unwrap();

    let loader = isolated("types-doc-retry")
        .types(MetadataSource::file(&types_path))
        .source(MetadataSource::xml(
            "cars.xml",
            r#"<metadata package="acme"><object name="Car"/></metadata>"#,
        ))
        .build();
    assert!(matches!(
        loader.init(),
        Err(LoaderError::Model(MetaDataError::ProviderFailed { .. }))
    ));
    assert_eq!(loader.state(), LoaderState::Initializing);
    let provider_id = format!("types:{}", types_path.display());
    assert!(!loader.registry().is_applied(&provider_id));

    std::fs::write(
        &types_path,
        r#"{"types": [{"name": "field", "subTypes": [
             {"name": "percent", "inherits": "field.decimal"}
           ]}]}"#,
    )
    .unwrap();
    loader.init().unwrap();

    assert_eq!(loader.state(), LoaderState::Ready);
    assert!(loader.registry().is_applied(&provider_id));
    assert!(loader.registry().is_registered("field", "percent"));
}

// ---------------------------------------------------------------------------
// Configuration and the loader index
// ---------------------------------------------------------------------------

#[test]
fn test_yaml_config_workflow() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("common.xml"), COMMON_XML).unwrap();
    std::fs::write(
        dir.path().join("percent.xml"),
        r#"<types><type name="field"><subType name="percent" inherits="decimal"/></type></types>"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("stats.json"),
        r#"{"metadata": {"package": "acme::stats", "children": [
             {"object": {"name": "Share", "super": "..::common::id", "children": [
               {"field": {"name": "part", "subType": "percent", "@minValue": 0}}
             ]}}
           ]}}"#,
    )
    .unwrap();
    let config_path = dir.path().join("loader.yml");
    std::fs::write(
        &config_path,
        "name: yaml-config\nregister: true\ntypes: [percent.xml]\nsources:\n  - common.xml\n  - stats.json\n",
    )
    .unwrap();

    let config = LoaderConfig::load(&config_path).unwrap();
    let loader = Loader::from_config(&config);
    loader.init().unwrap();

    assert!(registered_loaders().contains(&"yaml-config".to_string()));
    let share = find_loader("yaml-config")
        .unwrap()
        .find("object", "acme::stats::Share")
        .unwrap()
        .unwrap();
    let part = share.get_child("part", "field").unwrap();
    assert_eq!(part.attribute("minValue").unwrap().map(|v| v.kind()), Some(ValueKind::DOUBLE));
    assert_eq!(share.get_child("value", "field").unwrap().subtype().unwrap(), "long");

    loader.destroy().unwrap();
    assert!(find_loader("yaml-config").is_none());
}

#[test]
fn test_detached_nodes_reattach_through_the_index() {
    let loader = isolated("detach")
        .register(true)
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .init()
        .unwrap();
    let base = loader.find("object", "acme::common::id").unwrap().unwrap();

    let json = serde_json::to_string(&base.detach()).unwrap();
    let detached: DetachedNode = serde_json::from_str(&json).unwrap();
    let attached = detached.attach().unwrap();
    assert_eq!(attached, base);
    assert_eq!(attached.get_qualified_name().unwrap(), "acme::common::id");

    let rival = isolated("detach")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .init()
        .unwrap();
    assert!(matches!(rival.register(), Err(LoaderError::NameTaken(name)) if name == "detach"));

    loader.destroy().unwrap();
    assert!(matches!(detached.attach(), Err(QueryError::LoaderDestroyed(_))));

    rival.register().unwrap();
    let reattached = detached.attach().unwrap();
    assert_ne!(reattached, base);
    assert_eq!(reattached.get_qualified_name().unwrap(), "acme::common::id");
    assert!(rival.unregister());
}

#[test]
fn test_failed_init_keeps_no_partial_tree() {
    let loader = isolated("failed-init")
        .source(MetadataSource::xml("common.xml", COMMON_XML))
        .source(MetadataSource::json("broken.json", "{\"metadata\": "))
        .build();
    assert!(matches!(loader.init(), Err(LoaderError::JsonError(_))));
    assert_eq!(loader.state(), LoaderState::Initializing);
    assert!(matches!(loader.root(), Err(QueryError::NotReady(_))));
    assert!(loader.reports().is_empty());
}
