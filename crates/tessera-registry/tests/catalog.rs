//! Catalog behavior over real unit files.

use tessera_config::{Settings, SettingsStore};
use tessera_registry::{
    CallArgs, Catalog, LookupError, MAIN_NAMESPACE, RegistryError, Value, Warning,
};
use tessera_test::{
    ADD_UNIT, MALFORMED_UNIT, MISSING_IMPORT_UNIT, MUL_UNIT, TestWorkspace, init_tracing,
    test_library,
};

fn import_failures(warnings: &[Warning]) -> usize {
    warnings
        .iter()
        .filter(|w| matches!(w, Warning::ImportFailure(_)))
        .count()
}

#[test]
fn failing_reload_keeps_previous_entries() {
    init_tracing();
    let mut ws = TestWorkspace::new();
    let path = ws.write_unit("calc", "ops", &format!("{ADD_UNIT}\n{}", MUL_UNIT.replace("imports = [\"math\"]", "")));
    let mut catalog = ws.catalog(test_library());
    assert_eq!(catalog.len(), 2);

    std::fs::write(&path, MALFORMED_UNIT).unwrap();
    ws.touch(&path);
    catalog.force_refresh();

    let add = catalog.get("add").unwrap();
    let mul = catalog.get("mul").unwrap();
    assert_eq!(add.call(CallArgs::new().arg(1)).unwrap(), Value::Int(2));
    assert_eq!(
        mul.call(CallArgs::new().arg(3).arg(4)).unwrap(),
        Value::Int(12)
    );
    assert_eq!(import_failures(&catalog.drain_warnings()), 1);

    catalog.force_refresh();
    assert_eq!(import_failures(&catalog.drain_warnings()), 0);
}

#[test]
fn successful_reload_replaces_entries() {
    let mut ws = TestWorkspace::new();
    let path = ws.write_unit("calc", "ops", ADD_UNIT);
    let mut catalog = ws.catalog(test_library());
    assert!(catalog.get("add").is_ok());

    std::fs::write(&path, MUL_UNIT).unwrap();
    ws.touch(&path);

    assert!(catalog.get("mul").is_ok());
    assert!(matches!(
        catalog.get("add"),
        Err(RegistryError::Lookup(LookupError::NotFound { .. }))
    ));
    assert_eq!(catalog.units().len(), 1);
}

#[test]
fn duplicate_registration_keeps_first_unit() {
    let mut ws = TestWorkspace::new();
    ws.write_unit("calc", "a", ADD_UNIT);
    ws.write_unit("calc", "b", ADD_UNIT);
    let mut catalog = ws.catalog(test_library());

    let ids = catalog.ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].to_string(), "calc.add");

    let warnings = catalog.drain_warnings();
    assert!(warnings.iter().any(|w| matches!(
        w,
        Warning::DuplicateRegistration { unit, owner: Some(owner), .. }
            if unit.stem() == "b" && owner.stem() == "a"
    )));
}

#[test]
fn query_modes_and_ambiguity() {
    let mut ws = TestWorkspace::new();
    ws.write_unit("ns1", "ops", ADD_UNIT);
    ws.write_unit("ns2", "ops", ADD_UNIT);
    ws.write_unit("ns2", "more", MUL_UNIT);
    let mut catalog = ws.catalog(test_library());

    let exact = catalog.query("$ns2.add").unwrap();
    assert_eq!(exact.id().unwrap().to_string(), "ns2.add");
    assert!(matches!(
        catalog.query("$ns3.add"),
        Err(RegistryError::Lookup(LookupError::NotFound { .. }))
    ));

    let by_regex = catalog.query(r"r/ns2\.m.*").unwrap();
    assert_eq!(by_regex.name(), "mul");
    assert!(catalog.drain_warnings().is_empty());

    let by_glob = catalog.query("add").unwrap();
    assert_eq!(by_glob.id().unwrap().to_string(), "ns1.add");
    let warnings = catalog.drain_warnings();
    match &warnings[..] {
        [Warning::Ambiguity { chosen, matches, .. }] => {
            assert_eq!(chosen.to_string(), "ns1.add");
            assert_eq!(matches.len(), 2);
            assert!(matches[1].starts_with("ns2.add (a: int, b: int = 1) -> int"));
        },
        other => panic!("expected one ambiguity warning, got {other:?}"),
    }

    let by_name = catalog.get("add").unwrap();
    assert_eq!(by_name.id().unwrap().namespace(), "ns1");
    assert_eq!(catalog.drain_warnings().len(), 1);

    assert!(matches!(
        catalog.query("r/("),
        Err(RegistryError::Lookup(LookupError::InvalidPattern { .. }))
    ));
}

#[test]
fn lookups_return_independent_clones() {
    let mut ws = TestWorkspace::new();
    ws.write_unit("calc", "ops", ADD_UNIT);
    let mut catalog = ws.catalog(test_library());

    let bound = catalog
        .get("add")
        .unwrap()
        .bind([("a".to_owned(), Value::Int(10))].into())
        .unwrap();
    assert_eq!(bound.call(CallArgs::new()).unwrap(), Value::Int(11));

    let fresh = catalog.get("add").unwrap();
    assert!(fresh.bound().is_empty());
}

#[test]
fn deferred_assembly_from_catalog_entries() {
    let mut ws = TestWorkspace::new();
    ws.write_unit("calc", "ops", ADD_UNIT);
    let mut catalog = ws.catalog(test_library());

    let partial = catalog
        .get("add")
        .unwrap()
        .invoke(CallArgs::new().kwarg("b", 5).deferred())
        .unwrap()
        .into_partial()
        .unwrap();
    assert_eq!(partial.required_params().len(), 1);
    assert!(partial.describe().contains("[✓] b: int = 1"));
    assert_eq!(partial.call(CallArgs::new().arg(1)).unwrap(), Value::Int(6));
}

#[test]
fn import_failure_suggests_declared_requirement() {
    let mut ws = TestWorkspace::new();
    ws.write_file("vision", "namespace.yml", "requirements:\n  - torchvision\n  - {url: numpy, tool: conda}\n");
    ws.write_unit("vision", "models", MISSING_IMPORT_UNIT);
    let mut catalog = ws.catalog(test_library());

    assert!(catalog.is_empty());
    let warnings = catalog.drain_warnings();
    let failure = warnings
        .iter()
        .find_map(|w| match w {
            Warning::ImportFailure(f) => Some(f),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure.missing.as_deref(), Some("torchvision"));
    assert_eq!(
        failure.tip.as_deref(),
        Some("Try `pip install torchvision` to install the missing dependency.")
    );
    assert!(failure.to_string().contains("The unit 'models' under namespace 'vision' could not be loaded."));
}

#[test]
fn namespace_metadata_reaches_entries() {
    let mut ws = TestWorkspace::new();
    ws.write_file("calc", "namespace.yml", "author: jane\nversion: 2\nrequirements: [numpy]\n");
    ws.write_unit("calc", "ops", ADD_UNIT);
    let mut catalog = ws.catalog(test_library());

    let add = catalog.get("add").unwrap();
    assert_eq!(add.metadata()["author"], "jane");
    assert_eq!(add.metadata()["version"], "2");
    assert!(!add.metadata().contains_key("requirements"));

    let view = catalog.namespace("calc").unwrap();
    assert_eq!(view.metadata().requirements.len(), 1);
    assert_eq!(view.entries().count(), 1);
    assert!(view.get("add").is_ok());
    assert!(view.get("mul").is_err());
}

#[test]
fn refresh_is_throttled() {
    let mut ws = TestWorkspace::new();
    ws.write_unit("calc", "ops", ADD_UNIT);
    let store = SettingsStore::in_memory(Settings {
        search_paths: ws.bindings().clone(),
        update_interval_ms: 3_600_000,
        ..Settings::default()
    });
    let mut catalog = Catalog::builder(test_library())
        .settings(store)
        .without_current_dir()
        .build();

    assert!(catalog.refresh());
    assert!(!catalog.refresh());
    ws.write_unit("calc", "more", MUL_UNIT);
    assert!(catalog.get("mul").is_err());

    catalog.force_refresh();
    assert!(catalog.get("mul").is_ok());
}

#[test]
fn deleted_units_are_retired() {
    let mut ws = TestWorkspace::new();
    let path = ws.write_unit("calc", "ops", ADD_UNIT);
    ws.write_unit("calc", "more", MUL_UNIT);
    let mut catalog = ws.catalog(test_library());
    assert_eq!(catalog.len(), 2);

    std::fs::remove_file(path).unwrap();
    assert_eq!(catalog.names(), vec!["mul".to_owned()]);
    assert_eq!(catalog.units().len(), 1);
}

#[test]
fn working_directory_is_the_main_namespace() {
    let ws = TestWorkspace::new();
    std::fs::write(ws.cwd().join("local.toml"), ADD_UNIT).unwrap();
    let mut catalog = ws.catalog(test_library());

    let add = catalog.get("add").unwrap();
    assert_eq!(add.id().unwrap().namespace(), MAIN_NAMESPACE);
    assert_eq!(catalog.to_string(), "Found 1 entry.");
}

#[test]
fn missing_namespace_root_is_dropped_with_warning() {
    let mut ws = TestWorkspace::new();
    ws.write_unit("calc", "ops", ADD_UNIT);
    let gone = ws.namespace("gone");
    std::fs::remove_dir(&gone).unwrap();
    let mut catalog = ws.catalog(test_library());

    assert_eq!(catalog.len(), 1);
    assert!(catalog.namespaces().get("gone").is_none());
    assert!(catalog.drain_warnings().iter().any(|w| matches!(
        w,
        Warning::InvalidNamespacePath { namespace, .. } if namespace == "gone"
    )));
}

#[test]
fn settings_changes_apply_on_next_lookup() {
    let mut ws = TestWorkspace::new();
    let mut catalog = ws.catalog(test_library());
    assert!(catalog.get("add").is_err());

    ws.write_unit("calc", "ops", ADD_UNIT);
    catalog
        .settings_mut()
        .set_search_paths(ws.bindings().clone());
    assert!(catalog.get("add").is_ok());
    assert_eq!(catalog.to_string(), "Found 1 entry.");
}

#[test]
fn rebinding_a_directory_retires_its_old_namespace() {
    let mut ws = TestWorkspace::new();
    let root = ws.namespace("calc");
    ws.write_unit("calc", "ops", ADD_UNIT);
    let mut catalog = ws.catalog(test_library());
    assert_eq!(catalog.ids()[0].to_string(), "calc.add");

    catalog
        .settings_mut()
        .set_search_paths([("renamed".to_owned(), root)].into());
    let ids: Vec<String> = catalog.ids().iter().map(ToString::to_string).collect();
    assert_eq!(ids, vec!["renamed.add".to_owned()]);
    assert_eq!(catalog.units().len(), 1);
}

#[test]
fn binding_the_working_directory_replaces_main() {
    let ws = TestWorkspace::new();
    std::fs::write(ws.cwd().join("local.toml"), ADD_UNIT).unwrap();
    let mut catalog = ws.catalog(test_library());
    assert_eq!(catalog.get("add").unwrap().id().unwrap().namespace(), MAIN_NAMESPACE);

    catalog
        .settings_mut()
        .set_search_paths([("proj".to_owned(), ws.cwd())].into());
    let ids: Vec<String> = catalog.ids().iter().map(ToString::to_string).collect();
    assert_eq!(ids, vec!["proj.add".to_owned()]);
    assert_eq!(catalog.get("add").unwrap().id().unwrap().namespace(), "proj");
    assert!(
        !catalog
            .drain_warnings()
            .iter()
            .any(|w| matches!(w, Warning::Ambiguity { .. }))
    );
}
