/// Template library integration tests: loading, storage and linting.
use narrative_events::core::composer::{lint_library, CompositionError, TemplateComposer};
use narrative_events::core::analyzer::analyze_context;
use narrative_events::core::library::{LibraryError, TemplateFilter, TemplateLibrary, TemplateStore};
use narrative_events::core::pipeline::{EngineError, EventEngine};
use narrative_events::core::rules::RuleInterpreter;
use narrative_events::schema::context::Context;
use narrative_events::schema::template::Template;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use std::path::Path;

const LIBRARY: &str = "tests/fixtures/test_library.json";

#[test]
fn fixture_library_is_clean() {
    let library = TemplateLibrary::load_json(Path::new(LIBRARY)).unwrap();
    assert_eq!(library.len(), 6);
    let issues = lint_library(&library, &RuleInterpreter::new());
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn query_hides_fragments_unless_asked() {
    let library = TemplateLibrary::load_json(Path::new(LIBRARY)).unwrap();
    let selectable: Vec<&str> = library
        .query(&TemplateFilter::all())
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(selectable, vec!["bandit_ambush", "court_summons", "merchant_deal"]);

    let trade = library.query(&TemplateFilter {
        tag: Some("trade".to_string()),
        include_abstract: true,
        ..TemplateFilter::default()
    });
    let ids: Vec<&str> = trade.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["haggle_mixin", "merchant_deal"]);
}

#[test]
fn resolution_is_idempotent_for_flat_templates() {
    let library = TemplateLibrary::load_json(Path::new(LIBRARY)).unwrap();
    let interpreter = RuleInterpreter::new();
    let composer = TemplateComposer::new(&library, &interpreter);
    let ctx = analyze_context(&Context::new());
    let mut rng = StdRng::seed_from_u64(0);

    let once = composer.resolve("court_summons", &ctx, &mut rng).unwrap();
    assert_eq!(&once, library.get("court_summons").unwrap());

    let mut flat = TemplateLibrary::new();
    flat.put(once.clone()).unwrap();
    let composer = TemplateComposer::new(&flat, &interpreter);
    assert_eq!(composer.resolve("court_summons", &ctx, &mut rng).unwrap(), once);
}

#[test]
fn cyclic_library_fails_fast_and_engine_falls_back() {
    let library = TemplateLibrary::from_json(
        r#"{
            "loop_a": { "extends": "loop_b", "title": "A", "narrative": "a", "choices": [{ "text": "a" }] },
            "loop_b": { "extends": "loop_a" }
        }"#,
    )
    .unwrap();

    let interpreter = RuleInterpreter::new();
    let composer = TemplateComposer::new(&library, &interpreter);
    let ctx = analyze_context(&Context::new());
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        composer.resolve("loop_a", &ctx, &mut rng),
        Err(CompositionError::Cycle(_))
    ));

    let mut engine = EventEngine::builder().seed(1).store(library).build().unwrap();
    let event = engine.generate_event(&Context::new());
    assert!(event.has_tag("fallback"));
    assert!(matches!(
        engine.generate_from_template("loop_a", &Context::new()),
        Err(EngineError::Composition(CompositionError::Cycle(_)))
    ));
}

#[test]
fn engine_rejects_incomplete_registration() {
    let mut engine = EventEngine::builder().build().unwrap();
    let err = engine
        .register_template(Template {
            id: "stub".to_string(),
            title: Some("Stub".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Library(LibraryError::MissingFields { .. })
    ));
    assert!(engine.store().get("stub").is_none());
}

#[test]
fn list_form_library_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{ "id": "ferry", "title": "The Ferry", "narrative": "The ferryman waits.", "choices": [{{ "text": "Pay" }}] }}]"#
    )
    .unwrap();

    let library = TemplateLibrary::load_json(file.path()).unwrap();
    assert!(library.get("ferry").is_some());

    let mut engine = EventEngine::builder()
        .seed(2)
        .library_file(file.path())
        .build()
        .unwrap();
    assert_eq!(engine.generate_event(&Context::new()).title, "The Ferry");
}
