/// Pipeline integration tests: end-to-end context-to-event generation.
use narrative_events::core::config::EngineConfig;
use narrative_events::core::pipeline::{EngineSnapshot, EventEngine};
use narrative_events::schema::chain::ChainDefinition;
use narrative_events::schema::condition::ConditionNode;
use narrative_events::schema::context::{Context, DifficultyTier};
use serde_json::json;

const LIBRARY: &str = "tests/fixtures/test_library.json";
const CORPUS: &str = "tests/fixtures/test_corpus.txt";

fn engine(seed: u64) -> EventEngine {
    EventEngine::builder()
        .seed(seed)
        .library_file(LIBRARY)
        .build()
        .unwrap()
}

fn chain(value: serde_json::Value) -> ChainDefinition {
    serde_json::from_value(value).unwrap()
}

fn merchant() -> Context {
    Context::new()
        .with("name", "Aldric")
        .with("career", "merchant")
        .with("location", "Saltmarsh")
        .with("wealth", 800)
}

#[test]
fn same_seed_same_events() {
    let build = || {
        EventEngine::builder()
            .seed(7)
            .library_file(LIBRARY)
            .corpus_file(CORPUS)
            .build()
            .unwrap()
    };
    let mut a = build();
    let mut b = build();
    for _ in 0..10 {
        assert_eq!(a.generate_event(&merchant()), b.generate_event(&merchant()));
    }
}

#[test]
fn abstract_and_ineligible_templates_are_never_selected() {
    let mut engine = engine(11);
    for _ in 0..60 {
        let event = engine.generate_event(&merchant().with("influence", 10));
        let id = event.template_id.expect("library has eligible templates");
        assert!(
            id == "merchant_deal" || id == "bandit_ambush",
            "unexpected template {}",
            id
        );
    }
}

#[test]
fn eligible_conditions_admit_templates() {
    let mut engine = engine(3);
    let seen_court = (0..80).any(|_| {
        let event = engine.generate_event(&merchant().with("influence", 80));
        event.template_id.as_deref() == Some("court_summons")
    });
    assert!(seen_court);
}

#[test]
fn mixins_and_conditional_choices_from_library() {
    let mut engine = engine(5);

    let event = engine.generate_from_template("merchant_deal", &merchant()).unwrap();
    let texts: Vec<&str> = event.choices.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Buy the crate", "Decline politely", "Haggle over the price"]);
    assert_eq!(event.title, "A Merchant's Offer");
    assert_eq!(
        event.narrative,
        "A merchant in Saltmarsh offers the merchant a crate of spices."
    );
    assert!(event.has_tag("trade"));

    let rich = merchant()
        .with("wealth", 9000)
        .with("inventory", json!(["silk"]));
    let event = engine.generate_from_template("merchant_deal", &rich).unwrap();
    assert_eq!(event.choices.len(), 4);
    assert_eq!(event.choices[2].text, "Offer a trade in kind");
    assert_eq!(event.title, "A Merchant Courts Your Purse");
}

#[test]
fn inheritance_and_seasonal_composition_from_library() {
    let mut engine = engine(9);

    let summer = engine
        .generate_from_template("bandit_ambush", &merchant().with("season", "summer"))
        .unwrap();
    let texts: Vec<&str> = summer.choices.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Greet them", "Keep walking", "Draw your blade"]);
    assert_eq!(summer.narrative, "Bandits block the road outside Saltmarsh.");
    assert_eq!(summer.difficulty, DifficultyTier::Hard);
    assert_eq!(summer.urgency, "high");
    assert_eq!(summer.kind, "combat");
    assert_eq!(summer.theme, "encounter");

    let winter = engine
        .generate_from_template("bandit_ambush", &merchant().with("season", "winter"))
        .unwrap();
    assert_eq!(winter.choices.last().unwrap().text, "Share a fire");
    assert_eq!(
        winter.narrative,
        "Bandits block the road outside Saltmarsh. Frost bites at your fingers."
    );
    assert!(winter.has_tag("winter"));
}

#[test]
fn resolved_effects_respect_ranges() {
    let mut engine = engine(21);
    for _ in 0..30 {
        let event = engine
            .generate_from_template("bandit_ambush", &merchant().with("season", "summer"))
            .unwrap();
        // Default merchant context is easy tier: health is a penalty (x0.7).
        let health = event.choices[2].effect["health"];
        assert!((-14.0..=-3.0).contains(&health), "health {}", health);
    }
}

#[test]
fn wealthy_rule_tags_rich_contexts_only() {
    let mut engine = engine(1);
    engine
        .register_rule_json(
            "wealthy",
            r#"{
                "conditions": [{ "type": "stat_greater_than", "stat": "gold", "value": 1000 }],
                "effects": { "addTags": ["wealthy"] }
            }"#,
        )
        .unwrap();

    let rich = engine.generate_event(&Context::new().with("gold", 2000));
    assert!(rich.has_tag("wealthy"));
    let poor = engine.generate_event(&Context::new().with("gold", 100));
    assert!(!poor.has_tag("wealthy"));
}

#[test]
fn rules_apply_in_registration_order() {
    let mut engine = engine(2);
    engine
        .register_rule_json(
            "double",
            r#"{ "effects": { "modifyChoices": { "multiply": { "reputation": 2 } } }, "priority": 1 }"#,
        )
        .unwrap();
    engine
        .register_rule_json(
            "bonus",
            r#"{ "effects": { "modifyChoices": { "set": { "reputation": 7 } } }, "priority": 99 }"#,
        )
        .unwrap();

    let event = engine
        .generate_from_template("merchant_deal", &merchant())
        .unwrap();
    assert!(event.choices.iter().all(|c| c.effect["reputation"] == 7.0));
}

#[test]
fn empty_library_with_corpus_synthesizes_fallback() {
    let mut engine = EventEngine::builder()
        .seed(4)
        .corpus_file(CORPUS)
        .build()
        .unwrap();
    let event = engine.generate_event(&Context::new());
    assert!(event.has_tag("fallback"));
    assert!(!event.title.is_empty());
    assert!(!event.narrative.is_empty());
    assert!(event.title.chars().count() <= engine.config().synthesizer.title_max_chars);
}

#[test]
fn corpus_fills_description() {
    let mut engine = EventEngine::builder()
        .seed(8)
        .library_file(LIBRARY)
        .corpus_file(CORPUS)
        .build()
        .unwrap();
    let event = engine.generate_from_template("merchant_deal", &merchant()).unwrap();
    assert!(!event.description.is_empty());
    assert_ne!(event.description, event.narrative);
}

#[test]
fn chain_stages_fire_once_and_are_tagged() {
    let mut engine = engine(6);
    engine.register_chain(
        "smuggling",
        chain(json!({ "stages": [
            { "template": "merchant_deal", "day": 0 },
            { "template": "bandit_ambush", "day": 2 }
        ]})),
    );

    let (instance, started) = engine.start_chain("smuggling", &merchant()).unwrap();
    assert_eq!(started.len(), 1);
    assert!(started[0].has_tag("chain:smuggling"));
    assert_eq!(started[0].template_id.as_deref(), Some("merchant_deal"));

    let later = engine.advance_days(6, &merchant());
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].template_id.as_deref(), Some("bandit_ambush"));
    assert!(engine.active_chains().is_empty());
    assert_eq!(engine.completed_chains()[0].id, instance);
}

#[test]
fn choice_gated_chain_through_engine() {
    let mut engine = engine(6);
    engine.register_chain(
        "offer",
        chain(json!({ "stages": [
            { "template": "merchant_deal", "triggerNext": { "choice": "accepted" } },
            { "template": "bandit_ambush", "delay": 1 }
        ]})),
    );
    let (id, _) = engine.start_chain("offer", &merchant()).unwrap();
    assert!(engine.advance_days(3, &merchant()).is_empty());
    assert!(engine.make_choice(&id, "refused", &merchant()).unwrap().is_empty());

    let fired = engine.make_choice(&id, "accepted", &merchant()).unwrap();
    assert_eq!(fired.len(), 1);
    assert!(engine.make_choice("offer#99", "accepted", &merchant()).is_err());
}

#[test]
fn snapshot_round_trip_resumes_chains() {
    let mut engine = engine(12);
    engine.register_chain(
        "journey",
        chain(json!({ "stages": [
            { "template": "merchant_deal", "day": 0 },
            { "template": "bandit_ambush", "day": 3 }
        ]})),
    );
    engine.start_chain("journey", &merchant()).unwrap();
    engine.advance_days(2, &merchant());
    engine.relationships_mut().add_entity("mira", "Mira", "npc");
    engine
        .relationships_mut()
        .update_relationship("player", "mira", 35, "shared a fire");
    engine.mark_completed("merchant_deal");

    let json = engine.export_state().to_json().unwrap();
    let snapshot = EngineSnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot, engine.export_state());

    let mut restored = self::engine(12);
    restored.import_state(snapshot);
    assert_eq!(restored.time().current_day, 2);
    assert_eq!(restored.active_chains().len(), 1);
    assert_eq!(restored.relationships().get_relationship("player", "mira"), 35);
    assert!(restored.completed_events().contains("merchant_deal"));

    let fired = restored.advance_day(&merchant());
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].template_id.as_deref(), Some("bandit_ambush"));
    assert!(restored.advance_days(5, &merchant()).is_empty());

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value.get("timeSystem").is_some());
    assert!(value["activeChains"][0].get("completedStages").is_some());
}

#[test]
fn dependencies_gate_selection() {
    let mut engine = engine(13);
    let gate: ConditionNode = serde_json::from_value(json!({
        "type": "event_completed", "event": "merchant_deal"
    }))
    .unwrap();
    engine.register_dependency("bandit_ambush", gate);

    assert!(!engine.is_available("bandit_ambush", &merchant()));
    assert!(engine.is_available("merchant_deal", &merchant()));
    for _ in 0..30 {
        let event = engine.generate_event(&merchant());
        assert_eq!(event.template_id.as_deref(), Some("merchant_deal"));
    }

    engine.mark_completed("merchant_deal");
    assert!(engine.is_available("bandit_ambush", &merchant()));
    assert_eq!(engine.available_events(&merchant()), vec!["bandit_ambush"]);
}

#[test]
fn relationship_history_uses_calendar_day() {
    let mut engine = engine(14);
    engine.advance_days(4, &Context::new());
    engine
        .relationships_mut()
        .apply_relationship_rule("save_life", "player", "guard");
    let rel = engine.relationships().relationship("player", "guard").unwrap();
    assert_eq!(rel.strength, 25);
    assert_eq!(rel.history[0].timestamp, 4);
}

#[test]
fn config_file_drives_engine() {
    let engine = EventEngine::builder()
        .config_file("tests/fixtures/test_config.ron")
        .build()
        .unwrap();
    assert_eq!(engine.config().seed, 42);
    assert_eq!(engine.config().calendar.days_per_season, 10);

    let config = EngineConfig::from_file(std::path::Path::new("tests/fixtures/test_config.ron")).unwrap();
    let mut a = EventEngine::builder().config(config.clone()).library_file(LIBRARY).build().unwrap();
    let mut b = EventEngine::builder().seed(42).library_file(LIBRARY).build().unwrap();
    // Same seed; synthesizer settings differ but no corpus is loaded.
    assert_eq!(a.generate_event(&merchant()).title, b.generate_event(&merchant()).title);
}
