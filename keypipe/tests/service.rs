// keypipe/tests/service.rs
//
// Service-level flows over the bundled assets.
//
// Tests cover:
// - Auto-correction with the bundled English set, and its revert
// - Configuration edits reaching an existing pipeline
// - Locale-driven layouts and the Italian multi-tap layout
// - Nav mapping override and revert
// - Language enable/disable guard
// - Settings persisted under a real directory

use keypipe_core::{
    CtrlMapping, Error, Keycode, KeyEvent, KeyResult, ManualClock, MemoryTextField, Pipeline,
    ReloadMode,
};
use keypipe::{parse_script, simulate, ImeService};
use std::sync::Arc;

fn service() -> ImeService {
    let service = ImeService::in_memory().with_reload_mode(ReloadMode::Inline);
    service.load_now();
    service
}

fn session(service: &ImeService) -> (Pipeline, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    (service.pipeline(clock.clone()), clock)
}

fn type_into(pipeline: &mut Pipeline, clock: &ManualClock, field: &mut MemoryTextField, script: &str) {
    let strokes = parse_script(script).unwrap();
    simulate::run(pipeline, field, clock, &strokes, 100);
}

fn typed(service: &ImeService, script: &str) -> String {
    let (mut pipeline, clock) = session(service);
    let mut field = MemoryTextField::new();
    type_into(&mut pipeline, &clock, &mut field, script);
    field.text()
}

#[test]
fn bundled_corrections_apply_at_word_boundaries() {
    let service = service();
    assert_eq!(typed(&service, "teh "), "the ");
    assert_eq!(typed(&service, "teh\n"), "the\n");
    assert_eq!(typed(&service, "Teh "), "The ");
}

#[test]
fn backspace_right_after_correction_restores_original() {
    let service = service();
    assert_eq!(typed(&service, "teh <bs>"), "teh ");
    // A second backspace is an ordinary delete.
    assert_eq!(typed(&service, "teh <bs><bs>"), "teh");
}

#[test]
fn correction_edit_reaches_running_pipeline() {
    let service = service();
    let (mut pipeline, clock) = session(&service);

    let mut field = MemoryTextField::new();
    type_into(&mut pipeline, &clock, &mut field, "brb ");
    assert_ne!(field.text(), "be right back ");

    service.set_correction("en", "brb", "be right back").unwrap();
    let mut field = MemoryTextField::new();
    type_into(&mut pipeline, &clock, &mut field, "brb ");
    assert_eq!(field.text(), "be right back ");

    assert!(service.remove_correction("en", "brb").unwrap());
    assert!(!service.remove_correction("en", "brb").unwrap());
}

#[test]
fn locale_selects_layout() {
    let service = service();
    assert_eq!(typed(&service, "aqwz"), "aqwz");

    service.override_settings(|c| c.locale = "fr_FR".into());
    assert_eq!(typed(&service, "aqwz"), "qazw");
}

#[test]
fn italian_multitap_cycles_within_window() {
    let service = service();
    service.override_settings(|c| c.layout = Some("it_multitap".into()));
    assert_eq!(typed(&service, "eee"), "é");
    assert_eq!(typed(&service, "eeee"), "e");
    assert_eq!(typed(&service, "e<wait:500>e"), "ee");
    assert_eq!(typed(&service, "aea"), "aea");
}

#[test]
fn nav_mapping_override_and_revert() {
    let service = service();
    let (mut pipeline, _clock) = session(&service);
    let ctrl_w = KeyEvent::key(Keycode::W).with_ctrl();

    service.set_nav_mapping(Keycode::W, CtrlMapping::None).unwrap();
    let mut field = MemoryTextField::with_text("abc");
    assert_eq!(pipeline.process_key(ctrl_w, &mut field), KeyResult::NotHandled);
    assert!(field.sent_keys().is_empty());

    let restored = service.revert_nav_mapping(Keycode::W).unwrap();
    assert_eq!(
        restored,
        CtrlMapping::Keycode {
            keycode: Keycode::DpadUp
        }
    );
    assert_eq!(pipeline.process_key(ctrl_w, &mut field), KeyResult::Handled);
    assert_eq!(field.sent_keys(), &[Keycode::DpadUp]);
    assert_eq!(field.text(), "abc");
}

#[test]
fn variation_edits_show_up_at_cursor() {
    let service = service();
    let (mut pipeline, _clock) = session(&service);
    let field = MemoryTextField::with_text("c");
    assert_eq!(pipeline.variants_at_cursor(&field).first().map(String::as_str), Some("ç"));

    service
        .edit_variations(|table| {
            table.set_slot("c", 0, "©");
        })
        .unwrap();
    assert_eq!(pipeline.variants_at_cursor(&field).first().map(String::as_str), Some("©"));
}

#[test]
fn exporting_unknown_layout_reports_missing_file() {
    let service = service();
    let json = service.export_layout("it_multitap").unwrap();
    assert!(json.contains("mappings"));
    assert!(matches!(
        service.export_layout("colemak"),
        Err(Error::ConfigMissing(path)) if path == "layouts/colemak.json"
    ));
}

#[test]
fn last_language_cannot_be_disabled() {
    let service = service();
    assert_eq!(service.available_languages(), vec!["en", "it"]);

    service.disable_language("it").unwrap();
    assert!(matches!(
        service.disable_language("en"),
        Err(Error::AtLeastOneLanguageRequired)
    ));
    assert!(service.settings().current().enabled().is_enabled("en"));

    service.enable_language("it").unwrap();
    assert!(service.settings().current().enabled().is_all());
}

#[test]
fn settings_and_layouts_persist_in_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = ImeService::open(dir.path()).unwrap();
        service
            .update_settings(|c| c.multitap_window_ms = 250)
            .unwrap();
        service
            .import_layout(
                "dvorakish",
                r#"{"mappings": {"Q": {"lowercase": "'", "uppercase": "\""}}}"#,
            )
            .unwrap();
    }
    assert!(dir.path().join("settings.toml").exists());
    assert!(dir.path().join("layouts/dvorakish.json").exists());

    let service = ImeService::open(dir.path())
        .unwrap()
        .with_reload_mode(ReloadMode::Inline);
    service.load_now();
    assert_eq!(service.settings().current().multitap_window_ms, 250);
    assert!(service.layout_names().contains(&"dvorakish".to_string()));
}
