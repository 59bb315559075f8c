use std::collections::BTreeMap;
use std::fs;

use invoice_desk::model::{
    HistoryEntry, MethodType, PartyProfile, PaymentProfile, Profile, ProfileKind,
    RecipientProfile, Settings,
};
use invoice_desk::RecordStore;
use tempfile::TempDir;

fn provider(id: &str, name: &str) -> Profile {
    Profile::Provider(PartyProfile {
        id: id.into(),
        display_name: name.into(),
        address_lines: vec!["1 High St".into(), "Leeds".into()],
        email: Some("billing@example.com".into()),
        deleted: false,
    })
}

fn recipient(id: &str, name: &str) -> Profile {
    Profile::Recipient(RecipientProfile {
        id: id.into(),
        display_name: name.into(),
        address_lines: vec![],
        email: None,
        student_name: Some("Sam North".into()),
        deleted: false,
    })
}

fn history(number: &str, path: &str) -> HistoryEntry {
    HistoryEntry {
        invoice_number: number.into(),
        recipient: "Jane Smith".into(),
        recipient_id: "recipient-1".into(),
        service_category: "Tutoring".into(),
        output_path: path.into(),
        created_at: "2026-02-21T10:00:00".into(),
        payment_method: MethodType::BankDomestic,
    }
}

#[test]
fn first_run_loads_empty_groups() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    let book = store.load_profiles().unwrap();
    assert!(book.providers.is_empty());
    assert!(book.recipients.is_empty());
    assert!(book.payment_methods.is_empty());
}

#[test]
fn load_is_idempotent_without_writes() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    store.save_profile(&provider("provider-1", "Acme Ltd")).unwrap();
    store.save_profile(&recipient("recipient-1", "Jane Smith")).unwrap();

    let first = store.load_profiles().unwrap();
    let second = store.load_profiles().unwrap();
    assert_eq!(first.providers.len(), second.providers.len());
    assert_eq!(
        first.providers[0].display_name,
        second.providers[0].display_name
    );
    assert_eq!(first.recipients[0].id, second.recipients[0].id);
}

#[test]
fn last_write_wins_per_id() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    store.save_profile(&provider("provider-1", "Old Name")).unwrap();
    store.save_profile(&provider("provider-1", "New Name")).unwrap();

    let book = store.load_profiles().unwrap();
    assert_eq!(book.providers.len(), 1);
    assert_eq!(book.providers[0].display_name, "New Name");
}

#[test]
fn tombstone_hides_profile_but_keeps_log_lines() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    store.save_profile(&provider("provider-1", "Acme Ltd")).unwrap();
    store
        .delete_profile("provider-1", ProfileKind::Provider)
        .unwrap();

    let book = store.load_profiles().unwrap();
    assert!(book.providers.is_empty());

    let log = fs::read_to_string(dir.path().join("profiles.local.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[test]
fn local_log_overrides_seed_log() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("seed_profiles.jsonl"),
        concat!(
            r#"{"type":"provider","id":"provider-1","display_name":"Seed Name"}"#,
            "\n",
            r#"{"type":"provider","id":"provider-2","display_name":"Seed Only"}"#,
            "\n",
        ),
    )
    .unwrap();

    let store = RecordStore::open(dir.path());
    store.save_profile(&provider("provider-1", "Local Name")).unwrap();

    let book = store.load_profiles().unwrap();
    assert_eq!(book.providers.len(), 2);
    let names: Vec<&str> = book
        .providers
        .iter()
        .map(|p| p.display_name.as_str())
        .collect();
    assert!(names.contains(&"Local Name"));
    assert!(names.contains(&"Seed Only"));
    assert!(!names.contains(&"Seed Name"));
}

#[test]
fn groups_sort_by_display_name() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    store.save_profile(&provider("provider-1", "Zeta Ltd")).unwrap();
    store.save_profile(&provider("provider-2", "Acme Ltd")).unwrap();

    let book = store.load_profiles().unwrap();
    assert_eq!(book.providers[0].display_name, "Acme Ltd");
    assert_eq!(book.providers[1].display_name, "Zeta Ltd");
}

#[test]
fn legacy_bank_transfer_reclassified_on_load() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("profiles.local.jsonl"),
        concat!(
            r#"{"type":"payment_method","id":"payment-1","label":"Old intl","method_type":"bank_transfer","details":{"iban":"GB00EXMP00000000000000"}}"#,
            "\n",
            r#"{"type":"payment_method","id":"payment-2","label":"Old local","method_type":"bank_transfer","details":{"account_number":"00000000"}}"#,
            "\n",
        ),
    )
    .unwrap();

    let store = RecordStore::open(dir.path());
    let book = store.load_profiles().unwrap();
    let intl = book.payment_by_id("payment-1").unwrap();
    let local = book.payment_by_id("payment-2").unwrap();
    assert_eq!(intl.method_type, MethodType::BankInternational);
    assert_eq!(local.method_type, MethodType::BankDomestic);
}

#[test]
fn history_returns_most_recent_first_with_limit() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    for n in 1..=3 {
        store
            .record_invoice_history(&history(&format!("INV-{n}"), "/tmp/x.html"))
            .unwrap();
    }

    let recent = store.load_history(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].invoice_number, "INV-3");
    assert_eq!(recent[1].invoice_number, "INV-2");
}

#[test]
fn prune_removes_entries_with_missing_files_once() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());

    let kept_a = dir.path().join("a.html");
    let kept_b = dir.path().join("b.html");
    fs::write(&kept_a, "x").unwrap();
    fs::write(&kept_b, "x").unwrap();

    store
        .record_invoice_history(&history("INV-1", kept_a.to_str().unwrap()))
        .unwrap();
    store
        .record_invoice_history(&history("INV-2", "/nonexistent/gone.html"))
        .unwrap();
    store
        .record_invoice_history(&history("INV-3", kept_b.to_str().unwrap()))
        .unwrap();

    assert_eq!(store.prune_missing_history_files().unwrap(), 1);
    assert_eq!(store.prune_missing_history_files().unwrap(), 0);

    let remaining = store.load_history(10).unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|e| e.invoice_number != "INV-2"));
}

#[test]
fn remove_history_entry_matches_exact_path() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    store
        .record_invoice_history(&history("INV-1", "/tmp/keep.html"))
        .unwrap();
    store
        .record_invoice_history(&history("INV-2", "/tmp/drop.html"))
        .unwrap();

    store.remove_history_entry("/tmp/drop.html").unwrap();

    let remaining = store.load_history(10).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].invoice_number, "INV-1");
}

#[test]
fn settings_default_when_missing_and_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());

    let fresh = store.load_settings().unwrap();
    assert!(fresh.selected_profiles.provider_id.is_none());
    assert!(fresh.field_defaults.is_empty());

    let mut settings = Settings::default();
    settings.selected_profiles.provider_id = Some("provider-1".into());
    settings.selected_profiles.payment_type = Some(MethodType::Paypal);
    settings.set_default("rate_per_hour", "75");
    settings.set_default("open_on_generate", true);
    store.save_settings(&settings).unwrap();

    let loaded = store.load_settings().unwrap();
    assert_eq!(
        loaded.selected_profiles.provider_id.as_deref(),
        Some("provider-1")
    );
    assert_eq!(loaded.default_str("rate_per_hour"), Some("75"));
    assert!(loaded.default_bool("open_on_generate"));
}

#[test]
fn payment_profile_details_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path());
    store
        .save_profile(&Profile::PaymentMethod(PaymentProfile {
            id: "payment-1".into(),
            label: "Main account".into(),
            method_type: MethodType::BankDomestic,
            details: BTreeMap::from([
                ("account_holder".to_string(), "Acme Ltd".to_string()),
                ("sort_code".to_string(), "00-00-00".to_string()),
            ]),
            deleted: false,
        }))
        .unwrap();

    let book = store.load_profiles().unwrap();
    let method = book.payment_by_id("payment-1").unwrap();
    assert_eq!(method.detail("account_holder"), "Acme Ltd");
    assert_eq!(method.detail("sort_code"), "00-00-00");
}
