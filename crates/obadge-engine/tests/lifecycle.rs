//! End-to-end request scenarios against a real repository layout.

mod common;

use serde_json::json;

use common::{issue, sub, Fixture, CONTRIB, TSC};
use obadge_bake::ImageKind;
use obadge_core::{CredentialKey, Email, Slug, Timestamp};
use obadge_engine::verify::{load_status_list, verify_artifact};
use obadge_engine::{EngineError, MergePolicy, Outcome, Verdict};

fn key(s: &str) -> CredentialKey {
    CredentialKey::parse(s).unwrap()
}

fn slug(s: &str) -> Slug {
    Slug::parse(s).unwrap()
}

fn verdict_of(fx: &Fixture, bytes: &[u8]) -> Verdict {
    let pk = fx.public_key();
    let list = load_status_list(&fx.paths().status_list, &pk).unwrap();
    verify_artifact(bytes, &pk, list.as_ref(), Timestamp::now()).verdict
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[test]
fn first_issue_creates_wallet_and_publishes_everything() {
    let fx = Fixture::new();
    let outcome = fx.apply(issue("Jane Doe", "Jane@Example.com", TSC));
    assert_eq!(
        outcome,
        Outcome::Created {
            credential: key("jane-doe/tsc-member-2026"),
            status_list_index: 0,
            new_wallet: true,
        }
    );

    let k = key("jane-doe/tsc-member-2026");
    let json_path = fx.paths().credential_json(&k);
    let doc = std::fs::read(&json_path).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&doc).unwrap();
    assert_eq!(value["id"], "https://credentials.cognipilot.org/profile/jane-doe/tsc-member-2026");
    assert_eq!(value["credentialSubject"]["id"], "mailto:jane@example.com");
    assert_eq!(value["credentialStatus"]["statusListIndex"], "0");
    assert_eq!(value["proof"]["cryptosuite"], "eddsa-jcs-2022");
    assert_eq!(verdict_of(&fx, &doc), Verdict::Valid);

    // Both badges carry the exact published bytes.
    for kind in [ImageKind::Svg, ImageKind::Png] {
        let badge = std::fs::read(fx.paths().badge(&k, kind)).unwrap();
        assert_eq!(obadge_bake::extract(&badge).unwrap(), doc, "{kind:?}");
        assert_eq!(verdict_of(&fx, &badge), Verdict::Valid);
    }

    let dir = fx.engine.directory();
    let wallet = dir.by_email(&Email::parse("jane@example.com").unwrap()).unwrap();
    assert_eq!(wallet.slug.as_str(), "jane-doe");
    let record = &wallet.credentials[&k.achievement];
    assert_eq!(record.valid_from, Timestamp::parse("2025-01-01T00:00:00Z").unwrap());
    assert_eq!(record.document_digest.len(), 64);
    assert_eq!(fx.engine.status_stats().total, 1);
}

#[test]
fn achievement_without_template_is_published_unbaked() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", CONTRIB));
    let k = key("jane-doe/contributor-cognipilot");
    assert!(fx.paths().credential_json(&k).is_file());
    assert!(!fx.paths().badge(&k, ImageKind::Svg).exists());
    assert!(!fx.paths().badge(&k, ImageKind::Png).exists());
}

#[test]
fn same_name_different_email_gets_suffixed_slug() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let second = fx.apply(issue("Jane Doe", "jane.doe@other.org", TSC));
    assert_eq!(second.wallet_slug().unwrap().as_str(), "jane-doe-1");
    assert_eq!(second.credential().unwrap().to_string(), "jane-doe-1/tsc-member-2026");
}

#[test]
fn custom_and_anonymized_slugs() {
    let fx = Fixture::new();
    let custom = fx.apply(json!({
        "recipient_name": "Jane Doe", "recipient_email": "jane@example.com",
        "achievement": TSC, "wallet_slug": "JD Robotics"
    }));
    assert_eq!(custom.wallet_slug().unwrap().as_str(), "jd-robotics");

    let anon = fx.apply(json!({
        "recipient_name": "Private Person", "recipient_email": "private@example.com",
        "achievement": TSC, "anonymize_slug": true
    }));
    let s = anon.wallet_slug().unwrap().as_str().to_string();
    assert_eq!(s.len(), 12);
    assert!(!s.contains("private"));
}

#[test]
fn non_latin_name_falls_back_to_anonymized_slug() {
    let fx = Fixture::new();
    let o = fx.apply(issue("山田太郎", "taro@example.jp", TSC));
    assert_eq!(o.wallet_slug().unwrap().as_str().len(), 12);
}

#[test]
fn identical_reissue_is_unchanged_and_different_fields_conflict() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let before = fx.snapshot();

    // A distinct submission with the same fields reaches the handler.
    let again = fx
        .engine
        .apply(&sub(issue("Jane Doe", "jane@example.com", TSC)).with_id("resend"))
        .unwrap();
    assert!(again.is_unchanged(), "{again:?}");

    let renamed = json!({
        "recipient_name": "Jane Q. Doe", "recipient_email": "jane@example.com",
        "achievement": TSC, "valid_from": "2025-01-01"
    });
    let err = fx.engine.apply(&sub(renamed)).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err}");
    assert_eq!(fx.snapshot(), before);
}

#[test]
fn issue_already_revoked_sets_the_bit() {
    let fx = Fixture::new();
    fx.apply(json!({
        "recipient_name": "Jane Doe", "recipient_email": "jane@example.com",
        "achievement": TSC, "status": "revoked"
    }));
    let k = key("jane-doe/tsc-member-2026");
    assert!(fx.engine.status_registry().get(&k).unwrap().revoked);
    let doc = std::fs::read(fx.paths().credential_json(&k)).unwrap();
    assert_eq!(verdict_of(&fx, &doc), Verdict::Revoked);
}

#[test]
fn unknown_achievement_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .engine
        .apply(&sub(issue("Jane Doe", "jane@example.com", "no-such-badge")))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert!(fx.engine.directory().is_empty());
}

// ---------------------------------------------------------------------------
// Update and merge
// ---------------------------------------------------------------------------

#[test]
fn update_fields_resigns_in_place() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let o = fx.apply(json!({
        "request_type": "update", "old_email": "jane@example.com",
        "recipient_email": "jane@example.com", "achievement": TSC,
        "recipient_name": "Jane Q. Doe", "valid_until": "2027-01-01"
    }));
    assert!(matches!(o, Outcome::Updated { email_changed: false, .. }), "{o:?}");

    let k = key("jane-doe/tsc-member-2026");
    let v = fx.read_json(&fx.paths().credential_json(&k));
    assert_eq!(v["credentialSubject"]["name"], "Jane Q. Doe");
    assert_eq!(v["credentialStatus"]["statusListIndex"], "0");
    assert!(v["validUntil"].as_str().unwrap().starts_with("2027-01-01"));

    // Clearing the end of validity.
    fx.apply(json!({
        "request_type": "update", "old_email": "jane@example.com",
        "recipient_email": "jane@example.com", "achievement": TSC, "valid_until": null
    }));
    assert!(fx.read_json(&fx.paths().credential_json(&k)).get("validUntil").is_none());
}

#[test]
fn update_with_backwards_window_is_rejected() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let err = fx
        .engine
        .apply(&sub(json!({
            "request_type": "update", "old_email": "jane@example.com",
            "recipient_email": "jane@example.com", "achievement": TSC,
            "valid_until": "2024-06-01"
        })))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn update_to_unused_email_keeps_slug() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(issue("Jane Doe", "jane@example.com", CONTRIB));
    let o = fx.apply(json!({
        "request_type": "update", "old_email": "jane@example.com",
        "recipient_email": "jane@newjob.com", "achievement": TSC
    }));
    match o {
        Outcome::Updated { wallet, credentials, email_changed } => {
            assert_eq!(wallet.as_str(), "jane-doe");
            assert!(email_changed);
            assert_eq!(credentials.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    let dir = fx.engine.directory();
    assert!(dir.by_email(&Email::parse("jane@example.com").unwrap()).is_none());
    let v = fx.read_json(&fx.paths().credential_json(&key("jane-doe/contributor-cognipilot")));
    assert_eq!(v["credentialSubject"]["id"], "mailto:jane@newjob.com");
}

#[test]
fn update_to_existing_email_merges_wallets() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(issue("Jane Doe", "jane@work.com", CONTRIB));
    let before = fx.engine.status_registry();
    let tsc_index = before.get(&key("jane-doe/tsc-member-2026")).unwrap().index;

    let o = fx.apply(json!({
        "request_type": "update", "old_email": "jane@example.com",
        "recipient_email": "jane@work.com", "achievement": TSC
    }));
    assert_eq!(
        o,
        Outcome::Merged {
            from: slug("jane-doe"),
            into: slug("jane-doe-1"),
            credentials: vec![key("jane-doe-1/tsc-member-2026")],
            dropped: vec![],
        }
    );

    let dir = fx.engine.directory();
    assert!(dir.get(&slug("jane-doe")).is_none());
    assert!(dir.retired_slugs().contains(&slug("jane-doe")));
    assert_eq!(dir.get(&slug("jane-doe-1")).unwrap().credentials.len(), 2);

    let status = fx.engine.status_registry();
    assert_eq!(status.get(&key("jane-doe-1/tsc-member-2026")).unwrap().index, tsc_index);
    assert!(status.get(&key("jane-doe/tsc-member-2026")).is_none());

    assert!(!fx.paths().wallet_dir(&slug("jane-doe")).exists());
    let moved = std::fs::read(fx.paths().credential_json(&key("jane-doe-1/tsc-member-2026"))).unwrap();
    assert_eq!(verdict_of(&fx, &moved), Verdict::Valid);
}

#[test]
fn merge_with_diverging_shared_achievement_is_rejected_atomically() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(issue("J. Doe", "jane@work.com", TSC));
    fx.apply(issue("Jane Doe", "jane@example.com", CONTRIB));
    let before = fx.snapshot();

    let err = fx
        .engine
        .apply(&sub(json!({
            "request_type": "update", "old_email": "jane@example.com",
            "recipient_email": "jane@work.com", "achievement": CONTRIB
        })))
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err}");
    assert_eq!(fx.snapshot(), before);
}

#[test]
fn prefer_destination_policy_drops_the_source_copy() {
    let fx = Fixture::with_config(|c| c.merge_policy = MergePolicy::PreferDestination);
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(issue("J. Doe", "jane@work.com", TSC));
    let o = fx.apply(json!({
        "request_type": "update", "old_email": "jane@example.com",
        "recipient_email": "jane@work.com", "achievement": TSC
    }));
    match o {
        Outcome::Merged { dropped, credentials, .. } => {
            assert_eq!(dropped, vec![key("jane-doe/tsc-member-2026")]);
            assert!(credentials.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
    let status = fx.engine.status_registry();
    assert_eq!(status.retired.len(), 1);
    assert_eq!(status.credentials.len(), 1);
}

// ---------------------------------------------------------------------------
// Rename and remove
// ---------------------------------------------------------------------------

#[test]
fn rename_moves_artifacts_and_retires_old_slug() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let o = fx.apply(json!({
        "request_type": "rename_wallet", "recipient_email": "jane@example.com",
        "new_wallet_slug": "Jane Robotics"
    }));
    assert_eq!(
        o,
        Outcome::Renamed {
            from: slug("jane-doe"),
            to: slug("jane-robotics"),
            credentials: vec![key("jane-robotics/tsc-member-2026")],
        }
    );
    assert!(!fx.paths().wallet_dir(&slug("jane-doe")).exists());
    let doc = std::fs::read(fx.paths().credential_json(&key("jane-robotics/tsc-member-2026"))).unwrap();
    assert_eq!(verdict_of(&fx, &doc), Verdict::Valid);

    // Nobody can take the retired slug, including by renaming back.
    fx.apply(issue("Other Person", "other@example.com", TSC));
    let err = fx
        .engine
        .apply(&sub(json!({
            "request_type": "rename", "recipient_email": "other@example.com",
            "new_wallet_slug": "jane-doe"
        })))
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    let again = fx.apply(issue("Jane Doe", "jane.doe@fresh.org", TSC));
    assert_eq!(again.wallet_slug().unwrap().as_str(), "jane-doe-1");
}

#[test]
fn rename_to_current_slug_is_unchanged() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let o = fx.apply(json!({
        "request_type": "rename_wallet", "recipient_email": "jane@example.com",
        "new_wallet_slug": "jane-doe"
    }));
    assert!(o.is_unchanged());
}

#[test]
fn remove_then_recreate_gets_new_slug_and_index() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    let removed = fx.apply(json!({
        "request_type": "remove", "recipient_email": "jane@example.com", "remove_profile": true
    }));
    assert!(matches!(removed, Outcome::Removed { wallet_removed: true, .. }));
    assert!(!fx.paths().wallet_dir(&slug("jane-doe")).exists());

    let again = fx
        .engine
        .apply(&sub(issue("Jane Doe", "jane@example.com", TSC)).with_id("second-issue"))
        .unwrap();
    assert_eq!(
        again,
        Outcome::Created {
            credential: key("jane-doe-1/tsc-member-2026"),
            status_list_index: 1,
            new_wallet: true,
        }
    );
    let stats = fx.engine.status_stats();
    assert_eq!((stats.total, stats.retired, stats.next_index), (1, 1, 2));
}

#[test]
fn remove_single_achievement_keeps_wallet() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(issue("Jane Doe", "jane@example.com", CONTRIB));
    let err = fx
        .engine
        .apply(&sub(json!({
            "request_type": "remove", "recipient_email": "jane@example.com",
            "achievements": [CONTRIB, "never-issued"]
        })))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    fx.apply(json!({
        "request_type": "remove", "recipient_email": "jane@example.com", "achievements": [CONTRIB]
    }));
    let dir = fx.engine.directory();
    let wallet = dir.get(&slug("jane-doe")).unwrap();
    assert_eq!(wallet.credentials.len(), 1);
    assert!(!fx.paths().credential_dir(&key("jane-doe/contributor-cognipilot")).exists());
    assert!(fx.paths().credential_json(&key("jane-doe/tsc-member-2026")).exists());
}

// ---------------------------------------------------------------------------
// Revocation
// ---------------------------------------------------------------------------

#[test]
fn revoke_flips_one_bit_and_verifier_sees_it() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(issue("John Roe", "john@example.com", TSC));
    let k = key("jane-doe/tsc-member-2026");
    let doc_before = std::fs::read(fx.paths().credential_json(&k)).unwrap();

    let o = fx.apply(json!({"request_type": "revoke", "credential_id": "jane-doe/tsc-member-2026"}));
    assert_eq!(o, Outcome::Revoked { credential: k.clone(), status_list_index: 0 });

    let pk = fx.public_key();
    let list = load_status_list(&fx.paths().status_list, &pk).unwrap().unwrap();
    assert!(obadge_status::status_bit(&list, 0).unwrap());
    assert!(!obadge_status::status_bit(&list, 1).unwrap());
    assert_eq!(obadge_status::Bitstring::decode(&list.credential_subject.encoded_list).unwrap().count_ones(), 1);

    // The credential itself is not re-signed.
    assert_eq!(std::fs::read(fx.paths().credential_json(&k)).unwrap(), doc_before);
    assert_eq!(verdict_of(&fx, &doc_before), Verdict::Revoked);
    let john = std::fs::read(fx.paths().credential_json(&key("john-roe/tsc-member-2026"))).unwrap();
    assert_eq!(verdict_of(&fx, &john), Verdict::Valid);

    let again = fx
        .engine
        .apply(&sub(json!({"request_type": "revoke", "recipient_email": "jane@example.com", "achievement": TSC})))
        .unwrap();
    assert!(again.is_unchanged());

    let restored = fx.apply(json!({
        "request_type": "revoke", "credential_id": "jane-doe/tsc-member-2026", "unrevoke": true
    }));
    assert!(matches!(restored, Outcome::Restored { status_list_index: 0, .. }));
    assert_eq!(verdict_of(&fx, &doc_before), Verdict::Valid);
}

#[test]
fn revoke_unknown_credential_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .engine
        .apply(&sub(json!({"request_type": "revoke", "credential_id": "ghost/tsc-member-2026"})))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn removed_revoked_credential_keeps_its_bit() {
    let fx = Fixture::new();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));
    fx.apply(json!({"request_type": "revoke", "credential_id": "jane-doe/tsc-member-2026"}));
    fx.apply(json!({"request_type": "remove", "recipient_email": "jane@example.com", "remove_profile": true}));
    let list = load_status_list(&fx.paths().status_list, &fx.public_key()).unwrap().unwrap();
    assert!(obadge_status::status_bit(&list, 0).unwrap());
}

// ---------------------------------------------------------------------------
// Persistence across engines
// ---------------------------------------------------------------------------

#[test]
fn a_second_engine_sees_committed_state() {
    let fx = Fixture::new();
    let other = fx.reopen();
    fx.apply(issue("Jane Doe", "jane@example.com", TSC));

    // `other` loaded before the issue; it reloads under the lock.
    let o = other.apply(&sub(issue("John Roe", "john@example.com", TSC))).unwrap();
    assert!(matches!(o, Outcome::Created { status_list_index: 1, .. }), "{o:?}");
    assert_eq!(other.directory().len(), 2);

    fx.engine.reload().unwrap();
    assert_eq!(fx.engine.credentials().len(), 2);
    assert_eq!(fx.engine.status_registry().version, 2);
}
