//! Property tests for the privacy primitives: signed URLs, pseudonyms,
//! retention arithmetic, and agreement bounds.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use anvil::agreement::{compute_cohen, compute_fleiss, compute_krippendorff, Observation};
use anvil::core::{Clock, FixedClock};
use anvil::model::schema::FieldMetadata;
use anvil::privacy::pseudonym::{PseudonymGenerator, PSEUDONYM_PREFIX};
use anvil::privacy::retention::{expiration_date, is_expired};
use anvil::privacy::signed_url::{self, secure_compare, SignedUrlError, SignedUrlOptions};

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

fn obs(triples: &[(String, String, String)]) -> Vec<Observation> {
    triples
        .iter()
        .map(|(sample, rater, value)| Observation {
            sample_id: sample.clone(),
            rater_id: rater.clone(),
            value: value.clone(),
        })
        .collect()
}

proptest! {
    #[test]
    fn signed_url_round_trip(
        resource in "[a-zA-Z0-9_./ -]{1,40}",
        secret in proptest::collection::vec(any::<u8>(), 16..64),
        tenant in proptest::option::of("[a-z0-9-]{1,16}"),
    ) {
        let clock = clock();
        let mut options = SignedUrlOptions::default()
            .with_base_url("https://assets.anvil.dev/files");
        if let Some(tenant) = &tenant {
            options = options.with_tenant(tenant.clone());
        }

        let url = signed_url::generate(&resource, &secret, &options, &clock);
        let verified = signed_url::verify(&url, &secret, tenant.as_deref(), &clock).unwrap();
        prop_assert_eq!(verified, resource);
    }

    #[test]
    fn signed_url_rejects_a_different_secret(
        resource in "[a-zA-Z0-9_-]{1,40}",
        secret in proptest::collection::vec(any::<u8>(), 16..64),
        other in proptest::collection::vec(any::<u8>(), 16..64),
    ) {
        prop_assume!(secret != other);
        let clock = clock();
        let options = SignedUrlOptions::default().with_base_url("https://x");

        let url = signed_url::generate(&resource, &secret, &options, &clock);
        prop_assert_eq!(
            signed_url::verify(&url, &other, None, &clock),
            Err(SignedUrlError::InvalidSignature)
        );
    }

    #[test]
    fn secure_compare_agrees_with_equality(
        a in proptest::collection::vec(any::<u8>(), 0..64),
        b in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assert_eq!(secure_compare(&a, &b), a == b);
    }

    #[test]
    fn pseudonyms_are_pure_and_well_formed(
        external in "[a-zA-Z0-9@._-]{1,40}",
        tenant in "[a-z0-9-]{1,16}",
    ) {
        let generator =
            PseudonymGenerator::new(b"0123456789abcdef0123456789abcdef").unwrap();

        let first = generator.generate(&external, &tenant);
        let second = generator.generate(&external, &tenant);
        prop_assert_eq!(&first, &second);

        let hex_part = first.strip_prefix(PSEUDONYM_PREFIX).unwrap();
        prop_assert_eq!(hex_part.len(), 16);
        prop_assert!(hex_part
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn retention_boundary_is_exact(days in 1u32..4000, offset_secs in -864000i64..864000) {
        let submitted = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let metadata = FieldMetadata {
            retention_days: Some(days),
            ..FieldMetadata::default()
        };

        let expires = expiration_date(&metadata, submitted).unwrap();
        let now = expires + Duration::seconds(offset_secs);
        prop_assert_eq!(is_expired(&metadata, submitted, now), offset_secs >= 0);
    }

    #[test]
    fn indefinite_retention_never_expires(offset_days in 0i64..100_000) {
        let submitted = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let metadata = FieldMetadata::default();
        prop_assert!(expiration_date(&metadata, submitted).is_none());
        prop_assert!(!is_expired(
            &metadata,
            submitted,
            submitted + Duration::days(offset_days)
        ));
    }

    #[test]
    fn perfect_agreement_scores_one_for_every_metric(
        categories in proptest::collection::vec("[a-d]", 2..12),
    ) {
        // Two raters agreeing on every sample, three raters likewise.
        let pairs: Vec<(String, String, String)> = categories
            .iter()
            .enumerate()
            .flat_map(|(i, value)| {
                ["r1", "r2"].iter().map(move |rater| {
                    (format!("s{i}"), rater.to_string(), value.clone())
                })
            })
            .collect();
        let observations = obs(&pairs);

        let cohen = compute_cohen(&observations).unwrap();
        prop_assert!((cohen - 1.0).abs() < 1e-9);

        let krippendorff = compute_krippendorff(&observations).unwrap();
        prop_assert!((krippendorff - 1.0).abs() < 1e-9);

        let triples: Vec<(String, String, String)> = categories
            .iter()
            .enumerate()
            .flat_map(|(i, value)| {
                ["r1", "r2", "r3"].iter().map(move |rater| {
                    (format!("s{i}"), rater.to_string(), value.clone())
                })
            })
            .collect();
        let fleiss = compute_fleiss(&obs(&triples)).unwrap();
        prop_assert!((fleiss - 1.0).abs() < 1e-9);
    }
}

#[test]
fn signed_url_expiry_is_observed() {
    let clock = clock();
    let options = SignedUrlOptions::default()
        .with_base_url("https://assets.anvil.dev/files")
        .with_expires_in(Duration::seconds(1));

    let secret = b"a-long-enough-signing-secret-for-tests";
    let url = signed_url::generate("asset-9", secret, &options, &clock);
    assert!(signed_url::verify(&url, secret, None, &clock).is_ok());

    // Wait out the lifetime (simulated).
    clock.advance(Duration::seconds(2));
    assert_eq!(
        signed_url::verify(&url, secret, None, &clock),
        Err(SignedUrlError::Expired)
    );
    // now == expires_at is already expired.
    let clock2 = FixedClock::new(clock.now() - Duration::seconds(1));
    assert_eq!(
        signed_url::verify(&url, secret, None, &clock2),
        Err(SignedUrlError::Expired)
    );
}
