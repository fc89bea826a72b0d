use std::collections::HashMap;

use configs::{ConfigError, Settings, SubscriptionMode};
use domains::ErrorKind;
use integration_tests::TestForum;
use tokio_test::assert_err;

#[tokio::test]
async fn configured_policy_drives_the_forum() {
    let toml = r#"
        [forum.validation.title]
        min = 5
        max = 20

        [forum.tags]
        max_per_thread = 2
    "#;
    let settings = Settings::from_parts(toml, HashMap::new()).unwrap();
    let t = TestForum::with_policy(settings.forum).await;

    let err = assert_err!(t.forum.create_thread(&t.alice, "Trip", "Amazing climb", "Nepal").await);
    assert_eq!(err.kind(), ErrorKind::Validation);

    let id = t.thread(&t.alice, "Everest Trip").await;
    t.forum.attach_tags(&t.alice, &id, "Everest, Nepal").await.unwrap();
    let err = assert_err!(t.forum.attach_tag(&t.alice, &id, "climbing").await);
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
}

#[test]
fn environment_selects_polling_and_strict_tags() {
    let vars = HashMap::from([
        ("FORUM__STORE__SUBSCRIPTIONS".to_string(), "poll".to_string()),
        ("FORUM__STORE__POLL_INTERVAL_MS".to_string(), "40".to_string()),
        ("FORUM__FORUM__TAGS__STRICT".to_string(), "true".to_string()),
    ]);
    let settings = Settings::from_parts("", vars).unwrap();
    assert_eq!(settings.store.subscriptions, SubscriptionMode::Poll);
    assert_eq!(settings.store.poll_interval().as_millis(), 40);
    assert!(settings.forum.tags.strict);
}

#[test]
fn zero_tag_cap_is_rejected() {
    let err = Settings::from_parts("[forum.tags]\nmax_per_thread = 0\n", HashMap::new()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("max_per_thread")));
}
