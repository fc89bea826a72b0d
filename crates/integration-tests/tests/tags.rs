use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use domains::{ErrorKind, ForumPolicy, TagMatching};
use integration_tests::TestForum;
use tokio_test::{assert_err, assert_ok};

const STORE_DELAY: Duration = Duration::from_millis(5);

fn strict_policy() -> ForumPolicy {
    let mut policy = ForumPolicy::default();
    policy.tags.strict = true;
    policy.tags.max_cas_attempts = 16;
    policy
}

#[tokio::test]
async fn same_name_reuses_one_registry_entry() {
    let t = TestForum::new().await;
    let a = t.thread(&t.alice, "Everest Trip").await;
    let b = t.thread(&t.bob, "Everest again").await;

    let first = assert_ok!(t.forum.attach_tag(&t.alice, &a, "Everest").await).unwrap();
    let second = assert_ok!(t.forum.attach_tag(&t.bob, &b, "  Everest ").await).unwrap();
    assert_eq!(first.id, second.id);

    let registry = t.forum.tags().list_all().await.unwrap();
    assert_eq!(registry.iter().filter(|tag| tag.name.as_str() == "Everest").count(), 1);

    let found = t.forum.tags().find_by_name("Everest").await.unwrap();
    assert_eq!(found.map(|tag| tag.id), Some(first.id));
}

#[tokio::test]
async fn attaching_twice_is_idempotent() {
    let t = TestForum::new().await;
    let id = t.thread(&t.alice, "Everest Trip").await;

    let first = t.forum.attach_tag(&t.alice, &id, "Nepal").await.unwrap();
    let again = t.forum.attach_tag(&t.alice, &id, "Nepal").await.unwrap();
    assert_eq!(first, again);
    assert_eq!(t.forum.tags().association_count(&id).await.unwrap(), 1);
}

#[tokio::test]
async fn blank_text_is_a_no_op() {
    let t = TestForum::new().await;
    let id = t.thread(&t.alice, "Everest Trip").await;

    assert_eq!(assert_ok!(t.forum.attach_tag(&t.alice, &id, "   ").await), None);
    assert!(t.forum.tags().list_all().await.unwrap().is_empty());
    assert_eq!(t.raw("postTags").await, None);
}

#[tokio::test]
async fn eleventh_tag_is_rejected() {
    let t = TestForum::new().await;
    let id = t.thread(&t.alice, "Everest Trip").await;
    for i in 0..10 {
        t.forum.attach_tag(&t.alice, &id, &format!("tag{i}")).await.unwrap();
    }

    let err = assert_err!(t.forum.attach_tag(&t.alice, &id, "one-too-many").await);
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    assert_eq!(t.forum.tags().association_count(&id).await.unwrap(), 10);
    assert_eq!(t.forum.tags().find_by_name("one-too-many").await.unwrap(), None);
}

#[tokio::test]
async fn comma_separated_entry_attaches_each_name() {
    let t = TestForum::new().await;
    let id = t.thread(&t.alice, "Everest Trip").await;

    let tags = t
        .forum
        .attach_tags(&t.alice, &id, "Everest, Nepal,, climbing ,")
        .await
        .unwrap();
    let names: Vec<_> = tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, ["Everest", "Nepal", "climbing"]);

    let listed: BTreeSet<_> = t
        .forum
        .list_tags_for_thread(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|tag| tag.name.to_string())
        .collect();
    assert_eq!(listed.len(), 3);
    assert!(listed.contains("climbing"));
}

#[tokio::test]
async fn too_long_tag_is_invalid() {
    let t = TestForum::new().await;
    let id = t.thread(&t.alice, "Everest Trip").await;
    let err = assert_err!(t.forum.attach_tag(&t.alice, &id, &"x".repeat(33)).await);
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn detach_removes_only_the_edge() {
    let t = TestForum::new().await;
    let id = t.thread(&t.alice, "Everest Trip").await;
    let tag = t.forum.attach_tag(&t.alice, &id, "Everest").await.unwrap().unwrap();
    assert!(t.forum.thread_has_tag(&id, &tag.id).await.unwrap());

    assert_ok!(t.forum.detach_tag(&t.alice, &id, &tag.id).await);
    assert!(!t.forum.thread_has_tag(&id, &tag.id).await.unwrap());
    assert_eq!(t.forum.tags().get(&tag.id).await.unwrap(), tag);

    // re-attaching reuses the surviving registry entry
    let again = t.forum.attach_tag(&t.alice, &id, "Everest").await.unwrap().unwrap();
    assert_eq!(again.id, tag.id);
}

#[tokio::test]
async fn threads_by_tag_probes_every_thread() {
    let t = TestForum::new().await;
    let a = t.thread(&t.alice, "Everest Trip").await;
    let b = t.thread(&t.bob, "Alpine lakes").await;
    let c = t.thread(&t.carol, "Everest base camp").await;
    let tag = t.forum.attach_tag(&t.alice, &a, "Everest").await.unwrap().unwrap();
    t.forum.attach_tag(&t.bob, &b, "Alps").await.unwrap();
    t.forum.attach_tag(&t.carol, &c, "Everest").await.unwrap();

    let tagged = t.forum.list_threads_by_tag(&tag.id).await.unwrap();
    let ids: Vec<_> = tagged.into_iter().map(|s| s.thread.id).collect();
    assert_eq!(ids, [a, c]);
}

#[tokio::test]
async fn case_insensitive_matching_folds_names() {
    let mut policy = ForumPolicy::default();
    policy.tags.matching = TagMatching::CaseInsensitive;
    let t = TestForum::with_policy(policy).await;
    let a = t.thread(&t.alice, "Everest Trip").await;
    let b = t.thread(&t.bob, "Everest again").await;

    let first = t.forum.attach_tag(&t.alice, &a, "Everest").await.unwrap().unwrap();
    let second = t.forum.attach_tag(&t.bob, &b, "EVEREST").await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(second.name.as_str(), "Everest");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strict_mode_converges_on_one_tag_under_concurrency() {
    let t = Arc::new(TestForum::slow(strict_policy(), STORE_DELAY).await);
    let mut threads = Vec::new();
    for i in 0..8 {
        threads.push(t.thread(&t.alice, &format!("Everest day {i}")).await);
    }

    let mut tasks = Vec::new();
    for id in threads.clone() {
        let t = Arc::clone(&t);
        tasks.push(tokio::spawn(async move {
            t.forum.attach_tag(&t.alice, &id, "Everest").await
        }));
    }
    let mut ids = BTreeSet::new();
    for task in tasks {
        let tag = task.await.unwrap().unwrap().unwrap();
        ids.insert(tag.id);
    }

    assert_eq!(ids.len(), 1);
    let registry = t.forum.tags().list_all().await.unwrap();
    assert_eq!(registry.len(), 1);
    let index = t.raw("tagIndex").await.unwrap();
    assert_eq!(index.as_object().unwrap().len(), 1);
    for id in &threads {
        // losers dropped their own markers, so nothing dangles
        assert_eq!(t.forum.tags().association_count(id).await.unwrap(), 1);
        assert_eq!(t.forum.list_tags_for_thread(id).await.unwrap(), registry);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strict_mode_never_exceeds_the_cap() {
    let t = Arc::new(TestForum::slow(strict_policy(), STORE_DELAY).await);
    let id = t.thread(&t.alice, "Everest Trip").await;
    for i in 0..8 {
        t.forum.attach_tag(&t.alice, &id, &format!("tag{i}")).await.unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..6 {
        let t = Arc::clone(&t);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("late{i}");
            (t.forum.attach_tag(&t.alice, &id, &name).await, name)
        }));
    }
    let mut attached = Vec::new();
    let mut rejected = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            (Ok(_), name) => attached.push(name),
            (Err(err), name) => {
                assert_eq!(err.kind(), ErrorKind::LimitExceeded);
                rejected.push(name);
            }
        }
    }

    assert_eq!(attached.len(), 2);
    assert_eq!(rejected.len(), 4);
    assert_eq!(t.forum.tags().association_count(&id).await.unwrap(), 10);

    // rejected calls wrote nothing to the registry or its index
    for name in &rejected {
        assert_eq!(t.forum.tags().find_by_name(name).await.unwrap(), None);
    }
    assert_eq!(t.forum.tags().list_all().await.unwrap().len(), 10);
    assert_eq!(t.raw("tagIndex").await.unwrap().as_object().unwrap().len(), 10);
    let listed: BTreeSet<_> = t
        .forum
        .list_tags_for_thread(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|tag| tag.name.to_string())
        .collect();
    for name in &attached {
        assert!(listed.contains(name));
    }
}
