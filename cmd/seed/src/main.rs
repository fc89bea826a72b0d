//! Seeds a forum store with demo users, threads, comments, tags and likes.
//!
//! Settings come from `configs::Settings::load()`. With
//! `store.snapshot_path` set, the store is restored from that file when it
//! exists and written back after seeding, so repeated runs accumulate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use configs::{Settings, SubscriptionMode, TelemetrySettings};
use domains::{Actor, ContentStore, ErrorKind, NewUser, ThreadQuery, ThreadSort};
use services::Forum;
use storage_adapters::{InMemoryContentStore, PollingContentStore};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(telemetry: &TelemetrySettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&telemetry.level));
    let registry = tracing_subscriber::registry().with(filter);
    if telemetry.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<InMemoryContentStore>> {
    let capacity = settings.store.channel_capacity;
    let Some(path) = settings.store.snapshot_path.as_deref().filter(|p| p.exists()) else {
        return Ok(Arc::new(InMemoryContentStore::with_capacity(capacity)));
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot = serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))?;
    let store = InMemoryContentStore::from_snapshot(snapshot, capacity)?;
    info!(path = %path.display(), "restored store snapshot");
    Ok(Arc::new(store))
}

async fn save_snapshot(store: &InMemoryContentStore, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let json = serde_json::to_string_pretty(&store.snapshot().await)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing snapshot {}", path.display()))?;
    info!(path = %path.display(), "store snapshot written");
    Ok(())
}

/// Registers a demo member, reusing the profile if an earlier run created it.
async fn member(forum: &Forum, handle: &str, first: &str, last: &str) -> anyhow::Result<Actor> {
    let email = format!("{handle}@example.com");
    let user = NewUser::new(handle, &format!("uid-{handle}"), first, last, &email)?;
    match forum.users().register(user).await {
        Ok(user) => Ok(Actor::from(&user)),
        Err(err) if err.kind() == ErrorKind::Duplicate => {
            let existing = forum.users().get_by_handle(&domains::Handle::new(handle)?).await?;
            Ok(Actor::from(&existing))
        }
        Err(err) => Err(err.into()),
    }
}

async fn seed(forum: &Forum) -> anyhow::Result<()> {
    let alice = member(forum, "alice", "Alice", "Liddell").await?;
    let bob = member(forum, "bob", "Bob", "Tern").await?;
    let carol = member(forum, "carol", "Carol", "Peak").await?;

    let everest = forum
        .create_thread(&alice, "Everest Trip", "Amazing climb up the south col.", "Nepal")
        .await?;
    let lakes = forum
        .create_thread(&bob, "Alpine lakes", "Best swims above 2000m?", "Switzerland")
        .await?;

    forum.add_comment(&bob, &everest, "Nice!").await?;
    forum.add_comment(&carol, &everest, "How long did acclimatization take?").await?;
    forum.add_comment(&alice, &lakes, "Lac Blanc, every time.").await?;

    forum.attach_tags(&alice, &everest, "Everest, Nepal, climbing").await?;
    forum.attach_tags(&bob, &lakes, "swimming, Alps").await?;

    forum.like_thread(&carol, &everest).await?;
    forum.like_thread(&bob, &everest).await?;
    forum.toggle_like(&alice, &lakes).await?;

    for summary in forum.list_threads(&ThreadQuery::default().sorted_by(ThreadSort::Date)).await? {
        let tags = forum.list_tags_for_thread(&summary.thread.id).await?;
        info!(
            thread_id = %summary.thread.id,
            title = %summary.thread.title,
            comments = summary.comment_count,
            likes = summary.like_count,
            tags = tags.len(),
            "seeded thread"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.telemetry);

    let memory = open_store(&settings).await?;
    let store: Arc<dyn ContentStore> = match settings.store.subscriptions {
        SubscriptionMode::Push => memory.clone() as Arc<dyn ContentStore>,
        SubscriptionMode::Poll => Arc::new(PollingContentStore::new(memory.clone(), settings.store.poll_interval())),
    };
    let forum = Forum::new(store, settings.forum.clone());

    let subscription = forum
        .subscribe_thread_count(|count| info!(count, "thread count changed"))
        .await?;

    if let Err(err) = seed(&forum).await {
        warn!(error = %err, "seeding stopped early");
    }

    // let pending notifications drain before releasing the listener
    tokio::time::sleep(Duration::from_millis(50)).await;
    subscription.unsubscribe();

    info!(
        threads = forum.count_threads().await?,
        users = forum.count_users().await?,
        "seed complete"
    );

    if let Some(path) = settings.store.snapshot_path.as_deref() {
        save_snapshot(&memory, path).await?;
    }
    Ok(())
}
