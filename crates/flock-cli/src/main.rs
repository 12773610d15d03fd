use std::error::Error;
use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flock_core::app::{Pipeline, PipelineBuilder};
use flock_core::config::FlockConfig;
use flock_core::domain::UserId;
use flock_core::impls::{
    InMemoryFeedStore, InMemoryFollowGraph, InMemoryMessageStore, InMemoryUserDirectory,
    RedisFeedStore,
};
use flock_core::ports::{EventPublisher, EventSubscription, FeedStore};

type BoxError = Box<dyn Error + Send + Sync>;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(feature = "kafka")]
fn broker(
    config: &FlockConfig,
) -> Result<(Arc<dyn EventPublisher>, Arc<dyn EventSubscription>), BoxError> {
    use flock_core::impls::{KafkaEventPublisher, KafkaSubscription};

    let publisher = KafkaEventPublisher::new(&config.broker)?;
    let subscription = KafkaSubscription::new(&config.broker)?;
    Ok((Arc::new(publisher), Arc::new(subscription)))
}

#[cfg(not(feature = "kafka"))]
fn broker(
    _config: &FlockConfig,
) -> Result<(Arc<dyn EventPublisher>, Arc<dyn EventSubscription>), BoxError> {
    let broker = flock_core::impls::InMemoryBroker::new();
    Ok((Arc::new(broker.clone()), Arc::new(broker)))
}

async fn feed_store(config: &FlockConfig) -> Result<Arc<dyn FeedStore>, BoxError> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisFeedStore::connect(url, config.feed.clone()).await?;
            info!("using redis feed store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryFeedStore::new(config.feed.clone()))),
    }
}

/// A が "hello" を投稿し、F1 / F2 の timeline に届くのを待つ
async fn demo(pipeline: &Pipeline) -> Result<(), BoxError> {
    let author = UserId::new("A");
    let followers = [UserId::new("F1"), UserId::new("F2")];

    for follower in &followers {
        pipeline.follows().follow(follower, &author).await?;
    }

    let posted = pipeline.messages().post_message(&author, "hello").await?;
    println!("posted: {} by {}", posted.message.id(), posted.message.author());

    let outcome = posted.delivery.await?;
    println!("delivery: {outcome:?}");

    for follower in &followers {
        let mut timeline = Vec::new();
        for _ in 0..100 {
            timeline = pipeline.timelines().timeline(follower).await?;
            if !timeline.is_empty() {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
        if timeline.is_empty() {
            warn!(user = %follower, "timeline still empty");
        }
        for message in &timeline {
            println!(
                "timeline[{follower}]: {} {}: {}",
                message.created_at().to_rfc3339(),
                message.author(),
                message.body()
            );
        }
    }

    let bystander = pipeline.timelines().timeline(&UserId::new("F3")).await?;
    println!("timeline[F3]: {} entries", bystander.len());

    println!("dead letters: {}", pipeline.dead_letter_status().await?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let config = FlockConfig::from_env()?;
    let (publisher, subscription) = broker(&config)?;

    let pipeline = PipelineBuilder::new(config.clone())
        .message_store(Arc::new(InMemoryMessageStore::new()))
        .user_directory(Arc::new(InMemoryUserDirectory::new()))
        .follow_graph(Arc::new(InMemoryFollowGraph::new()))
        .publisher(publisher)
        .subscription(subscription)
        .feed_store(feed_store(&config).await?)
        .build()?;

    let handle = pipeline.start();

    let result = tokio::select! {
        result = demo(&pipeline) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
    };

    handle.shutdown_and_join().await;
    result
}
