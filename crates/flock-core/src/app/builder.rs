//! PipelineBuilder - ports のワイヤリングと起動
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 必須の port が欠けていれば `build()` が失敗する
//! - watch channel による協調的な shutdown（`PipelineHandle`）

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::FlockConfig;
use crate::domain::DeadLetterError;
use crate::impls::BoundedDeadLetterStore;
use crate::ports::{
    Clock, DeadLetterStore, EventPublisher, EventSubscription, FeedStore, FollowGraph,
    IdGenerator, MessageStore, SystemClock, UlidGenerator, UserDirectory,
};

use super::fanout::FanoutConsumer;
use super::publish_pipeline::PublishPipeline;
use super::reprocessor::DeadLetterReprocessor;
use super::retry::RetryPolicy;
use super::services::{FollowService, MessageService, TimelineService};
use super::status::DeadLetterStatus;

/// BuildError はパイプライン構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing component: {0}. Supply it on the builder before calling build().")]
    Missing(&'static str),
}

/// PipelineBuilder は Pipeline を構築
///
/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new(config)
///     .message_store(store)
///     .user_directory(users)
///     .follow_graph(graph)
///     .publisher(broker.clone())
///     .subscription(broker)
///     .feed_store(feeds)
///     .build()?;
/// let handle = pipeline.start();
/// ```
///
/// dead-letter store / clock / id generator は省略すると既定の実装を使う。
pub struct PipelineBuilder {
    config: FlockConfig,
    message_store: Option<Arc<dyn MessageStore>>,
    user_directory: Option<Arc<dyn UserDirectory>>,
    follow_graph: Option<Arc<dyn FollowGraph>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    subscription: Option<Arc<dyn EventSubscription>>,
    feed_store: Option<Arc<dyn FeedStore>>,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl PipelineBuilder {
    pub fn new(config: FlockConfig) -> Self {
        Self {
            config,
            message_store: None,
            user_directory: None,
            follow_graph: None,
            publisher: None,
            subscription: None,
            feed_store: None,
            dead_letters: None,
            clock: None,
            ids: None,
        }
    }

    pub fn message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.message_store = Some(store);
        self
    }

    pub fn user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.user_directory = Some(users);
        self
    }

    pub fn follow_graph(mut self, graph: Arc<dyn FollowGraph>) -> Self {
        self.follow_graph = Some(graph);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn subscription(mut self, subscription: Arc<dyn EventSubscription>) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn feed_store(mut self, feeds: Arc<dyn FeedStore>) -> Self {
        self.feed_store = Some(feeds);
        self
    }

    pub fn dead_letter_store(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 検証してから Pipeline を組み立てる
    ///
    /// 欠けている port は最初に見つかったものを `BuildError::Missing` で返す。
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let message_store = self.message_store.ok_or(BuildError::Missing("message store"))?;
        let user_directory = self
            .user_directory
            .ok_or(BuildError::Missing("user directory"))?;
        let follow_graph = self.follow_graph.ok_or(BuildError::Missing("follow graph"))?;
        let publisher = self.publisher.ok_or(BuildError::Missing("event publisher"))?;
        let subscription = self
            .subscription
            .ok_or(BuildError::Missing("event subscription"))?;
        let feed_store = self.feed_store.ok_or(BuildError::Missing("feed store"))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let dead_letters = self.dead_letters.unwrap_or_else(|| {
            Arc::new(BoundedDeadLetterStore::with_clock(
                self.config.dead_letter.capacity,
                Arc::clone(&clock),
            ))
        });

        let publish = Arc::new(PublishPipeline::new(
            Arc::clone(&publisher),
            Arc::clone(&dead_letters),
            RetryPolicy::from(&self.config.publish),
            self.config.publish.timeout,
        ));

        Ok(Pipeline {
            messages: MessageService::new(
                message_store,
                Arc::clone(&user_directory),
                ids,
                clock,
                publish,
                self.config.message_max_chars,
            ),
            follows: FollowService::new(user_directory, Arc::clone(&follow_graph)),
            timelines: TimelineService::new(Arc::clone(&feed_store)),
            fanout: Arc::new(FanoutConsumer::new(
                subscription,
                follow_graph,
                feed_store,
                Arc::clone(&dead_letters),
            )),
            reprocessor: Arc::new(DeadLetterReprocessor::new(
                Arc::clone(&dead_letters),
                publisher,
                self.config.dead_letter.reprocess_interval,
            )),
            dead_letters,
        })
    }
}

/// Pipeline は組み立て済みのサービスとバックグラウンド処理を保持する
pub struct Pipeline {
    messages: MessageService,
    follows: FollowService,
    timelines: TimelineService,
    fanout: Arc<FanoutConsumer>,
    reprocessor: Arc<DeadLetterReprocessor>,
    dead_letters: Arc<dyn DeadLetterStore>,
}

impl Pipeline {
    pub fn messages(&self) -> &MessageService {
        &self.messages
    }

    pub fn follows(&self) -> &FollowService {
        &self.follows
    }

    pub fn timelines(&self) -> &TimelineService {
        &self.timelines
    }

    pub fn reprocessor(&self) -> &DeadLetterReprocessor {
        &self.reprocessor
    }

    pub async fn dead_letter_status(&self) -> Result<DeadLetterStatus, DeadLetterError> {
        DeadLetterStatus::snapshot(self.dead_letters.as_ref()).await
    }

    /// fan-out consumer と reprocessor を spawn する
    pub fn start(&self) -> PipelineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let fanout = Arc::clone(&self.fanout);
        let fanout_rx = shutdown_rx.clone();
        let reprocessor = Arc::clone(&self.reprocessor);

        let joins = vec![
            tokio::spawn(async move { fanout.run(fanout_rx).await }),
            tokio::spawn(async move { reprocessor.run(shutdown_rx).await }),
        ];

        info!("pipeline started");
        PipelineHandle { shutdown_tx, joins }
    }
}

/// Background task handle.
/// - `shutdown_tx` を drop するとループ全体が止まる
/// - `shutdown_and_join()` で全ループの終了を待てる
///
/// 配送中の publish タスクはここに含まれない（shutdown でも止まらない）。
pub struct PipelineHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Request shutdown. In-flight deliveries and reprocessing ticks finish first.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
        info!("pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedSettings;
    use crate::domain::{Message, UserId};
    use crate::impls::{
        InMemoryBroker, InMemoryFeedStore, InMemoryFollowGraph, InMemoryMessageStore,
        InMemoryUserDirectory,
    };
    use crate::app::publish_pipeline::PublishOutcome;
    use rstest::rstest;
    use std::time::Duration;

    struct Parts {
        broker: InMemoryBroker,
        feeds: Arc<InMemoryFeedStore>,
        dlq: Arc<BoundedDeadLetterStore>,
    }

    fn parts() -> Parts {
        Parts {
            broker: InMemoryBroker::new(),
            feeds: Arc::new(InMemoryFeedStore::new(FeedSettings::default())),
            dlq: Arc::new(BoundedDeadLetterStore::new(100)),
        }
    }

    fn full_builder(parts: &Parts) -> PipelineBuilder {
        PipelineBuilder::new(FlockConfig::default())
            .message_store(Arc::new(InMemoryMessageStore::new()))
            .user_directory(Arc::new(InMemoryUserDirectory::new()))
            .follow_graph(Arc::new(InMemoryFollowGraph::new()))
            .publisher(Arc::new(parts.broker.clone()))
            .subscription(Arc::new(parts.broker.clone()))
            .feed_store(parts.feeds.clone())
            .dead_letter_store(parts.dlq.clone())
    }

    #[rstest]
    #[case::message_store("message store")]
    #[case::user_directory("user directory")]
    #[case::follow_graph("follow graph")]
    #[case::publisher("event publisher")]
    #[case::subscription("event subscription")]
    #[case::feed_store("feed store")]
    fn missing_port_fails_fast(#[case] component: &'static str) {
        let p = parts();
        let mut builder = full_builder(&p);
        match component {
            "message store" => builder.message_store = None,
            "user directory" => builder.user_directory = None,
            "follow graph" => builder.follow_graph = None,
            "event publisher" => builder.publisher = None,
            "event subscription" => builder.subscription = None,
            _ => builder.feed_store = None,
        }
        assert_eq!(builder.build().err(), Some(BuildError::Missing(component)));
    }

    #[test]
    fn optional_components_have_defaults() {
        let p = parts();
        let mut builder = full_builder(&p);
        builder.dead_letters = None;
        assert!(builder.build().is_ok());
    }

    async fn wait_for_feed(feeds: &InMemoryFeedStore, user: &UserId, len: usize) -> Vec<Message> {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let feed = feeds.read(user).await.unwrap();
                if feed.len() >= len {
                    return feed;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("feed was not updated in time")
    }

    #[tokio::test]
    async fn posted_message_reaches_followers() {
        let p = parts();
        let pipeline = full_builder(&p).build().unwrap();
        let handle = pipeline.start();

        let a = UserId::new("A");
        let f1 = UserId::new("F1");
        let f2 = UserId::new("F2");
        pipeline.follows().follow(&f1, &a).await.unwrap();
        pipeline.follows().follow(&f2, &a).await.unwrap();

        let posted = pipeline.messages().post_message(&a, "hello").await.unwrap();
        let m = posted.message.clone();

        assert_eq!(wait_for_feed(&p.feeds, &f1, 1).await, vec![m.clone()]);
        assert_eq!(wait_for_feed(&p.feeds, &f2, 1).await, vec![m]);
        assert!(pipeline
            .timelines()
            .timeline(&UserId::new("F3"))
            .await
            .unwrap()
            .is_empty());

        handle.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn every_message_ends_in_feed_or_dead_letters() {
        let p = parts();
        let pipeline = full_builder(&p).build().unwrap();
        let handle = pipeline.start();

        let a = UserId::new("A");
        let f1 = UserId::new("F1");
        pipeline.follows().follow(&f1, &a).await.unwrap();

        // 3 回とも失敗させ、dead-letter 経由の経路を通す
        p.broker.fail_next_publishes(3).await;
        let lost = pipeline.messages().post_message(&a, "m0").await.unwrap();
        assert_eq!(
            lost.delivery.await.unwrap(),
            PublishOutcome::DeadLettered { attempts: 3 }
        );
        assert_eq!(pipeline.dead_letter_status().await.unwrap().len, 1);
        assert!(p.feeds.read(&f1).await.unwrap().is_empty());

        let report = pipeline.reprocessor().run_once().await;
        assert_eq!(report.published, 1);
        assert_eq!(wait_for_feed(&p.feeds, &f1, 1).await, vec![lost.message.clone()]);
        assert_eq!(pipeline.dead_letter_status().await.unwrap().len, 0);

        let mut delivered = vec![lost.message];
        for i in 1..4 {
            let post = pipeline
                .messages()
                .post_message(&a, &format!("m{i}"))
                .await
                .unwrap();
            assert_eq!(
                post.delivery.await.unwrap(),
                PublishOutcome::Published { attempts: 1 }
            );
            delivered.push(post.message);
        }

        let feed = wait_for_feed(&p.feeds, &f1, delivered.len()).await;
        let dead: Vec<Message> = p
            .dlq
            .drain_all()
            .await
            .unwrap()
            .iter()
            .map(|e| Message::from_json(&e.payload).unwrap())
            .collect();
        for m in &delivered {
            assert!(feed.contains(m) || dead.contains(m), "{} was lost", m.id());
        }
        assert_eq!(feed.len(), delivered.len());
        assert!(dead.is_empty());

        handle.shutdown_and_join().await;
    }
}
