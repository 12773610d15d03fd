//! インメモリの正本（messages / users / follows）
//!
//! 本番ではそれぞれ外部のストアに置き換わる前提の、単純なキー付きストア。

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Message, MessageId, RepositoryError, User, UserId};
use crate::ports::{FollowGraph, MessageStore, UserDirectory};

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<MessageId, Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: MessageId) -> Option<Message> {
        self.messages.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        self.messages
            .write()
            .await
            .insert(message.id(), message.clone());
        Ok(())
    }
}

/// ユーザーディレクトリ
///
/// 未知の user id は自動的に登録して返す（どの id も有効なユーザーとして扱う）。
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_by_id(&self, id: &UserId) -> Result<User, RepositoryError> {
        if let Some(user) = self.users.read().await.get(id) {
            return Ok(user.clone());
        }

        let mut users = self.users.write().await;
        let user = users
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(user = %id, "registering unknown user");
                User::new(id.clone())
            })
            .clone();
        Ok(user)
    }
}

/// follower -> followees の隣接リスト
#[derive(Default)]
pub struct InMemoryFollowGraph {
    follows: RwLock<HashMap<UserId, BTreeSet<UserId>>>,
}

impl InMemoryFollowGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FollowGraph for InMemoryFollowGraph {
    async fn follow(&self, follower: &UserId, followee: &UserId) -> Result<(), RepositoryError> {
        self.follows
            .write()
            .await
            .entry(follower.clone())
            .or_default()
            .insert(followee.clone());
        Ok(())
    }

    async fn is_following(
        &self,
        follower: &UserId,
        followee: &UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .follows
            .read()
            .await
            .get(follower)
            .is_some_and(|followees| followees.contains(followee)))
    }

    async fn followers(&self, author: &UserId) -> Result<Vec<UserId>, RepositoryError> {
        let follows = self.follows.read().await;
        let mut followers: Vec<UserId> = follows
            .iter()
            .filter(|(_, followees)| followees.contains(author))
            .map(|(follower, _)| follower.clone())
            .collect();
        followers.sort();
        Ok(followers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    #[tokio::test]
    async fn saved_messages_can_be_read_back() {
        let store = InMemoryMessageStore::new();
        let message = Message::new(
            MessageId::from_ulid(Ulid::new()),
            UserId::new("alice"),
            "hi",
            Utc::now(),
        );
        store.save(&message).await.unwrap();
        assert_eq!(store.get(message.id()).await, Some(message));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_users_are_synthesized() {
        let users = InMemoryUserDirectory::new();
        let user = users.get_by_id(&UserId::new("zoe")).await.unwrap();
        assert_eq!(user.id.as_str(), "zoe");
    }

    #[tokio::test]
    async fn followers_are_resolved_from_edges() {
        let graph = InMemoryFollowGraph::new();
        let alice = UserId::new("alice");
        graph.follow(&UserId::new("f2"), &alice).await.unwrap();
        graph.follow(&UserId::new("f1"), &alice).await.unwrap();
        graph
            .follow(&UserId::new("f3"), &UserId::new("carol"))
            .await
            .unwrap();

        let followers = graph.followers(&alice).await.unwrap();
        assert_eq!(followers, vec![UserId::new("f1"), UserId::new("f2")]);
        assert!(graph.is_following(&UserId::new("f1"), &alice).await.unwrap());
        assert!(!graph.is_following(&UserId::new("f3"), &alice).await.unwrap());
    }
}
