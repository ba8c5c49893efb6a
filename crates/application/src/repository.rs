//! 存储接口
//!
//! 核心只通过这两个 trait 访问参与者和消息两个集合。
//! 参与者名称的唯一性由存储层保证：重复插入必须返回 `RepositoryError::Conflict`。

use async_trait::async_trait;
use domain::{Message, MessageId, Participant, ParticipantName, RepositoryError, Timestamp};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn insert(&self, participant: Participant) -> Result<Participant, RepositoryError>;

    async fn find_by_name(
        &self,
        name: &ParticipantName,
    ) -> Result<Option<Participant>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Participant>, RepositoryError>;

    /// 返回是否有记录被更新
    async fn update_last_seen(
        &self,
        name: &ParticipantName,
        at: Timestamp,
    ) -> Result<bool, RepositoryError>;

    /// `last_seen < cutoff` 的参与者
    async fn find_stale(&self, cutoff: Timestamp) -> Result<Vec<Participant>, RepositoryError>;

    /// 按名称删除仍然过期的参与者，返回实际删除的名称
    async fn delete_stale(
        &self,
        names: Vec<ParticipantName>,
        cutoff: Timestamp,
    ) -> Result<Vec<ParticipantName>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn insert_many(&self, messages: Vec<Message>) -> Result<Vec<Message>, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 按插入顺序返回对 `viewer` 可见的消息
    async fn list_visible(&self, viewer: Option<String>) -> Result<Vec<Message>, RepositoryError>;

    /// 返回是否有记录被更新
    async fn update(&self, message: Message) -> Result<bool, RepositoryError>;

    /// 返回是否有记录被删除
    async fn delete(&self, id: MessageId) -> Result<bool, RepositoryError>;
}

/// 内存实现的存储（用于测试和单机运行）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryParticipantRepository {
        participants: RwLock<HashMap<ParticipantName, Participant>>,
    }

    impl InMemoryParticipantRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ParticipantRepository for InMemoryParticipantRepository {
        async fn insert(&self, participant: Participant) -> Result<Participant, RepositoryError> {
            let mut guard = self.participants.write().await;
            if guard.contains_key(&participant.name) {
                return Err(RepositoryError::Conflict);
            }
            guard.insert(participant.name.clone(), participant.clone());
            Ok(participant)
        }

        async fn find_by_name(
            &self,
            name: &ParticipantName,
        ) -> Result<Option<Participant>, RepositoryError> {
            let guard = self.participants.read().await;
            Ok(guard.get(name).cloned())
        }

        async fn list(&self) -> Result<Vec<Participant>, RepositoryError> {
            let guard = self.participants.read().await;
            Ok(guard.values().cloned().collect())
        }

        async fn update_last_seen(
            &self,
            name: &ParticipantName,
            at: Timestamp,
        ) -> Result<bool, RepositoryError> {
            let mut guard = self.participants.write().await;
            match guard.get_mut(name) {
                Some(participant) => {
                    participant.last_seen = at;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn find_stale(&self, cutoff: Timestamp) -> Result<Vec<Participant>, RepositoryError> {
            let guard = self.participants.read().await;
            Ok(guard
                .values()
                .filter(|participant| participant.is_stale(cutoff))
                .cloned()
                .collect())
        }

        async fn delete_stale(
            &self,
            names: Vec<ParticipantName>,
            cutoff: Timestamp,
        ) -> Result<Vec<ParticipantName>, RepositoryError> {
            let mut guard = self.participants.write().await;
            let mut removed = Vec::new();
            for name in names {
                let still_stale = guard
                    .get(&name)
                    .map(|participant| participant.is_stale(cutoff))
                    .unwrap_or(false);
                if still_stale {
                    guard.remove(&name);
                    removed.push(name);
                }
            }
            Ok(removed)
        }
    }

    #[derive(Default)]
    pub struct InMemoryMessageRepository {
        // Vec 保持插入顺序
        messages: RwLock<Vec<Message>>,
    }

    impl InMemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MessageRepository for InMemoryMessageRepository {
        async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
            let mut guard = self.messages.write().await;
            if guard.iter().any(|existing| existing.id == message.id) {
                return Err(RepositoryError::Conflict);
            }
            guard.push(message.clone());
            Ok(message)
        }

        async fn insert_many(
            &self,
            messages: Vec<Message>,
        ) -> Result<Vec<Message>, RepositoryError> {
            let mut guard = self.messages.write().await;
            guard.extend(messages.iter().cloned());
            Ok(messages)
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
            let guard = self.messages.read().await;
            Ok(guard.iter().find(|message| message.id == id).cloned())
        }

        async fn list_visible(
            &self,
            viewer: Option<String>,
        ) -> Result<Vec<Message>, RepositoryError> {
            let guard = self.messages.read().await;
            Ok(guard
                .iter()
                .filter(|message| message.is_visible_to(viewer.as_deref()))
                .cloned()
                .collect())
        }

        async fn update(&self, message: Message) -> Result<bool, RepositoryError> {
            let mut guard = self.messages.write().await;
            match guard.iter_mut().find(|existing| existing.id == message.id) {
                Some(existing) => {
                    *existing = message;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete(&self, id: MessageId) -> Result<bool, RepositoryError> {
            let mut guard = self.messages.write().await;
            let before = guard.len();
            guard.retain(|message| message.id != id);
            Ok(guard.len() != before)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::{Duration, Utc};
        use domain::{MessageKind, StatusEvent};

        fn name(value: &str) -> ParticipantName {
            ParticipantName::parse(value).unwrap()
        }

        #[tokio::test]
        async fn duplicate_participant_insert_conflicts() {
            let repo = InMemoryParticipantRepository::new();
            let now = Utc::now();
            repo.insert(Participant::register(name("Ana"), now)).await.unwrap();
            let err = repo
                .insert(Participant::register(name("Ana"), now))
                .await
                .unwrap_err();
            assert_eq!(err, RepositoryError::Conflict);
        }

        #[tokio::test]
        async fn delete_stale_skips_refreshed_participants() {
            let repo = InMemoryParticipantRepository::new();
            let now = Utc::now();
            let cutoff = now - Duration::seconds(10);
            repo.insert(Participant::register(name("Ana"), now - Duration::seconds(30)))
                .await
                .unwrap();
            repo.insert(Participant::register(name("Bob"), now - Duration::seconds(30)))
                .await
                .unwrap();

            let stale = repo.find_stale(cutoff).await.unwrap();
            assert_eq!(stale.len(), 2);

            // Bob 在扫描与删除之间发送了心跳
            repo.update_last_seen(&name("Bob"), now).await.unwrap();

            let removed = repo
                .delete_stale(vec![name("Ana"), name("Bob")], cutoff)
                .await
                .unwrap();
            assert_eq!(removed, vec![name("Ana")]);
            assert!(repo.find_by_name(&name("Bob")).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn messages_keep_insertion_order() {
            let repo = InMemoryMessageRepository::new();
            let now = Utc::now();
            for author in ["Ana", "Bob", "Carla"] {
                repo.insert(Message::status(
                    MessageId::generate(),
                    name(author),
                    StatusEvent::Joined,
                    now,
                ))
                .await
                .unwrap();
            }
            let listed = repo.list_visible(None).await.unwrap();
            let authors: Vec<_> = listed.iter().map(|m| m.from.as_str()).collect();
            assert_eq!(authors, vec!["Ana", "Bob", "Carla"]);
            assert!(listed.iter().all(|m| m.kind == MessageKind::Status));
        }

        #[tokio::test]
        async fn update_and_delete_report_missing_ids() {
            let repo = InMemoryMessageRepository::new();
            let message = Message::status(
                MessageId::generate(),
                name("Ana"),
                StatusEvent::Joined,
                Utc::now(),
            );
            assert!(!repo.update(message.clone()).await.unwrap());
            assert!(!repo.delete(message.id).await.unwrap());

            repo.insert(message.clone()).await.unwrap();
            assert!(repo.delete(message.id).await.unwrap());
            assert!(repo.find_by_id(message.id).await.unwrap().is_none());
        }
    }
}
