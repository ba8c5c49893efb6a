use std::sync::Arc;

use domain::{Message, MessageId, ParticipantName, StatusEvent};
use tokio::task::JoinHandle;

use crate::{clock::Clock, error::ApplicationError, repository::MessageRepository};

/// 生成系统状态消息（进入/离开房间）。
///
/// 状态消息总是广播给所有人，并且跳过在线检查：离开事件的作者此时已经不在登记表里。
pub struct StatusAnnouncer {
    message_repository: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl StatusAnnouncer {
    pub fn new(message_repository: Arc<dyn MessageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            message_repository,
            clock,
        }
    }

    pub async fn create_system_event(
        &self,
        from: ParticipantName,
        event: StatusEvent,
    ) -> Result<Message, ApplicationError> {
        let message = Message::status(MessageId::generate(), from, event, self.clock.now());
        let stored = self.message_repository.insert(message).await?;
        Ok(stored)
    }

    /// 一次写入多条状态消息。
    pub async fn announce_all(
        &self,
        names: Vec<ParticipantName>,
        event: StatusEvent,
    ) -> Result<Vec<Message>, ApplicationError> {
        let now = self.clock.now();
        let messages = names
            .into_iter()
            .map(|name| Message::status(MessageId::generate(), name, event, now))
            .collect();
        let stored = self.message_repository.insert_many(messages).await?;
        Ok(stored)
    }

    /// 在独立任务中写入状态消息；失败只记录日志，不影响调用方。
    pub fn announce_in_background(
        self: &Arc<Self>,
        from: ParticipantName,
        event: StatusEvent,
    ) -> JoinHandle<()> {
        let announcer = Arc::clone(self);
        tokio::spawn(async move {
            let participant = from.clone();
            if let Err(err) = announcer.create_system_event(from, event).await {
                tracing::warn!(
                    participant = %participant,
                    event = event.text(),
                    error = %err,
                    "状态消息写入失败"
                );
            }
        })
    }
}
