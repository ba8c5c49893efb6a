use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, ParticipantName, Timestamp, BROADCAST_TARGET};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Message,
    PrivateMessage,
    /// 系统生成的进入/离开通知，不接受用户直接提交
    Status,
}

impl MessageKind {
    pub const USER_KINDS: [MessageKind; 2] = [MessageKind::Message, MessageKind::PrivateMessage];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::PrivateMessage => "private_message",
            MessageKind::Status => "status",
        }
    }

    /// 只接受用户可以创建的两种类型。
    pub fn parse_user_kind(value: &str) -> Result<Self, DomainError> {
        match value.parse::<MessageKind>() {
            Ok(kind) if kind.is_user_creatable() => Ok(kind),
            _ => Err(DomainError::invalid_argument(
                "type",
                "must be one of message, private_message",
            )),
        }
    }

    pub fn is_user_creatable(&self) -> bool {
        Self::USER_KINDS.contains(self)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(MessageKind::Message),
            "private_message" => Ok(MessageKind::PrivateMessage),
            "status" => Ok(MessageKind::Status),
            other => Err(DomainError::invalid_argument(
                "type",
                format!("unknown message type `{other}`"),
            )),
        }
    }
}

/// 进入/离开房间事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Joined,
    Left,
}

impl StatusEvent {
    pub fn text(&self) -> &'static str {
        match self {
            StatusEvent::Joined => "entered the room",
            StatusEvent::Left => "left the room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub to: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// 作者身份，也是编辑/删除时唯一的授权依据
    pub from: ParticipantName,
    #[serde(rename = "time", serialize_with = "serialize_clock_time")]
    pub created_at: Timestamp,
}

impl Message {
    pub fn compose(
        id: MessageId,
        to: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
        from: ParticipantName,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let (to, text) = Self::validate_body(to.into(), text.into())?;
        Ok(Self {
            id,
            to,
            text,
            kind,
            from,
            created_at,
        })
    }

    pub fn status(id: MessageId, from: ParticipantName, event: StatusEvent, at: Timestamp) -> Self {
        Self {
            id,
            to: BROADCAST_TARGET.to_owned(),
            text: event.text().to_owned(),
            kind: MessageKind::Status,
            from,
            created_at: at,
        }
    }

    /// 覆盖收件人、正文、类型和时间。`from` 重新写入作者本人，结果不变。
    pub fn revise(
        &mut self,
        to: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
        author: &ParticipantName,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let (to, text) = Self::validate_body(to.into(), text.into())?;
        self.to = to;
        self.text = text;
        self.kind = kind;
        self.from = author.clone();
        self.created_at = at;
        Ok(())
    }

    pub fn is_authored_by(&self, name: &str) -> bool {
        self.from.as_str() == name
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_TARGET
    }

    /// 可见性在读取时逐条计算：广播、发给查看者、或查看者本人发出的消息。
    pub fn is_visible_to(&self, viewer: Option<&str>) -> bool {
        if self.is_broadcast() {
            return true;
        }
        match viewer {
            Some(viewer) => self.to == viewer || self.from.as_str() == viewer,
            None => false,
        }
    }

    fn validate_body(to: String, text: String) -> Result<(String, String), DomainError> {
        let to = to.trim().to_owned();
        let text = text.trim().to_owned();
        if to.is_empty() {
            return Err(DomainError::invalid_argument("to", "cannot be empty"));
        }
        if text.is_empty() {
            return Err(DomainError::invalid_argument("text", "cannot be empty"));
        }
        Ok((to, text))
    }
}

fn serialize_clock_time<S>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&value.format("%H:%M:%S"))
}
