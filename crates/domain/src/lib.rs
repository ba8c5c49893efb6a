//! 聊天室在线状态与消息的核心领域模型
//!
//! 包含参与者、消息等实体，输入清洗规则，以及领域/存储错误类型。

pub mod errors;
pub mod message;
pub mod participant;
pub mod sanitize;
pub mod value_objects;

// 重新导出常用类型
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Message, MessageKind, StatusEvent};
pub use participant::Participant;
pub use sanitize::strip_markup;
pub use value_objects::{MessageId, ParticipantName, Timestamp, BROADCAST_TARGET};
