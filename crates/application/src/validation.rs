//! 请求的结构校验与清洗
//!
//! 所有自由文本字段先去除标记、裁剪空白，再做结构校验。

use domain::{strip_markup, ParticipantName};
use serde::Deserialize;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterParticipantRequest {
    #[validate(
        required(message = "name is required"),
        length(min = 1, message = "name cannot be empty")
    )]
    pub name: Option<String>,
}

impl RegisterParticipantRequest {
    pub fn sanitized(self) -> Self {
        Self {
            name: sanitize_field(self.name),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(
        required(message = "to is required"),
        length(min = 1, message = "to cannot be empty")
    )]
    pub to: Option<String>,
    #[validate(
        required(message = "text is required"),
        length(min = 1, message = "text cannot be empty")
    )]
    pub text: Option<String>,
    #[serde(rename = "type")]
    #[validate(
        required(message = "type is required"),
        length(min = 1, message = "type cannot be empty")
    )]
    pub kind: Option<String>,
}

impl SendMessageRequest {
    pub fn sanitized(self) -> Self {
        Self {
            to: sanitize_field(self.to),
            text: sanitize_field(self.text),
            kind: sanitize_field(self.kind),
        }
    }
}

/// 编辑请求与发送请求的结构相同。
pub type EditMessageRequest = SendMessageRequest;

fn sanitize_field(value: Option<String>) -> Option<String> {
    value.map(|raw| strip_markup(&raw))
}

/// 从原始请求头中解析操作者身份；缺失或清洗后为空视为未提供。
pub fn actor_name(raw: Option<&str>) -> Option<ParticipantName> {
    let cleaned = strip_markup(raw?);
    ParticipantName::parse(cleaned).ok()
}

/// 把校验错误整理成一句可读的原因，字段按名称排序保证输出稳定。
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut reasons: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    reasons.sort();
    reasons.join("; ")
}
