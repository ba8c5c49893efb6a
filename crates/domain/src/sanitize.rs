//! 自由文本字段的标记清洗
//!
//! 参与者名称、收件人、正文和类型在进入核心之前都会经过这里。

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("static regex")
});

// 只把以字母、`/` 或 `!` 开头的尖括号片段当作标签，`a < b` 这类文本保持原样。
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("static regex"));

/// 去除 HTML 标记并裁剪首尾空白。
pub fn strip_markup(input: &str) -> String {
    let without_blocks = SCRIPT_OR_STYLE.replace_all(input, "");
    let without_tags = TAG.replace_all(&without_blocks, "");
    without_tags.trim().to_owned()
}
