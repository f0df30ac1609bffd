//! 日志脱敏
//!
//! 可记录到日志的类型通过 `Redact` 声明自身的敏感字段，
//! 序列化为日志字段时对这些字段做掩码处理。

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// 声明敏感字段的可记录类型
///
/// 字段名为序列化后的名字（即 serde rename 之后的 JSON 键）。
pub trait Redact: Serialize {
    const SENSITIVE_FIELDS: &'static [&'static str];

    /// 序列化并掩码敏感字段
    fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        mask_fields(&mut value, Self::SENSITIVE_FIELDS);
        value
    }
}

/// 日志字段包装：`info!(record = %Redacted(&record))`
pub struct Redacted<'a, T: Redact>(pub &'a T);

impl<T: Redact> fmt::Display for Redacted<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.redacted())
    }
}

/// 掩码单个字符串：保留首尾各 2 个字符，过短的值整体掩码
///
/// ```
/// use ledger_shared::redact::mask_value;
/// assert_eq!(mask_value("PAY-123456"), "PA****56");
/// assert_eq!(mask_value("abc"), "****");
/// ```
pub fn mask_value(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let prefix: String = chars[..2].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{prefix}****{suffix}")
}

/// 递归掩码 JSON 中名字命中 `fields` 的字段（对象与数组均会下钻）
pub fn mask_fields(value: &mut Value, fields: &[&str]) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if fields.contains(&key.as_str()) {
                    let masked = match &*child {
                        Value::String(s) if s.is_empty() => Value::String(String::new()),
                        Value::String(s) => Value::String(mask_value(s)),
                        Value::Null => Value::Null,
                        _ => Value::String("****".to_string()),
                    };
                    *child = masked;
                } else {
                    mask_fields(child, fields);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_fields(item, fields);
            }
        }
        _ => {}
    }
}
