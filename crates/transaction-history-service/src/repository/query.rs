//! 历史查询条件
//!
//! 查询条件是一个不可变值，由调用方构造后交给仓储的 `find_by_profile`，
//! 各存储实现只负责把它翻译为自己的过滤语法。

use chrono::{DateTime, Months, Utc};

use crate::models::TransactionRecord;

/// 交易历史查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    /// 必填，精确匹配
    pub profile_id: String,
    /// 为空表示不过滤交易类型
    pub tx_types: Vec<String>,
    /// 状态精确匹配
    pub status: Option<String>,
    /// created_at >= since（含边界）
    pub since: Option<DateTime<Utc>>,
    pub offset: i64,
    /// <= 0 表示不限制条数
    pub limit: i64,
}

impl HistoryQuery {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            ..Default::default()
        }
    }

    pub fn with_tx_types(mut self, tx_types: Vec<String>) -> Self {
        self.tx_types = tx_types;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        let status = status.into();
        self.status = (!status.is_empty()).then_some(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn paginate(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// 跳过的条数（负数视为 0）
    pub fn skip(&self) -> u64 {
        self.offset.max(0) as u64
    }

    /// 实际生效的条数上限
    pub fn effective_limit(&self) -> Option<i64> {
        (self.limit > 0).then_some(self.limit)
    }

    /// 记录是否满足过滤条件（不含分页）
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if record.profile_id != self.profile_id {
            return false;
        }
        if !self.tx_types.is_empty() && !self.tx_types.contains(&record.transaction_type) {
            return false;
        }
        if let Some(status) = &self.status
            && &record.status != status
        {
            return false;
        }
        if let Some(since) = self.since {
            return record.created_at.is_some_and(|created| created >= since);
        }
        true
    }
}

/// 解析逗号分隔的交易类型，去空白并转大写
pub fn parse_tx_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// 近 N 个自然月的起点，月末按目标月最后一天截断
pub fn months_ago(now: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_months(Months::new(months))
}
