//! 请求参数定义

use serde::Deserialize;
use transaction_history::HistoryRequest;
use validator::Validate;

/// 单页最多返回的记录数
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// 交易历史查询参数
///
/// `txType` 可为逗号分隔的多个类型；`recentMonth` <= 0 表示不限时间。
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryParams {
    #[serde(rename = "profileID")]
    #[validate(length(min = 1, message = "profileID is required"))]
    pub profile_id: String,
    #[validate(range(min = 0, message = "offset must not be negative"))]
    pub offset: i64,
    #[validate(range(min = 0, max = 1000, message = "limit must be between 0 and 1000"))]
    pub limit: i64,
    #[serde(rename = "txType")]
    pub tx_type: String,
    pub status: String,
    #[serde(rename = "recentMonth")]
    pub recent_month: i32,
}

impl From<HistoryParams> for HistoryRequest {
    fn from(params: HistoryParams) -> Self {
        Self {
            profile_id: params.profile_id,
            offset: params.offset,
            limit: params.limit,
            tx_type: params.tx_type,
            status: params.status,
            recent_month: params.recent_month,
        }
    }
}

/// 按用户删除参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct DeleteParams {
    #[serde(rename = "profileID")]
    #[validate(length(min = 1, message = "profileID is required"))]
    pub profile_id: String,
}
