//! 三种存储实现共用的语义场景
//!
//! 每个场景使用独立的 profile_id，真实数据库上可重复执行。

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use ledger_shared::error::LedgerError;
use rust_decimal_macros::dec;
use transaction_history::{
    HistoryQuery, LedgerRepository, SessionUpsert, TransactionExecutor, TransactionRecord,
};
use uuid::Uuid;

pub fn unique_profile() -> String {
    format!("P-{}", Uuid::new_v4())
}

pub fn order_record(profile: &str, reference: &str) -> TransactionRecord {
    TransactionRecord {
        profile_id: profile.to_string(),
        reference_code: reference.to_string(),
        total_amount: dec!(9.99),
        currency: "USD".to_string(),
        status: "SUCCESS".to_string(),
        source: "APP".to_string(),
        source_type: "ORDER".to_string(),
        payment_transaction_id: "PAY1".to_string(),
        ..Default::default()
    }
}

pub fn earn_record(profile: &str, reference: &str, transaction_id: &str) -> TransactionRecord {
    TransactionRecord {
        transaction_id: transaction_id.to_string(),
        transaction_type: "EARN".to_string(),
        profile_id: profile.to_string(),
        reference_code: reference.to_string(),
        status: "SUCCESS".to_string(),
        point_amount: 100,
        point_type: 1,
        ..Default::default()
    }
}

async fn all_for<R: LedgerRepository>(repo: &R, profile: &str) -> (Vec<TransactionRecord>, i64) {
    repo.find_by_profile(&HistoryQuery::new(profile)).await.unwrap()
}

/// 同一订单成功事件投递两次只产生一条记录，CreatedAt 不变，UpdatedAt 前进
pub async fn idempotent_order_success<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let record = order_record(&profile, "ORD-1");

    repo.upsert_on_order_success(&record).await.unwrap();
    let (first, _) = all_for(repo, &profile).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    repo.upsert_on_order_success(&record).await.unwrap();
    let (second, total) = all_for(repo, &profile).await;

    assert_eq!(total, 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].created_at, second[0].created_at);
    assert!(second[0].updated_at > first[0].updated_at);
    assert!(second[0].transaction_id.is_empty());
    assert_eq!(second[0].point_amount, 0);
}

/// 积分发放事件重复投递同样只产生一条记录
pub async fn idempotent_earn_point<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let tx = format!("T-{}", Uuid::new_v4());
    let record = earn_record(&profile, "ORD-1", &tx);

    repo.upsert_on_earn_point_complete(&record).await.unwrap();
    repo.upsert_on_earn_point_complete(&record).await.unwrap();

    let (records, total) = all_for(repo, &profile).await;
    assert_eq!(total, 1);
    assert_eq!(records[0].transaction_id, tx);
    assert_eq!(records[0].point_amount, 100);
    assert!(records[0].payment_transaction_id.is_empty());
}

fn assert_merged(record: &TransactionRecord, tx: &str) {
    assert_eq!(record.transaction_id, tx);
    assert_eq!(record.transaction_type, "EARN");
    assert_eq!(record.point_amount, 100);
    assert_eq!(record.point_type, 1);
    assert_eq!(record.payment_transaction_id, "PAY1");
    assert_eq!(record.source, "APP");
    assert_eq!(record.source_type, "ORDER");
    assert_eq!(record.currency, "USD");
    assert_eq!(record.total_amount.round_dp(2), dec!(9.99));
    assert_eq!(record.status, "SUCCESS");
}

/// 订单成功先到：积分发放补齐积分字段，不覆盖订单字段
pub async fn merge_order_then_earn<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let tx = format!("T-{}", Uuid::new_v4());

    repo.upsert_on_order_success(&order_record(&profile, "ORD-1"))
        .await
        .unwrap();
    repo.upsert_on_earn_point_complete(&earn_record(&profile, "ORD-1", &tx))
        .await
        .unwrap();

    let (records, total) = all_for(repo, &profile).await;
    assert_eq!(total, 1);
    assert_merged(&records[0], &tx);
}

/// 积分发放先到：订单成功补齐订单字段并填充占位金额，不覆盖积分字段
pub async fn merge_earn_then_order<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let tx = format!("T-{}", Uuid::new_v4());

    repo.upsert_on_earn_point_complete(&earn_record(&profile, "ORD-1", &tx))
        .await
        .unwrap();
    repo.upsert_on_order_success(&order_record(&profile, "ORD-1"))
        .await
        .unwrap();

    let (records, total) = all_for(repo, &profile).await;
    assert_eq!(total, 1);
    assert_merged(&records[0], &tx);
}

/// 订单成功不会覆盖已有的非占位金额与币种
pub async fn order_success_keeps_existing_amount<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let tx = format!("T-{}", Uuid::new_v4());
    let earn = TransactionRecord {
        total_amount: dec!(20),
        currency: "VND".to_string(),
        ..earn_record(&profile, "ORD-1", &tx)
    };

    repo.upsert_on_earn_point_complete(&earn).await.unwrap();
    repo.upsert_on_order_success(&order_record(&profile, "ORD-1"))
        .await
        .unwrap();

    let (records, _) = all_for(repo, &profile).await;
    assert_eq!(records[0].total_amount.round_dp(2), dec!(20));
    assert_eq!(records[0].currency, "VND");
    assert_eq!(records[0].payment_transaction_id, "PAY1");
}

/// 起始时间过滤包含边界
pub async fn recency_boundary_inclusive<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let created = repo
        .create(&TransactionRecord {
            profile_id: profile.clone(),
            transaction_type: "EARN".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let (stored, _) = all_for(repo, &profile).await;
    let boundary = stored[0].created_at.unwrap();
    assert!(created.created_at.is_some());

    let (_, at_boundary) = repo
        .find_by_profile(&HistoryQuery::new(profile.as_str()).since(boundary))
        .await
        .unwrap();
    assert_eq!(at_boundary, 1);

    let (after, after_total) = repo
        .find_by_profile(
            &HistoryQuery::new(profile.as_str()).since(boundary + ChronoDuration::milliseconds(1)),
        )
        .await
        .unwrap();
    assert_eq!(after_total, 0);
    assert!(after.is_empty());
}

/// 空类型集合不过滤，["EARN"] 只返回 EARN
pub async fn type_filter<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    for tx_type in ["EARN", "BURN"] {
        repo.create(&TransactionRecord {
            profile_id: profile.clone(),
            transaction_type: tx_type.to_string(),
            status: "SUCCESS".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    let (_, all) = repo
        .find_by_profile(&HistoryQuery::new(profile.as_str()).with_tx_types(vec![]))
        .await
        .unwrap();
    assert_eq!(all, 2);

    let (earn, earn_total) = repo
        .find_by_profile(
            &HistoryQuery::new(profile.as_str()).with_tx_types(vec!["EARN".to_string()]),
        )
        .await
        .unwrap();
    assert_eq!(earn_total, 1);
    assert!(earn.iter().all(|r| r.transaction_type == "EARN"));

    let (_, pending) = repo
        .find_by_profile(&HistoryQuery::new(profile.as_str()).with_status("PENDING"))
        .await
        .unwrap();
    assert_eq!(pending, 0);
}

/// total 与分页无关
pub async fn pagination_total<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    for _ in 0..5 {
        repo.create(&TransactionRecord {
            profile_id: profile.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    let (page, total) = repo
        .find_by_profile(&HistoryQuery::new(profile.as_str()).paginate(0, 1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(total, 5);

    let (tail, total) = repo
        .find_by_profile(&HistoryQuery::new(profile.as_str()).paginate(4, 10))
        .await
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(total, 5);
}

/// 事务内的工作失败后不留下任何写入，调用方收到工作本身的错误
pub async fn transactional_atomicity<R, E>(repo: Arc<R>, executor: &E)
where
    E: TransactionExecutor,
    R: LedgerRepository + SessionUpsert<E::Session> + 'static,
{
    let profile = unique_profile();
    let record = order_record(&profile, "ORD-1");

    let writer = repo.clone();
    let result: Result<(), LedgerError> = executor
        .execute_in_transaction(move |session| {
            let writer = writer.clone();
            let record = record.clone();
            Box::pin(async move {
                writer.upsert_on_order_success_in(session, &record).await?;
                Err(LedgerError::Internal("abort after write".to_string()))
            })
        })
        .await;

    assert!(matches!(result, Err(LedgerError::Internal(ref m)) if m == "abort after write"));
    let (records, total) = all_for(repo.as_ref(), &profile).await;
    assert!(records.is_empty());
    assert_eq!(total, 0);
}

/// 事务内成功的工作全部可见
pub async fn transactional_commit<R, E>(repo: Arc<R>, executor: &E)
where
    E: TransactionExecutor,
    R: LedgerRepository + SessionUpsert<E::Session> + 'static,
{
    let profile = unique_profile();
    let tx = format!("T-{}", Uuid::new_v4());
    let order = order_record(&profile, "ORD-1");
    let earn = earn_record(&profile, "ORD-1", &tx);

    let writer = repo.clone();
    executor
        .execute_in_transaction(move |session| {
            let writer = writer.clone();
            let order = order.clone();
            let earn = earn.clone();
            Box::pin(async move {
                writer.upsert_on_order_success_in(session, &order).await?;
                writer.upsert_on_earn_point_complete_in(session, &earn).await
            })
        })
        .await
        .unwrap();

    let (records, total) = all_for(repo.as_ref(), &profile).await;
    assert_eq!(total, 1);
    assert_merged(&records[0], &tx);
}

/// 场景：T1/P1/PAY1 两个事件合并为一条记录，TotalAmount 为 9.99
pub async fn scenario_single_merged_record<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let tx = format!("T1-{}", Uuid::new_v4());

    repo.upsert_on_earn_point_complete(&earn_record(&profile, "ORD-T1", &tx))
        .await
        .unwrap();
    repo.upsert_on_order_success(&order_record(&profile, "ORD-T1"))
        .await
        .unwrap();

    let (records, total) = all_for(repo, &profile).await;
    assert_eq!(total, 1);
    assert_eq!(records[0].transaction_id, tx);
    assert_eq!(records[0].payment_transaction_id, "PAY1");
    assert_eq!(records[0].total_amount.round_dp(2), dec!(9.99));
}

/// 场景：P1 三条、P2 两条，查询 P1 返回 3 条，total 3，新的在前
pub async fn scenario_two_profiles<R: LedgerRepository>(repo: &R) {
    let p1 = unique_profile();
    let p2 = unique_profile();

    for (profile, points) in [(&p1, 1), (&p2, 1), (&p1, 2), (&p2, 2), (&p1, 3)] {
        repo.create(&TransactionRecord {
            profile_id: profile.clone(),
            point_amount: points,
            ..Default::default()
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (records, total) = repo
        .find_by_profile(&HistoryQuery::new(p1.as_str()))
        .await
        .unwrap();
    assert_eq!(total, 3);
    let points: Vec<i64> = records.iter().map(|r| r.point_amount).collect();
    assert_eq!(points, vec![3, 2, 1]);
    assert!(records.iter().all(|r| r.profile_id == p1));
}

/// 按用户更新与删除都只作用于最近的一条，无记录时报 NotFound
pub async fn update_and_delete_by_profile<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    for points in [1, 2] {
        repo.create(&TransactionRecord {
            profile_id: profile.clone(),
            point_amount: points,
            ..Default::default()
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let updated = repo
        .update_by_profile(
            &TransactionRecord {
                point_amount: 99,
                status: "ADJUSTED".to_string(),
                ..Default::default()
            },
            &profile,
        )
        .await
        .unwrap();
    assert_eq!(updated.profile_id, profile);
    assert_eq!(updated.point_amount, 99);

    let (records, _) = all_for(repo, &profile).await;
    let points: Vec<i64> = records.iter().map(|r| r.point_amount).collect();
    assert_eq!(points, vec![99, 1]);

    let deleted = repo.delete_by_profile(&profile).await.unwrap();
    assert_eq!(deleted.point_amount, 99);
    assert_eq!(deleted.profile_id, profile);

    let (records, total) = all_for(repo, &profile).await;
    assert_eq!(total, 1);
    assert_eq!(records[0].point_amount, 1);

    assert_eq!(repo.delete_by_profile(&profile).await.unwrap().point_amount, 1);
    assert!(matches!(
        repo.delete_by_profile(&profile).await,
        Err(LedgerError::NotFound { .. })
    ));
    assert!(matches!(
        repo.update_by_profile(&TransactionRecord::default(), &profile).await,
        Err(LedgerError::NotFound { .. })
    ));
}

/// 非空 TransactionID 重复创建报 DuplicateTransaction
pub async fn duplicate_transaction_id<R: LedgerRepository>(repo: &R) {
    let record = TransactionRecord {
        transaction_id: format!("T-{}", Uuid::new_v4()),
        profile_id: unique_profile(),
        ..Default::default()
    };

    repo.create(&record).await.unwrap();
    match repo.create(&record).await {
        Err(LedgerError::DuplicateTransaction { key }) => {
            assert_eq!(key, format!("transaction_id={}", record.transaction_id));
        }
        other => panic!("expected DuplicateTransaction, got {other:?}"),
    }
}

/// TransactionID 为空时按 (ProfileID, ReferenceCode) 冲突，错误中给出关联键
pub async fn duplicate_correlation_key<R: LedgerRepository>(repo: &R) {
    let profile = unique_profile();
    let record = TransactionRecord {
        profile_id: profile.clone(),
        reference_code: "ORD-1".to_string(),
        ..Default::default()
    };

    repo.create(&record).await.unwrap();
    match repo.create(&record).await {
        Err(LedgerError::DuplicateTransaction { key }) => {
            assert_eq!(key, format!("profile_id={profile}, reference_code=ORD-1"));
        }
        other => panic!("expected DuplicateTransaction, got {other:?}"),
    }
}
