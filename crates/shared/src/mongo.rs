//! MongoDB 连接管理模块
//!
//! 提供 MongoDB 客户端的创建、健康检查与数据库句柄获取。
//! 多文档事务要求副本集部署，连接串需指定 replicaSet。

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{info, instrument};

use crate::config::MongoConfig;
use crate::error::Result;

/// MongoDB 客户端包装
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// 连接 MongoDB 并确认服务可达
    #[instrument(skip(config), fields(database = %config.database))]
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        info!("Connecting to MongoDB...");

        let mut options = ClientOptions::parse(&config.uri).await?;
        options.max_pool_size = Some(config.max_pool_size);
        options.connect_timeout = Some(Duration::from_millis(config.connect_timeout_ms));
        options.server_selection_timeout =
            Some(Duration::from_millis(config.server_selection_timeout_ms));

        let client = Client::with_options(options)?;
        let database = client.database(&config.database);

        let store = Self { client, database };
        store.health_check().await?;

        info!("MongoDB client created");
        Ok(store)
    }

    /// 获取客户端（用于开启会话）
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 获取数据库句柄
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
