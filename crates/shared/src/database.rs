//! PostgreSQL 连接池
//!
//! 交易引擎的所有仓储共享同一个池；迁移文件位于仓库根目录 `migrations/`，
//! 编译期嵌入二进制，启动时按配置决定是否执行。

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池，`run_migrations` 打开时随后执行迁移
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        let db = Self { pool };
        db.health_check().await?;
        info!("数据库连接池已建立");

        if config.run_migrations {
            db.migrate().await?;
        }

        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 执行未应用的迁移（已应用的按校验和跳过）
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!(migrations = MIGRATOR.iter().count(), "数据库迁移完成");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_database_config;

    #[test]
    fn test_migrations_embedded() {
        assert!(MIGRATOR.iter().count() >= 1);
    }

    #[tokio::test]
    #[ignore = "需要 PostgreSQL"]
    async fn test_connect_and_migrate() {
        let config = DatabaseConfig {
            run_migrations: true,
            ..test_database_config()
        };
        let db = Database::connect(&config).await.unwrap();
        db.health_check().await.unwrap();
        db.close().await;
    }
}
