//! Implementation of the SharedStore trait for SqliteStore

use std::time::Duration;

use async_trait::async_trait;

use super::{SqliteStore, expiry_millis, now_millis, state_sql};
use crate::persistence::{error::StoreError, traits::SharedStore};

#[async_trait]
impl SharedStore for SqliteStore {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn conditional_create(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = now_millis();
        let result = self
            .execute_query_with_error_handling(
                "conditional create",
                sqlx::query(state_sql::CONDITIONAL_CREATE)
                    .bind(key)
                    .bind(expiry_millis(now, ttl))
                    .bind(now)
                    .execute(&self.pool),
            )
            .await?;

        // The upsert only touches a row when it is new or expired.
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = now_millis();
        let value: i64 = self
            .execute_query_with_error_handling(
                "increment with expiry",
                sqlx::query_scalar(state_sql::INCREMENT_WITH_EXPIRY)
                    .bind(key)
                    .bind(expiry_millis(now, window))
                    .bind(now)
                    .fetch_one(&self.pool),
            )
            .await?;

        u64::try_from(value).map_err(|e| StoreError::OperationFailed(e.to_string()))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_counter(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let value: Option<i64> = self
            .execute_query_with_error_handling(
                "get counter",
                sqlx::query_scalar(state_sql::SELECT_LIVE_VALUE)
                    .bind(key)
                    .bind(now_millis())
                    .fetch_optional(&self.pool),
            )
            .await?;

        value
            .map(|v| u64::try_from(v).map_err(|e| StoreError::OperationFailed(e.to_string())))
            .transpose()
    }
}
