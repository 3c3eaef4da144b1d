//! waitlist.rs
//!
//! Лист ожидания занятия: независимая упорядоченная очередь. Запись в ней
//! не удерживает место в зале - реальный резерв появляется только после
//! успешного `reserve()` внешнего сценария бронирования.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use crate::error::EngineError;
use crate::models::waitlist::RESPONSE_WINDOW_HOURS;
use crate::models::WaitlistEntry;
use crate::EngineState;

pub struct WaitlistService {
    state: Arc<EngineState>,
}

impl WaitlistService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Постановка в очередь со стартовым статусом `waiting` и инкрементом
    /// счётчика занятия.
    pub async fn join(
        &self,
        occurrence_id: i64,
        user_id: i64,
        package_id: Option<i64>,
    ) -> Result<WaitlistEntry, EngineError> {
        let mut tx = self.state.db.pool.begin().await?;

        let occurrence_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM class_occurrences WHERE id = $1)")
                .bind(occurrence_id)
                .fetch_one(&mut *tx)
                .await?;
        if !occurrence_exists {
            return Err(EngineError::OccurrenceNotFound(occurrence_id));
        }

        let entry = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            INSERT INTO waitlist_entries (occurrence_id, user_id, package_id, status, joined_at)
            VALUES ($1, $2, $3, 'waiting', $4)
            RETURNING *
            "#,
        )
        .bind(occurrence_id)
        .bind(user_id)
        .bind(package_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE class_occurrences SET waitlist_count = waitlist_count + 1 WHERE id = $1",
        )
        .bind(occurrence_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "user {} joined waitlist for occurrence {} (entry {})",
            user_id, occurrence_id, entry.id
        );
        Ok(entry)
    }

    /// Приглашает голову очереди (наименьший `joined_at` среди `waiting`) и
    /// открывает ей двухчасовое окно ответа. `SKIP LOCKED` - чтобы два
    /// параллельных вызова не пригласили одну и ту же запись.
    pub async fn notify_next(
        &self,
        occurrence_id: i64,
    ) -> Result<Option<WaitlistEntry>, EngineError> {
        let now = Utc::now();
        let window_closes = now + Duration::hours(RESPONSE_WINDOW_HOURS);
        let entry = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            UPDATE waitlist_entries
            SET status = 'notified', notified_at = $2, expires_at = $3
            WHERE id = (
                SELECT id FROM waitlist_entries
                WHERE occurrence_id = $1 AND status = 'waiting'
                ORDER BY joined_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(occurrence_id)
        .bind(now)
        .bind(window_closes)
        .fetch_optional(&self.state.db.pool)
        .await?;

        if let Some(ref e) = entry {
            info!(
                "waitlist entry {} notified for occurrence {}, window closes at {}",
                e.id, occurrence_id, window_closes
            );
        }
        Ok(entry)
    }

    /// Пользователь успел оформить бронь по приглашению.
    pub async fn convert_to_booking(&self, entry_id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            "UPDATE waitlist_entries SET status = 'confirmed'
             WHERE id = $1 AND status = 'notified'",
        )
        .bind(entry_id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Выход из очереди с декрементом счётчика занятия.
    pub async fn cancel(&self, entry_id: i64) -> Result<bool, EngineError> {
        let mut tx = self.state.db.pool.begin().await?;

        let occurrence_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE waitlist_entries
            SET status = 'cancelled'
            WHERE id = $1 AND status IN ('waiting', 'notified')
            RETURNING occurrence_id
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(occurrence_id) = occurrence_id else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE class_occurrences
             SET waitlist_count = GREATEST(0, waitlist_count - 1) WHERE id = $1",
        )
        .bind(occurrence_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Просроченные приглашения: `notified` с истёкшим окном -> `expired`,
    /// счётчики затронутых занятий уменьшаются.
    pub async fn expire_lapsed(&self) -> Result<u64, EngineError> {
        let mut tx = self.state.db.pool.begin().await?;

        let lapsed: Vec<i64> = sqlx::query_scalar(
            r#"
            UPDATE waitlist_entries
            SET status = 'expired'
            WHERE status = 'notified' AND expires_at < $1
            RETURNING occurrence_id
            "#,
        )
        .bind(Utc::now())
        .fetch_all(&mut *tx)
        .await?;

        for occurrence_id in &lapsed {
            sqlx::query(
                "UPDATE class_occurrences
                 SET waitlist_count = GREATEST(0, waitlist_count - 1) WHERE id = $1",
            )
            .bind(occurrence_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(lapsed.len() as u64)
    }

    /// Живая часть очереди в порядке присоединения.
    pub async fn active_entries(
        &self,
        occurrence_id: i64,
    ) -> Result<Vec<WaitlistEntry>, EngineError> {
        Ok(sqlx::query_as::<_, WaitlistEntry>(
            r#"
            SELECT * FROM waitlist_entries
            WHERE occurrence_id = $1 AND status IN ('waiting', 'notified', 'confirmed')
            ORDER BY joined_at, id
            "#,
        )
        .bind(occurrence_id)
        .fetch_all(&self.state.db.pool)
        .await?)
    }
}
