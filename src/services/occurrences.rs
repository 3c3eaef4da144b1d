//! occurrences.rs
//!
//! Жизненный цикл занятия: создание с выводом временных окон, счётчики
//! мест, перенос в другой зал и отмена с каскадом.
//!
//! Ключевые решения:
//! 1.  `cancel_occurrence` - единственный путь, способный выставить
//!     `status = 'cancelled'`; поля `status` и `is_cancelled` пишутся одним
//!     оператором и разойтись не могут.
//! 2.  Создание занятия не запускает скрытых хуков: инвентарь строится
//!     явным вызовом (`create_occurrence_with_inventory` - удобная обёртка,
//!     сбой построения логируется и не валит создание).
//! 3.  Счётчики - кэш поверх строк инвентаря; `reconcile_counters` сводит
//!     их к истине одним пересчётом.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use validator::Validate;

use crate::error::EngineError;
use crate::models::occurrence::BOOKING_CUTOFF_HOURS;
use crate::models::{BookingWindows, ClassOccurrence, NewOccurrence, SizeGroup};
use crate::services::inventory::{InventoryService, RegenerationReport};
use crate::services::loans::LoanService;
use crate::EngineState;

pub struct OccurrenceService {
    state: Arc<EngineState>,
}

impl OccurrenceService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /* ---------- создание ---------- */

    /// Создаёт занятие. Окна записи и срок отмены выводятся из сырых даты и
    /// времени начала, если не заданы явно (явные значения массового импорта
    /// сохраняются как есть). Инвентарь здесь не строится.
    pub async fn create_occurrence(
        &self,
        new: NewOccurrence,
    ) -> Result<ClassOccurrence, EngineError> {
        new.validate()?;

        let windows = BookingWindows::derive(new.scheduled_date, new.start_time);
        let opens_at = new.booking_opens_at.unwrap_or(windows.opens_at);
        let closes_at = new.booking_closes_at.unwrap_or(windows.closes_at);
        let deadline = new.cancellation_deadline.unwrap_or(windows.cancellation_deadline);

        let occurrence = sqlx::query_as::<_, ClassOccurrence>(
            r#"
            INSERT INTO class_occurrences
                (class_id, instructor_id, studio_id, scheduled_date, start_time, end_time,
                 max_capacity, booked_spots, available_spots, waitlist_count,
                 booking_opens_at, booking_closes_at, cancellation_deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $7, 0, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(new.class_id)
        .bind(new.instructor_id)
        .bind(new.studio_id)
        .bind(new.scheduled_date)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.max_capacity)
        .bind(opens_at)
        .bind(closes_at)
        .bind(deadline)
        .fetch_one(&self.state.db.pool)
        .await?;

        info!(
            "occurrence {} created for class {} in studio {} on {}",
            occurrence.id, occurrence.class_id, occurrence.studio_id, occurrence.scheduled_date
        );
        Ok(occurrence)
    }

    /// Создание плюс явное построение инвентаря. Сбой построения логируется
    /// и не отменяет уже созданное занятие.
    pub async fn create_occurrence_with_inventory(
        &self,
        new: NewOccurrence,
    ) -> Result<ClassOccurrence, EngineError> {
        let occurrence = self.create_occurrence(new).await?;
        let inventory = InventoryService::new(self.state.clone());
        if let Err(e) = inventory.ensure_for_occurrence(occurrence.id).await {
            error!(
                "occurrence {}: inventory build failed after creation: {:?}",
                occurrence.id, e
            );
        }
        Ok(occurrence)
    }

    pub async fn get_occurrence(&self, id: i64) -> Result<ClassOccurrence, EngineError> {
        sqlx::query_as::<_, ClassOccurrence>("SELECT * FROM class_occurrences WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or(EngineError::OccurrenceNotFound(id))
    }

    /* ---------- обновление ---------- */

    /// Смена вместимости с пересчётом свободных мест.
    pub async fn update_capacity(
        &self,
        id: i64,
        max_capacity: i32,
    ) -> Result<ClassOccurrence, EngineError> {
        sqlx::query_as::<_, ClassOccurrence>(
            r#"
            UPDATE class_occurrences
            SET max_capacity = $2,
                available_spots = GREATEST(0, $2 - booked_spots)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(max_capacity)
        .fetch_optional(&self.state.db.pool)
        .await?
        .ok_or(EngineError::OccurrenceNotFound(id))
    }

    /// Перенос занятия в другой зал. Весь инвентарь сбрасывается и строится
    /// по местам нового зала; действующие резервы при этом теряются -
    /// количество возвращается в отчёте.
    pub async fn reassign_studio(
        &self,
        occurrence_id: i64,
        new_studio_id: i64,
    ) -> Result<RegenerationReport, EngineError> {
        let studio_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM studios WHERE id = $1)")
                .bind(new_studio_id)
                .fetch_one(&self.state.db.pool)
                .await?;
        if !studio_exists {
            return Err(EngineError::StudioNotFound(new_studio_id));
        }

        let updated = sqlx::query("UPDATE class_occurrences SET studio_id = $2 WHERE id = $1")
            .bind(occurrence_id)
            .bind(new_studio_id)
            .execute(&self.state.db.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(EngineError::OccurrenceNotFound(occurrence_id));
        }

        info!(
            "occurrence {} reassigned to studio {}, rebuilding inventory",
            occurrence_id, new_studio_id
        );
        InventoryService::new(self.state.clone())
            .regenerate_for_occurrence(occurrence_id)
            .await
    }

    /* ---------- счётчики ---------- */

    /// Занять учётное место: занятие не отменено, есть свободные места и до
    /// начала не меньше двух часов. Условный UPDATE, отказ - `false`.
    pub async fn book_spot(&self, id: i64) -> Result<bool, EngineError> {
        let cutoff = Utc::now() + Duration::hours(BOOKING_CUTOFF_HOURS);
        let res = sqlx::query(
            r#"
            UPDATE class_occurrences
            SET booked_spots = booked_spots + 1,
                available_spots = GREATEST(0, max_capacity - booked_spots - 1)
            WHERE id = $1
              AND is_cancelled = FALSE
              AND available_spots > 0
              AND (scheduled_date + start_time) AT TIME ZONE 'UTC' >= $2
            "#,
        )
        .bind(id)
        .bind(cutoff)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Обратная операция для откатов; безусловная, но счётчики не уходят
    /// ниже нуля.
    pub async fn cancel_booking(&self, id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            r#"
            UPDATE class_occurrences
            SET booked_spots = GREATEST(0, booked_spots - 1),
                available_spots = GREATEST(0, max_capacity - GREATEST(0, booked_spots - 1))
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn add_to_waitlist_count(&self, id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            "UPDATE class_occurrences SET waitlist_count = waitlist_count + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn remove_from_waitlist_count(&self, id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            "UPDATE class_occurrences
             SET waitlist_count = GREATEST(0, waitlist_count - 1) WHERE id = $1",
        )
        .bind(id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Сверка кэш-счётчиков с истиной: занятые места считаются по строкам
    /// инвентаря (occupied плюс живые reserved), очередь - по активным
    /// записям листа ожидания.
    pub async fn reconcile_counters(&self, id: i64) -> Result<ClassOccurrence, EngineError> {
        sqlx::query_as::<_, ClassOccurrence>(
            r#"
            UPDATE class_occurrences o
            SET booked_spots = t.booked,
                available_spots = GREATEST(0, o.max_capacity - t.booked),
                waitlist_count = t.waiting
            FROM (
                SELECT
                    (SELECT COUNT(*)::int FROM seat_assignments a
                     WHERE a.occurrence_id = $1
                       AND (a.status = 'occupied'
                            OR (a.status = 'reserved' AND a.expires_at >= $2))) AS booked,
                    (SELECT COUNT(*)::int FROM waitlist_entries w
                     WHERE w.occurrence_id = $1
                       AND w.status IN ('waiting', 'notified')) AS waiting
            ) t
            WHERE o.id = $1
            RETURNING o.*
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.state.db.pool)
        .await?
        .ok_or(EngineError::OccurrenceNotFound(id))
    }

    /* ---------- отмена и удаление ---------- */

    /// Отмена занятия и каскад в прокат обуви. Единственный путь к
    /// `status = 'cancelled'`. Повторная отмена - no-op (`Ok(None)`).
    pub async fn cancel_occurrence(
        &self,
        id: i64,
        reason: &str,
    ) -> Result<Option<Vec<SizeGroup>>, EngineError> {
        let res = sqlx::query(
            r#"
            UPDATE class_occurrences
            SET is_cancelled = TRUE, cancellation_reason = $2, status = 'cancelled'
            WHERE id = $1 AND is_cancelled = FALSE
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.state.db.pool)
        .await?;

        if res.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM class_occurrences WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.state.db.pool)
                    .await?;
            if !exists {
                return Err(EngineError::OccurrenceNotFound(id));
            }
            warn!("occurrence {} is already cancelled, cascade skipped", id);
            return Ok(None);
        }

        info!("occurrence {} cancelled: {}", id, reason);
        let report = LoanService::new(self.state.clone())
            .cancel_for_occurrence(id)
            .await?;
        Ok(Some(report))
    }

    /// Удаление занятия; инвентарь и очередь уходят по ON DELETE CASCADE.
    pub async fn delete_occurrence(&self, id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query("DELETE FROM class_occurrences WHERE id = $1")
            .bind(id)
            .execute(&self.state.db.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Прокатка статусов по часам: scheduled -> in_progress -> completed.
    /// Отменённые занятия не трогаются.
    pub async fn roll_statuses(&self) -> Result<u64, EngineError> {
        let now = Utc::now();

        let started = sqlx::query(
            r#"
            UPDATE class_occurrences
            SET status = 'in_progress'
            WHERE is_cancelled = FALSE AND status = 'scheduled'
              AND (scheduled_date + start_time) AT TIME ZONE 'UTC' <= $1
              AND (scheduled_date + end_time) AT TIME ZONE 'UTC' > $1
            "#,
        )
        .bind(now)
        .execute(&self.state.db.pool)
        .await?;

        let completed = sqlx::query(
            r#"
            UPDATE class_occurrences
            SET status = 'completed'
            WHERE is_cancelled = FALSE AND status IN ('scheduled', 'in_progress')
              AND (scheduled_date + end_time) AT TIME ZONE 'UTC' <= $1
            "#,
        )
        .bind(now)
        .execute(&self.state.db.pool)
        .await?;

        Ok(started.rows_affected() + completed.rows_affected())
    }
}
