//! reservations.rs
//!
//! Машина состояний резервирования поверх строк `seat_assignments`.
//!
//! Точка контроля конкуренции - условный UPDATE: переход выполняется одним
//! атомарным оператором, и из двух одновременных попыток занять место
//! выигрывает ровно одна. Истечение резерва ленивое: истёкший `reserved`
//! перехватывается новым резервом в том же операторе, фоновый обход нужен
//! только для наблюдаемости.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::EngineError;
use crate::models::SeatAssignment;
use crate::EngineState;

pub struct ReservationService {
    state: Arc<EngineState>,
}

impl ReservationService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    fn default_ttl(&self) -> Duration {
        Duration::minutes(self.state.config.reservation.hold_ttl_minutes)
    }

    /* ---------- резерв ---------- */

    /// Попытка занять место с TTL из конфигурации (по умолчанию 15 минут).
    /// `None` - отказ: место занято живым резервом, подтверждено или
    /// заблокировано. Повторять ли попытку на другом месте, решает вызывающая
    /// сторона.
    pub async fn reserve_seat(
        &self,
        occurrence_id: i64,
        seat_id: i64,
        holder_id: i64,
    ) -> Result<Option<SeatAssignment>, EngineError> {
        self.reserve_seat_with_ttl(occurrence_id, seat_id, holder_id, self.default_ttl())
            .await
    }

    pub async fn reserve_seat_with_ttl(
        &self,
        occurrence_id: i64,
        seat_id: i64,
        holder_id: i64,
        ttl: Duration,
    ) -> Result<Option<SeatAssignment>, EngineError> {
        let now = Utc::now();
        // атомарный compare-and-set: available либо истёкший reserved
        let row = sqlx::query_as::<_, SeatAssignment>(
            r#"
            UPDATE seat_assignments
            SET holder_id = $3, status = 'reserved', reserved_at = $4, expires_at = $5
            WHERE occurrence_id = $1 AND seat_id = $2
              AND (status = 'available'
                   OR (status = 'reserved' AND expires_at IS NOT NULL AND expires_at < $4))
            RETURNING *
            "#,
        )
        .bind(occurrence_id)
        .bind(seat_id)
        .bind(holder_id)
        .bind(now)
        .bind(now + ttl)
        .fetch_optional(&self.state.db.pool)
        .await?;
        Ok(row)
    }

    /// Подтверждение: только из живого `reserved`.
    pub async fn confirm_seat(&self, assignment_id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            r#"
            UPDATE seat_assignments
            SET status = 'occupied', expires_at = NULL
            WHERE id = $1 AND status = 'reserved'
              AND (expires_at IS NULL OR expires_at >= $2)
            "#,
        )
        .bind(assignment_id)
        .bind(Utc::now())
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Освобождение из любого состояния. Идемпотентно; `false` только если
    /// строки не существует.
    pub async fn release_seat(&self, assignment_id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            r#"
            UPDATE seat_assignments
            SET status = 'available', holder_id = NULL, reserved_at = NULL, expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(assignment_id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /* ---------- административная блокировка ---------- */

    pub async fn block_seat(&self, assignment_id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            "UPDATE seat_assignments SET status = 'blocked'
             WHERE id = $1 AND status = 'available'",
        )
        .bind(assignment_id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn unblock_seat(&self, assignment_id: i64) -> Result<bool, EngineError> {
        let res = sqlx::query(
            "UPDATE seat_assignments SET status = 'available'
             WHERE id = $1 AND status = 'blocked'",
        )
        .bind(assignment_id)
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /* ---------- истечение ---------- */

    /// Обход истёкших резервов одного занятия.
    pub async fn release_expired(&self, occurrence_id: i64) -> Result<u64, EngineError> {
        let res = sqlx::query(
            r#"
            UPDATE seat_assignments
            SET status = 'available', holder_id = NULL, reserved_at = NULL, expires_at = NULL
            WHERE occurrence_id = $1 AND status = 'reserved' AND expires_at < $2
            "#,
        )
        .bind(occurrence_id)
        .bind(Utc::now())
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected())
    }

    /// Глобальный обход для фоновой уборки.
    pub async fn sweep_expired(&self) -> Result<u64, EngineError> {
        let res = sqlx::query(
            r#"
            UPDATE seat_assignments
            SET status = 'available', holder_id = NULL, reserved_at = NULL, expires_at = NULL
            WHERE status = 'reserved' AND expires_at < $1
            "#,
        )
        .bind(Utc::now())
        .execute(&self.state.db.pool)
        .await?;
        Ok(res.rows_affected())
    }

    /* ---------- чтение ---------- */

    pub async fn get_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Option<SeatAssignment>, EngineError> {
        Ok(
            sqlx::query_as::<_, SeatAssignment>("SELECT * FROM seat_assignments WHERE id = $1")
                .bind(assignment_id)
                .fetch_optional(&self.state.db.pool)
                .await?,
        )
    }

    pub async fn assignments_for_occurrence(
        &self,
        occurrence_id: i64,
    ) -> Result<Vec<SeatAssignment>, EngineError> {
        Ok(sqlx::query_as::<_, SeatAssignment>(
            "SELECT * FROM seat_assignments WHERE occurrence_id = $1 ORDER BY seat_id",
        )
        .bind(occurrence_id)
        .fetch_all(&self.state.db.pool)
        .await?)
    }
}
