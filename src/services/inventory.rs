//! inventory.rs
//!
//! Инвентаризация мест занятия: на каждое активное место студии ровно одна
//! строка `seat_assignments` в состоянии `available`.
//!
//! Построение - лучшее из возможного по каждому месту: сбой одной строки
//! логируется и пропускается, частичная рассадка лучше отсутствующей.
//! Перегенерация удаляет весь инвентарь занятия и строит его заново под
//! блокировкой уровня занятия; действующие резервы при этом уничтожаются,
//! их количество возвращается в отчёте.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Acquire, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::services::layout::LayoutService;
use crate::EngineState;

/// Итог построения инвентаря.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildReport {
    pub created: usize,
    pub skipped: usize,
}

/// Итог перегенерации. `dropped_holds` - резервы, уничтоженные удалением
/// старого инвентаря; вызывающая сторона обязана учитывать эту потерю.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegenerationReport {
    pub occurrence_id: i64,
    pub dropped_holds: i64,
    pub created: usize,
    pub skipped: usize,
}

/// Уникальный код строки: занятие, место, метка времени и случайный хвост.
/// Защита от коллизий, не секрет.
fn assignment_code(occurrence_id: i64, seat_id: i64, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}-{}",
        occurrence_id,
        seat_id,
        now.timestamp_millis(),
        &suffix[..8]
    )
}

pub struct InventoryService {
    state: Arc<EngineState>,
}

impl InventoryService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Достраивает недостающие строки инвентаря занятия. Идемпотентно.
    ///
    /// Если у студии ещё нет активных мест, сначала запускается генератор
    /// схемы зала (ленивый бэкофилл).
    pub async fn ensure_for_occurrence(&self, occurrence_id: i64) -> Result<BuildReport, EngineError> {
        let studio_id = self.occurrence_studio(occurrence_id).await?;
        let seat_ids = self.active_seat_ids(studio_id).await?;

        let seat_ids = if seat_ids.is_empty() {
            LayoutService::new(self.state.clone())
                .generate_seats(studio_id)
                .await?;
            self.active_seat_ids(studio_id).await?
        } else {
            seat_ids
        };

        let mut tx = self.state.db.pool.begin().await?;
        let report = self.build_rows(&mut tx, occurrence_id, &seat_ids).await?;
        tx.commit().await?;

        if report.created > 0 {
            info!(
                "occurrence {}: inventory built, {} rows created, {} skipped",
                occurrence_id, report.created, report.skipped
            );
        }
        Ok(report)
    }

    /// Удаляет весь инвентарь занятия и строит заново по текущей студии.
    /// Разрушительно для действующих резервов (см. отчёт).
    pub async fn regenerate_for_occurrence(
        &self,
        occurrence_id: i64,
    ) -> Result<RegenerationReport, EngineError> {
        let studio_id = self.occurrence_studio(occurrence_id).await?;
        if self.active_seat_ids(studio_id).await?.is_empty() {
            LayoutService::new(self.state.clone())
                .generate_seats(studio_id)
                .await?;
        }

        let mut tx = self.state.db.pool.begin().await?;

        // блокировка занятия: перегенерация несовместима с параллельными
        // операциями над его инвентарём
        let studio_id: i64 = sqlx::query_scalar(
            "SELECT studio_id FROM class_occurrences WHERE id = $1 FOR UPDATE",
        )
        .bind(occurrence_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::OccurrenceNotFound(occurrence_id))?;

        let dropped_holds: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seat_assignments
             WHERE occurrence_id = $1 AND status IN ('reserved', 'occupied')",
        )
        .bind(occurrence_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM seat_assignments WHERE occurrence_id = $1")
            .bind(occurrence_id)
            .execute(&mut *tx)
            .await?;

        let seat_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM seats WHERE studio_id = $1 AND is_active = TRUE
             ORDER BY row_num, col_num",
        )
        .bind(studio_id)
        .fetch_all(&mut *tx)
        .await?;

        let report = self.build_rows(&mut tx, occurrence_id, &seat_ids).await?;
        tx.commit().await?;

        if dropped_holds > 0 {
            warn!(
                "occurrence {}: inventory regeneration discarded {} in-flight holds",
                occurrence_id, dropped_holds
            );
        }
        info!(
            "occurrence {}: inventory regenerated, {} rows created",
            occurrence_id, report.created
        );

        Ok(RegenerationReport {
            occurrence_id,
            dropped_holds,
            created: report.created,
            skipped: report.skipped,
        })
    }

    async fn build_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        occurrence_id: i64,
        seat_ids: &[i64],
    ) -> Result<BuildReport, EngineError> {
        let now = Utc::now();
        let mut created = 0usize;
        let mut skipped = 0usize;

        for &seat_id in seat_ids {
            // точка сохранения на каждое место: сбой одной строки не валит
            // остальные
            let mut sp = tx.begin().await?;
            let inserted = sqlx::query(
                r#"
                INSERT INTO seat_assignments (occurrence_id, seat_id, status, code)
                VALUES ($1, $2, 'available', $3)
                ON CONFLICT (occurrence_id, seat_id) DO NOTHING
                "#,
            )
            .bind(occurrence_id)
            .bind(seat_id)
            .bind(assignment_code(occurrence_id, seat_id, now))
            .execute(&mut *sp)
            .await;

            match inserted {
                Ok(res) => {
                    sp.commit().await?;
                    if res.rows_affected() > 0 {
                        created += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        "occurrence {}: failed to create assignment row for seat {}: {:?}",
                        occurrence_id, seat_id, e
                    );
                    let _ = sp.rollback().await;
                    skipped += 1;
                }
            }
        }

        Ok(BuildReport { created, skipped })
    }

    async fn occurrence_studio(&self, occurrence_id: i64) -> Result<i64, EngineError> {
        sqlx::query_scalar::<_, i64>("SELECT studio_id FROM class_occurrences WHERE id = $1")
            .bind(occurrence_id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or(EngineError::OccurrenceNotFound(occurrence_id))
    }

    async fn active_seat_ids(&self, studio_id: i64) -> Result<Vec<i64>, EngineError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT id FROM seats WHERE studio_id = $1 AND is_active = TRUE
             ORDER BY row_num, col_num",
        )
        .bind(studio_id)
        .fetch_all(&self.state.db.pool)
        .await?)
    }
}
