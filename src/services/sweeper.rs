use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::services::occurrences::OccurrenceService;
use crate::services::reservations::ReservationService;
use crate::services::waitlist::WaitlistService;
use crate::EngineState;

/// Фоновая уборка. Корректность движка от неё не зависит - истечение
/// резервов ленивое и проверяется на каждом пути чтения и записи; обход
/// нужен для наблюдаемости и актуальности счётчиков.
pub struct SweeperService {
    state: Arc<EngineState>,
}

impl SweeperService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Запускает полный проход: истёкшие резервы + просроченные приглашения
    /// + статусы занятий.
    pub async fn run_once(&self) {
        info!("🧹 Starting reservation sweep");

        match ReservationService::new(self.state.clone()).sweep_expired().await {
            Ok(0) => info!("No expired holds to release"),
            Ok(n) => info!("Released {} expired holds", n),
            Err(e) => error!("Failed to release expired holds: {:?}", e),
        }

        match WaitlistService::new(self.state.clone()).expire_lapsed().await {
            Ok(0) => info!("No lapsed waitlist notifications"),
            Ok(n) => info!("Expired {} lapsed waitlist notifications", n),
            Err(e) => error!("Failed to expire waitlist notifications: {:?}", e),
        }

        match OccurrenceService::new(self.state.clone()).roll_statuses().await {
            Ok(0) => {}
            Ok(n) => info!("Rolled status of {} occurrences", n),
            Err(e) => error!("Failed to roll occurrence statuses: {:?}", e),
        }

        info!("✅ Sweep completed");
    }

    /// Бесконечный цикл с интервалом из конфигурации; запускается снаружи
    /// через `tokio::spawn`.
    pub async fn run(self) {
        let interval = Duration::from_secs(self.state.config.reservation.sweep_interval_seconds);
        loop {
            self.run_once().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// Статистика для мониторинга: сколько работы накопилось для обхода.
    pub async fn stats(&self) -> Result<SweepStats, crate::error::EngineError> {
        let now = Utc::now();

        let expired_holds: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seat_assignments
             WHERE status = 'reserved' AND expires_at < $1",
        )
        .bind(now)
        .fetch_one(&self.state.db.pool)
        .await?;

        let lapsed_notifications: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM waitlist_entries
             WHERE status = 'notified' AND expires_at < $1",
        )
        .bind(now)
        .fetch_one(&self.state.db.pool)
        .await?;

        let stale_statuses: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM class_occurrences
            WHERE is_cancelled = FALSE
              AND ((status = 'scheduled'
                    AND (scheduled_date + start_time) AT TIME ZONE 'UTC' <= $1)
                   OR (status = 'in_progress'
                       AND (scheduled_date + end_time) AT TIME ZONE 'UTC' <= $1))
            "#,
        )
        .bind(now)
        .fetch_one(&self.state.db.pool)
        .await?;

        Ok(SweepStats {
            expired_holds,
            lapsed_notifications,
            stale_statuses,
        })
    }
}

#[derive(Debug)]
pub struct SweepStats {
    pub expired_holds: i64,
    pub lapsed_notifications: i64,
    pub stale_statuses: i64,
}

impl SweepStats {
    pub fn total_items_to_sweep(&self) -> i64 {
        self.expired_holds + self.lapsed_notifications + self.stale_statuses
    }
}
