pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

pub use error::EngineError;

use models::{Seat, SeatAssignment, SizeGroup, WaitlistEntry};
use services::inventory::RegenerationReport;
use services::layout::LayoutService;
use services::occurrences::OccurrenceService;
use services::reservations::ReservationService;
use services::seatmap::{SeatMap, SeatMapService};
use services::waitlist::WaitlistService;

// Shared state для всего движка
pub struct EngineState {
    pub db: database::Database,
    pub config: config::Config,
}

impl EngineState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, EngineError> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        db.ping().await?;
        tracing::info!("Database connected");

        db.run_migrations().await?;

        Ok(Arc::new(Self { db, config }))
    }
}

/// Инициализация логирования по конфигурации; повторный вызов безопасен.
pub fn init_tracing(app: &config::AppConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Внутрипроцессный фасад движка: операции, которые видят внешние сценарии
/// бронирования и CRUD настройки залов. Никакого сетевого протокола у
/// движка нет - он встраивается в приложение как библиотека.
pub struct SchedulingEngine {
    state: Arc<EngineState>,
}

impl SchedulingEngine {
    pub async fn connect(config: config::Config) -> Result<Self, EngineError> {
        Ok(Self {
            state: EngineState::new(config).await?,
        })
    }

    pub fn from_state(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    /* ---------- сценарий бронирования ---------- */

    pub async fn reserve_seat(
        &self,
        occurrence_id: i64,
        seat_id: i64,
        holder_id: i64,
    ) -> Result<Option<SeatAssignment>, EngineError> {
        ReservationService::new(self.state.clone())
            .reserve_seat(occurrence_id, seat_id, holder_id)
            .await
    }

    pub async fn confirm_seat(&self, assignment_id: i64) -> Result<bool, EngineError> {
        ReservationService::new(self.state.clone())
            .confirm_seat(assignment_id)
            .await
    }

    pub async fn release_seat(&self, assignment_id: i64) -> Result<bool, EngineError> {
        ReservationService::new(self.state.clone())
            .release_seat(assignment_id)
            .await
    }

    pub async fn cancel_occurrence(
        &self,
        occurrence_id: i64,
        reason: &str,
    ) -> Result<Option<Vec<SizeGroup>>, EngineError> {
        OccurrenceService::new(self.state.clone())
            .cancel_occurrence(occurrence_id, reason)
            .await
    }

    pub async fn join_waitlist(
        &self,
        occurrence_id: i64,
        user_id: i64,
    ) -> Result<WaitlistEntry, EngineError> {
        WaitlistService::new(self.state.clone())
            .join(occurrence_id, user_id, None)
            .await
    }

    /* ---------- настройка залов ---------- */

    pub async fn regenerate_seats(&self, studio_id: i64) -> Result<Vec<Seat>, EngineError> {
        LayoutService::new(self.state.clone())
            .generate_seats(studio_id)
            .await
    }

    pub async fn reassign_occurrence_studio(
        &self,
        occurrence_id: i64,
        new_studio_id: i64,
    ) -> Result<RegenerationReport, EngineError> {
        OccurrenceService::new(self.state.clone())
            .reassign_studio(occurrence_id, new_studio_id)
            .await
    }

    /* ---------- карта зала ---------- */

    pub async fn seat_map(&self, occurrence_id: i64) -> Result<SeatMap, EngineError> {
        SeatMapService::new(self.state.clone())
            .seat_map(occurrence_id)
            .await
    }
}
