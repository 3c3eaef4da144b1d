use thiserror::Error;

/// Ошибки движка расписания. Отказ в переходе состояния (занятое место,
/// повторная отмена) ошибкой не считается и возвращается как `Ok`-значение.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("studio {0} not found")]
    StudioNotFound(i64),

    #[error("class occurrence {0} not found")]
    OccurrenceNotFound(i64),

    #[error("seat assignment {0} not found")]
    AssignmentNotFound(i64),

    #[error("seat {0} has assignment history and cannot be deleted")]
    SeatInUse(i64),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
