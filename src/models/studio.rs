use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Порядок обхода колонок при нумерации мест в зале.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    LeftToRight,
    RightToLeft,
    CenterOut,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Studio {
    pub id: i64,
    pub name: String,
    pub grid_rows: i32,
    pub grid_cols: i32,
    pub capacity_per_seat: i32,
    pub addressing: AddressingMode,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Studio {
    // Сетка пригодна для генерации мест?
    pub fn has_valid_grid(&self) -> bool {
        self.grid_rows > 0 && self.grid_cols > 0 && self.capacity_per_seat > 0
    }

    /// Сколько мест реально создаётся: не больше вместимости и не больше сетки.
    pub fn seat_budget(&self) -> usize {
        if !self.has_valid_grid() {
            return 0;
        }
        (self.capacity_per_seat.min(self.grid_rows * self.grid_cols)) as usize
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStudio {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 1))]
    pub grid_rows: i32,
    #[validate(range(min = 1))]
    pub grid_cols: i32,
    #[validate(range(min = 1))]
    pub capacity_per_seat: i32,
    pub addressing: AddressingMode,
}
