use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FootwearStatus {
    Pending,
    Confirmed,
    Canceled,
}

/// Выдача сменной обуви - зависимая запись внешней подсистемы проката.
/// Движок расписания только каскадно отменяет её при отмене занятия.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FootwearReservation {
    pub id: i64,
    pub occurrence_id: i64,
    pub user_id: i64,
    pub footwear_size: String,
    pub status: FootwearStatus,
    pub created_at: DateTime<Utc>,
}

impl FootwearReservation {
    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, FootwearStatus::Pending | FootwearStatus::Confirmed)
    }
}

/// Сводка каскадной отмены по одному размеру обуви.
#[derive(Debug, Clone, Serialize)]
pub struct SizeGroup {
    pub footwear_size: String,
    pub reservation_ids: Vec<i64>,
}

/// Группирует отменяемые выдачи по размеру для отчёта каскада.
/// Уже отменённые записи в группы не попадают.
pub fn group_by_size(reservations: &[FootwearReservation]) -> Vec<SizeGroup> {
    let mut groups: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for r in reservations.iter().filter(|r| r.is_cancellable()) {
        groups.entry(r.footwear_size.clone()).or_default().push(r.id);
    }
    groups
        .into_iter()
        .map(|(footwear_size, reservation_ids)| SizeGroup {
            footwear_size,
            reservation_ids,
        })
        .collect()
}
