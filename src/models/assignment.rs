use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Available,
    Reserved,
    Occupied,
    Blocked,
}

/// Состояние позиции с учётом ленивого истечения резерва. Истёкший резерв
/// для всех операций чтения и записи эквивалентен свободному месту.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Available,
    Reserved,
    Occupied,
    Blocked,
    Expired,
}

/// Инвентарная строка: состояние одного места в рамках одного занятия.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub id: i64,
    pub occurrence_id: i64,
    pub seat_id: i64,
    pub holder_id: Option<i64>,
    pub status: AssignmentStatus,
    pub reserved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub code: String,
}

impl SeatAssignment {
    /// Резерв возможен из `available` либо поверх истёкшего `reserved`.
    /// Отказ (false) означает, что место занято, - вызывающая сторона сама
    /// решает, пробовать ли другое место.
    pub fn reserve(&mut self, holder_id: i64, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.status {
            AssignmentStatus::Available => {}
            AssignmentStatus::Reserved if self.is_expired(now) => self.release(),
            _ => return false,
        }
        self.holder_id = Some(holder_id);
        self.status = AssignmentStatus::Reserved;
        self.reserved_at = Some(now);
        self.expires_at = Some(now + ttl);
        true
    }

    /// Подтверждение только из живого `reserved`.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != AssignmentStatus::Reserved || self.is_expired(now) {
            return false;
        }
        self.status = AssignmentStatus::Occupied;
        self.expires_at = None;
        true
    }

    /// Возврат в `available` из любого состояния. Идемпотентно.
    pub fn release(&mut self) {
        self.holder_id = None;
        self.reserved_at = None;
        self.expires_at = None;
        self.status = AssignmentStatus::Available;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == AssignmentStatus::Reserved
            && self.expires_at.map_or(false, |e| e < now)
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveStatus {
        if self.is_expired(now) {
            return EffectiveStatus::Expired;
        }
        match self.status {
            AssignmentStatus::Available => EffectiveStatus::Available,
            AssignmentStatus::Reserved => EffectiveStatus::Reserved,
            AssignmentStatus::Occupied => EffectiveStatus::Occupied,
            AssignmentStatus::Blocked => EffectiveStatus::Blocked,
        }
    }

    // Административная блокировка: только из available и обратно.
    pub fn block(&mut self) -> bool {
        if self.status != AssignmentStatus::Available {
            return false;
        }
        self.status = AssignmentStatus::Blocked;
        true
    }

    pub fn unblock(&mut self) -> bool {
        if self.status != AssignmentStatus::Blocked {
            return false;
        }
        self.status = AssignmentStatus::Available;
        true
    }
}
