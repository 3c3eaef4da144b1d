use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Окно ответа на приглашение из листа ожидания - фиксированные два часа.
pub const RESPONSE_WINDOW_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Confirmed,
    Expired,
    Cancelled,
}

/// Позиция в очереди ожидания. Намеренно не связана с `seat_assignments`:
/// запись в листе не удерживает место, реальный резерв появляется только
/// после успешного `reserve()` внешнего сценария бронирования.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: i64,
    pub occurrence_id: i64,
    pub user_id: i64,
    pub package_id: Option<i64>,
    pub status: WaitlistStatus,
    pub joined_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl WaitlistEntry {
    /// Приглашение: только из `waiting`, открывает двухчасовое окно ответа.
    pub fn notify(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != WaitlistStatus::Waiting {
            return false;
        }
        self.status = WaitlistStatus::Notified;
        self.notified_at = Some(now);
        self.expires_at = Some(now + Duration::hours(RESPONSE_WINDOW_HOURS));
        true
    }

    /// Пользователь успел забронировать освободившееся место.
    pub fn convert_to_booking(&mut self) -> bool {
        if self.status != WaitlistStatus::Notified {
            return false;
        }
        self.status = WaitlistStatus::Confirmed;
        true
    }

    pub fn cancel(&mut self) -> bool {
        match self.status {
            WaitlistStatus::Waiting | WaitlistStatus::Notified => {
                self.status = WaitlistStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == WaitlistStatus::Notified
            && self.expires_at.map_or(false, |e| e < now)
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_lapsed(now) {
            return false;
        }
        self.status = WaitlistStatus::Expired;
        true
    }
}
