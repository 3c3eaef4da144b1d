use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// За сколько дней до начала открывается запись.
pub const BOOKING_OPENS_DAYS: i64 = 7;
/// За сколько часов до начала запись закрывается.
pub const BOOKING_CLOSES_HOURS: i64 = 1;
/// За сколько дней до начала истекает срок бесплатной отмены.
pub const CANCELLATION_DEADLINE_DAYS: i64 = 3;
/// Минимальный запас времени до начала занятия для новой брони.
pub const BOOKING_CUTOFF_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// Одно занятие в расписании. Счётчики мест - кэш поверх строк
/// `seat_assignments`, сверка выполняется `reconcile_counters`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClassOccurrence {
    pub id: i64,
    pub class_id: i64,
    pub instructor_id: i64,
    pub studio_id: i64,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: i32,
    pub booked_spots: i32,
    pub available_spots: i32,
    pub waitlist_count: i32,
    pub booking_opens_at: DateTime<Utc>,
    pub booking_closes_at: DateTime<Utc>,
    pub cancellation_deadline: DateTime<Utc>,
    pub is_cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub status: OccurrenceStatus,
    pub created_at: DateTime<Utc>,
}

/// Временные окна занятия, выводимые из сырых даты и времени начала.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindows {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub cancellation_deadline: DateTime<Utc>,
}

impl BookingWindows {
    pub fn derive(scheduled_date: NaiveDate, start_time: NaiveTime) -> Self {
        let start = scheduled_date.and_time(start_time).and_utc();
        BookingWindows {
            opens_at: start - Duration::days(BOOKING_OPENS_DAYS),
            closes_at: start - Duration::hours(BOOKING_CLOSES_HOURS),
            cancellation_deadline: start - Duration::days(CANCELLATION_DEADLINE_DAYS),
        }
    }
}

impl ClassOccurrence {
    pub fn start_at(&self) -> DateTime<Utc> {
        self.scheduled_date.and_time(self.start_time).and_utc()
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.scheduled_date.and_time(self.end_time).and_utc()
    }

    /// Можно ли сейчас занять место: занятие не отменено, не в прошлом,
    /// есть свободные места и до начала остаётся не меньше двух часов.
    pub fn can_book(&self, now: DateTime<Utc>) -> bool {
        !self.is_cancelled
            && self.available_spots > 0
            && now + Duration::hours(BOOKING_CUTOFF_HOURS) <= self.start_at()
    }

    pub fn book_spot(&mut self, now: DateTime<Utc>) -> bool {
        if !self.can_book(now) {
            return false;
        }
        self.booked_spots += 1;
        self.recompute_available();
        true
    }

    // Обратная операция для откатов; безусловная, но не уходит ниже нуля.
    pub fn cancel_booking(&mut self) {
        self.booked_spots = (self.booked_spots - 1).max(0);
        self.recompute_available();
    }

    pub fn add_to_waitlist(&mut self) {
        self.waitlist_count += 1;
    }

    pub fn remove_from_waitlist(&mut self) {
        self.waitlist_count = (self.waitlist_count - 1).max(0);
    }

    pub fn recompute_available(&mut self) {
        self.available_spots = (self.max_capacity - self.booked_spots).max(0);
    }

    /// Статус по часам: запланировано / идёт / завершено. Отменённые занятия
    /// не трогаем.
    pub fn status_by_clock(&self, now: DateTime<Utc>) -> OccurrenceStatus {
        if self.is_cancelled {
            return OccurrenceStatus::Cancelled;
        }
        if now < self.start_at() {
            OccurrenceStatus::Scheduled
        } else if now < self.end_at() {
            OccurrenceStatus::InProgress
        } else {
            OccurrenceStatus::Completed
        }
    }
}

/// Параметры создания занятия. Явно заданные окна (массовый импорт)
/// сохраняются как есть, отсутствующие выводятся из даты и времени начала.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOccurrence {
    #[validate(range(min = 1))]
    pub class_id: i64,
    #[validate(range(min = 1))]
    pub instructor_id: i64,
    #[validate(range(min = 1))]
    pub studio_id: i64,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[validate(range(min = 0))]
    pub max_capacity: i32,
    pub booking_opens_at: Option<DateTime<Utc>>,
    pub booking_closes_at: Option<DateTime<Utc>>,
    pub cancellation_deadline: Option<DateTime<Utc>>,
}
