//! layout.rs
//!
//! Генератор схемы зала: превращает сетку студии в упорядоченный набор
//! физических мест.
//!
//! Включает в себя следующую функциональность:
//! - Порядок обхода колонок по режиму адресации (слева направо, справа
//!   налево, от центра наружу).
//! - Генерация позиций (ряд, колонка) с остановкой на вместимости студии.
//! - Сквозная перенумерация мест 1..N в порядке обхода (ряд, колонка).
//! - Защита от удаления места, на которое уже ссылалась инвентарная строка.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{AddressingMode, Seat, Studio};
use crate::EngineState;

/* ---------- чистая часть генератора ---------- */

/// Порядок обхода колонок 1..=C для заданного режима адресации.
///
/// От центра наружу: для нечётного C - центр, центр-1, центр+1, ...;
/// для чётного C - левая центральная, правая центральная, дальше наружу
/// с чередованием.
pub fn column_order(columns: i32, addressing: AddressingMode) -> Vec<i32> {
    if columns <= 0 {
        return Vec::new();
    }
    match addressing {
        AddressingMode::LeftToRight => (1..=columns).collect(),
        AddressingMode::RightToLeft => (1..=columns).rev().collect(),
        AddressingMode::CenterOut => {
            let mut order = Vec::with_capacity(columns as usize);
            let (mut left, mut right) = if columns % 2 == 1 {
                let center = (columns + 1) / 2;
                order.push(center);
                (center - 1, center + 1)
            } else {
                let center_left = columns / 2;
                order.push(center_left);
                order.push(center_left + 1);
                (center_left - 1, center_left + 2)
            };
            while left >= 1 || right <= columns {
                if left >= 1 {
                    order.push(left);
                    left -= 1;
                }
                if right <= columns {
                    order.push(right);
                    right += 1;
                }
            }
            order
        }
    }
}

/// Позиции мест в порядке обхода. Длина = min(вместимость, ряды×колонки).
/// Некорректная сетка - не ошибка: ноль мест и предупреждение в логе.
pub fn generate_positions(
    rows: i32,
    columns: i32,
    capacity: i32,
    addressing: AddressingMode,
) -> Vec<(i32, i32)> {
    if rows <= 0 || columns <= 0 || capacity <= 0 {
        warn!(
            "invalid studio grid (rows={}, cols={}, capacity={}): generating no seats",
            rows, columns, capacity
        );
        return Vec::new();
    }
    let budget = capacity.min(rows * columns) as usize;
    let cols = column_order(columns, addressing);
    let mut positions = Vec::with_capacity(budget);
    'rows: for row in 1..=rows {
        for &col in &cols {
            if positions.len() == budget {
                break 'rows;
            }
            positions.push((row, col));
        }
    }
    positions
}

/* ---------- сервис ---------- */

pub struct LayoutService {
    state: Arc<EngineState>,
}

impl LayoutService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    async fn load_studio(&self, studio_id: i64) -> Result<Studio, EngineError> {
        sqlx::query_as::<_, Studio>("SELECT * FROM studios WHERE id = $1")
            .bind(studio_id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or(EngineError::StudioNotFound(studio_id))
    }

    /// Приводит набор мест студии к её текущей сетке.
    ///
    /// Существующие позиции сохраняются (или реактивируются), лишние места
    /// удаляются, если по ним нет истории, иначе деактивируются. В конце -
    /// полная перенумеровка.
    pub async fn generate_seats(&self, studio_id: i64) -> Result<Vec<Seat>, EngineError> {
        let studio = self.load_studio(studio_id).await?;
        let positions = generate_positions(
            studio.grid_rows,
            studio.grid_cols,
            studio.capacity_per_seat,
            studio.addressing,
        );

        for &(row, col) in &positions {
            sqlx::query(
                r#"
                INSERT INTO seats (studio_id, row_num, col_num, is_active)
                VALUES ($1, $2, $3, TRUE)
                ON CONFLICT (studio_id, row_num, col_num) DO UPDATE SET is_active = TRUE
                "#,
            )
            .bind(studio_id)
            .bind(row)
            .bind(col)
            .execute(&self.state.db.pool)
            .await?;
        }

        // места, выпавшие из новой схемы
        let wanted: HashSet<(i32, i32)> = positions.iter().copied().collect();
        let existing = sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE studio_id = $1 AND is_active = TRUE",
        )
        .bind(studio_id)
        .fetch_all(&self.state.db.pool)
        .await?;

        for seat in existing {
            if wanted.contains(&(seat.row, seat.column)) {
                continue;
            }
            if self.seat_has_history(seat.id).await? {
                sqlx::query("UPDATE seats SET is_active = FALSE, seat_number = NULL WHERE id = $1")
                    .bind(seat.id)
                    .execute(&self.state.db.pool)
                    .await?;
            } else {
                sqlx::query("DELETE FROM seats WHERE id = $1")
                    .bind(seat.id)
                    .execute(&self.state.db.pool)
                    .await?;
            }
        }

        self.renumber_seats(studio_id).await?;

        let seats = self.active_seats(studio_id).await?;
        info!("studio {}: layout generated, {} active seats", studio_id, seats.len());
        Ok(seats)
    }

    /// Плотная перенумеровка 1..N активных мест в порядке (ряд, колонка);
    /// чинит NULL и сбитые номера, у неактивных мест номер снимается.
    pub async fn renumber_seats(&self, studio_id: i64) -> Result<(), EngineError> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE studio_id = $1 AND is_active = TRUE
             ORDER BY row_num, col_num",
        )
        .bind(studio_id)
        .fetch_all(&self.state.db.pool)
        .await?;

        for (idx, seat) in seats.iter().enumerate() {
            let number = (idx + 1) as i32;
            if seat.seat_number != Some(number) {
                sqlx::query("UPDATE seats SET seat_number = $1 WHERE id = $2")
                    .bind(number)
                    .bind(seat.id)
                    .execute(&self.state.db.pool)
                    .await?;
            }
        }

        sqlx::query(
            "UPDATE seats SET seat_number = NULL
             WHERE studio_id = $1 AND is_active = FALSE AND seat_number IS NOT NULL",
        )
        .bind(studio_id)
        .execute(&self.state.db.pool)
        .await?;

        Ok(())
    }

    /// Удаление места. Отклоняется, если по месту есть хоть одна
    /// инвентарная строка - такие места только деактивируются.
    pub async fn delete_seat(&self, seat_id: i64) -> Result<(), EngineError> {
        if self.seat_has_history(seat_id).await? {
            return Err(EngineError::SeatInUse(seat_id));
        }
        let studio_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM seats WHERE id = $1 RETURNING studio_id")
                .bind(seat_id)
                .fetch_optional(&self.state.db.pool)
                .await?;
        if let Some(studio_id) = studio_id {
            self.renumber_seats(studio_id).await?;
        }
        Ok(())
    }

    /// Путь вывода из эксплуатации для мест с историей.
    pub async fn deactivate_seat(&self, seat_id: i64) -> Result<bool, EngineError> {
        let studio_id: Option<i64> = sqlx::query_scalar(
            "UPDATE seats SET is_active = FALSE WHERE id = $1 RETURNING studio_id",
        )
        .bind(seat_id)
        .fetch_optional(&self.state.db.pool)
        .await?;
        match studio_id {
            Some(studio_id) => {
                self.renumber_seats(studio_id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn active_seats(&self, studio_id: i64) -> Result<Vec<Seat>, EngineError> {
        Ok(sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE studio_id = $1 AND is_active = TRUE
             ORDER BY row_num, col_num",
        )
        .bind(studio_id)
        .fetch_all(&self.state.db.pool)
        .await?)
    }

    async fn seat_has_history(&self, seat_id: i64) -> Result<bool, EngineError> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM seat_assignments WHERE seat_id = $1)",
        )
        .bind(seat_id)
        .fetch_one(&self.state.db.pool)
        .await?)
    }
}
