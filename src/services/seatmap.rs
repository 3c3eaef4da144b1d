//! seatmap.rs
//!
//! Модуль выдачи карты зала для одного занятия.
//!
//! Включает в себя следующую функциональность:
//! - Метаданные студии (сетка, адресация, вместимость).
//! - Двумерная сетка состояний по позициям, включая пустые позиции без мест.
//! - Группировка инвентарных строк по действующему статусу.
//! - Сводные счётчики: available / reserved / occupied / blocked / expired / empty.
//!
//! Все состояния считаются через `effective_status(now)`: истёкший резерв
//! показывается как `expired`, а не как живой `reserved`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::models::{AddressingMode, EffectiveStatus, Seat, SeatAssignment, Studio};
use crate::EngineState;

#[derive(Debug, Clone, Serialize)]
pub struct StudioSummary {
    pub id: i64,
    pub name: String,
    pub grid_rows: i32,
    pub grid_cols: i32,
    pub capacity_per_seat: i32,
    pub addressing: AddressingMode,
}

/// Состояние одной позиции сетки. `empty` - позиция без активного места
/// или без инвентарной строки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Empty,
    Available,
    Reserved,
    Occupied,
    Blocked,
    Expired,
}

impl From<EffectiveStatus> for CellState {
    fn from(status: EffectiveStatus) -> Self {
        match status {
            EffectiveStatus::Available => CellState::Available,
            EffectiveStatus::Reserved => CellState::Reserved,
            EffectiveStatus::Occupied => CellState::Occupied,
            EffectiveStatus::Blocked => CellState::Blocked,
            EffectiveStatus::Expired => CellState::Expired,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatCell {
    pub seat_id: Option<i64>,
    pub seat_number: Option<i32>,
    pub state: CellState,
}

/// Инвентарная строка с координатами места для внешних потребителей.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    pub id: i64,
    pub seat_id: i64,
    pub row: Option<i32>,
    pub column: Option<i32>,
    pub seat_number: Option<i32>,
    pub holder_id: Option<i64>,
    pub status: EffectiveStatus,
    pub reserved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeatMapSummary {
    pub available: usize,
    pub reserved: usize,
    pub occupied: usize,
    pub blocked: usize,
    pub expired: usize,
    pub empty: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatMap {
    pub occurrence_id: i64,
    pub studio: StudioSummary,
    pub grid: Vec<Vec<SeatCell>>,
    pub by_status: BTreeMap<String, Vec<AssignmentView>>,
    pub summary: SeatMapSummary,
}

fn status_key(status: EffectiveStatus) -> &'static str {
    match status {
        EffectiveStatus::Available => "available",
        EffectiveStatus::Reserved => "reserved",
        EffectiveStatus::Occupied => "occupied",
        EffectiveStatus::Blocked => "blocked",
        EffectiveStatus::Expired => "expired",
    }
}

/// Сборка карты из загруженных строк. Чистая функция: время передаётся
/// снаружи, все состояния - действующие на момент `now`.
pub fn build_seat_map(
    occurrence_id: i64,
    studio: &Studio,
    seats: &[Seat],
    assignments: &[SeatAssignment],
    now: DateTime<Utc>,
) -> SeatMap {
    let seat_by_id: HashMap<i64, &Seat> = seats.iter().map(|s| (s.id, s)).collect();
    let assignment_by_seat: HashMap<i64, &SeatAssignment> =
        assignments.iter().map(|a| (a.seat_id, a)).collect();

    let mut summary = SeatMapSummary::default();
    let mut grid = Vec::new();

    if studio.has_valid_grid() {
        let active_at: HashMap<(i32, i32), &Seat> = seats
            .iter()
            .filter(|s| s.is_active)
            .map(|s| ((s.row, s.column), s))
            .collect();

        grid.reserve(studio.grid_rows as usize);
        for row in 1..=studio.grid_rows {
            let mut cells = Vec::with_capacity(studio.grid_cols as usize);
            for col in 1..=studio.grid_cols {
                let cell = match active_at.get(&(row, col)) {
                    Some(seat) => match assignment_by_seat.get(&seat.id) {
                        Some(a) => SeatCell {
                            seat_id: Some(seat.id),
                            seat_number: seat.seat_number,
                            state: a.effective_status(now).into(),
                        },
                        // место есть, а инвентарной строки нет
                        None => SeatCell {
                            seat_id: Some(seat.id),
                            seat_number: seat.seat_number,
                            state: CellState::Empty,
                        },
                    },
                    None => SeatCell {
                        seat_id: None,
                        seat_number: None,
                        state: CellState::Empty,
                    },
                };
                if cell.state == CellState::Empty {
                    summary.empty += 1;
                }
                cells.push(cell);
            }
            grid.push(cells);
        }
    }

    let mut by_status: BTreeMap<String, Vec<AssignmentView>> = BTreeMap::new();
    for a in assignments {
        let status = a.effective_status(now);
        match status {
            EffectiveStatus::Available => summary.available += 1,
            EffectiveStatus::Reserved => summary.reserved += 1,
            EffectiveStatus::Occupied => summary.occupied += 1,
            EffectiveStatus::Blocked => summary.blocked += 1,
            EffectiveStatus::Expired => summary.expired += 1,
        }
        let seat = seat_by_id.get(&a.seat_id);
        by_status
            .entry(status_key(status).to_string())
            .or_default()
            .push(AssignmentView {
                id: a.id,
                seat_id: a.seat_id,
                row: seat.map(|s| s.row),
                column: seat.map(|s| s.column),
                seat_number: seat.and_then(|s| s.seat_number),
                holder_id: a.holder_id,
                status,
                reserved_at: a.reserved_at,
                expires_at: a.expires_at,
                code: a.code.clone(),
            });
    }

    SeatMap {
        occurrence_id,
        studio: StudioSummary {
            id: studio.id,
            name: studio.name.clone(),
            grid_rows: studio.grid_rows,
            grid_cols: studio.grid_cols,
            capacity_per_seat: studio.capacity_per_seat,
            addressing: studio.addressing,
        },
        grid,
        by_status,
        summary,
    }
}

pub struct SeatMapService {
    state: Arc<EngineState>,
}

impl SeatMapService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    pub async fn seat_map(&self, occurrence_id: i64) -> Result<SeatMap, EngineError> {
        let studio_id: i64 =
            sqlx::query_scalar("SELECT studio_id FROM class_occurrences WHERE id = $1")
                .bind(occurrence_id)
                .fetch_optional(&self.state.db.pool)
                .await?
                .ok_or(EngineError::OccurrenceNotFound(occurrence_id))?;

        let studio = sqlx::query_as::<_, Studio>("SELECT * FROM studios WHERE id = $1")
            .bind(studio_id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or(EngineError::StudioNotFound(studio_id))?;

        // все места студии: неактивные нужны для координат старых строк
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE studio_id = $1 ORDER BY row_num, col_num",
        )
        .bind(studio_id)
        .fetch_all(&self.state.db.pool)
        .await?;

        let assignments = sqlx::query_as::<_, SeatAssignment>(
            "SELECT * FROM seat_assignments WHERE occurrence_id = $1 ORDER BY seat_id",
        )
        .bind(occurrence_id)
        .fetch_all(&self.state.db.pool)
        .await?;

        Ok(build_seat_map(
            occurrence_id,
            &studio,
            &seats,
            &assignments,
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentStatus;
    use chrono::Duration;
    use fake::faker::company::en::CompanyName;
    use fake::Fake;

    fn studio() -> Studio {
        Studio {
            id: 1,
            name: CompanyName().fake(),
            grid_rows: 2,
            grid_cols: 3,
            capacity_per_seat: 5,
            addressing: AddressingMode::LeftToRight,
            is_active: true,
            created_at: now(),
        }
    }

    fn seat(id: i64, row: i32, column: i32, number: i32) -> Seat {
        Seat {
            id,
            studio_id: 1,
            row,
            column,
            seat_number: Some(number),
            is_active: true,
        }
    }

    fn assignment(id: i64, seat_id: i64, status: AssignmentStatus) -> SeatAssignment {
        SeatAssignment {
            id,
            occurrence_id: 10,
            seat_id,
            holder_id: None,
            status,
            reserved_at: None,
            expires_at: None,
            code: format!("10-{}-0-abcd", seat_id),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn grid_and_summary_reflect_effective_states() {
        let t = now();
        let studio = studio();
        // 5 мест на сетке 2x3: позиция (2,3) остаётся пустой
        let seats = vec![
            seat(1, 1, 1, 1),
            seat(2, 1, 2, 2),
            seat(3, 1, 3, 3),
            seat(4, 2, 1, 4),
            seat(5, 2, 2, 5),
        ];

        let mut live = assignment(101, 2, AssignmentStatus::Reserved);
        live.holder_id = Some(7);
        live.reserved_at = Some(t - Duration::minutes(5));
        live.expires_at = Some(t + Duration::minutes(10));

        let mut expired = assignment(102, 3, AssignmentStatus::Reserved);
        expired.holder_id = Some(8);
        expired.reserved_at = Some(t - Duration::hours(1));
        expired.expires_at = Some(t - Duration::minutes(1));

        let assignments = vec![
            assignment(100, 1, AssignmentStatus::Available),
            live,
            expired,
            assignment(103, 4, AssignmentStatus::Occupied),
            assignment(104, 5, AssignmentStatus::Blocked),
        ];

        let map = build_seat_map(10, &studio, &seats, &assignments, t);

        assert_eq!(map.grid.len(), 2);
        assert_eq!(map.grid[0].len(), 3);
        assert_eq!(map.grid[0][0].state, CellState::Available);
        assert_eq!(map.grid[0][1].state, CellState::Reserved);
        assert_eq!(map.grid[0][2].state, CellState::Expired);
        assert_eq!(map.grid[1][0].state, CellState::Occupied);
        assert_eq!(map.grid[1][1].state, CellState::Blocked);
        assert_eq!(map.grid[1][2].state, CellState::Empty);

        assert_eq!(
            map.summary,
            SeatMapSummary {
                available: 1,
                reserved: 1,
                occupied: 1,
                blocked: 1,
                expired: 1,
                empty: 1,
            }
        );

        assert_eq!(map.by_status["expired"].len(), 1);
        assert_eq!(map.by_status["expired"][0].seat_id, 3);
        assert_eq!(map.by_status["expired"][0].row, Some(1));
        assert_eq!(map.by_status["reserved"][0].holder_id, Some(7));
    }

    #[test]
    fn seat_without_inventory_row_counts_as_empty() {
        let t = now();
        let studio = studio();
        let seats = vec![seat(1, 1, 1, 1)];
        let map = build_seat_map(10, &studio, &seats, &[], t);
        assert_eq!(map.grid[0][0].state, CellState::Empty);
        assert_eq!(map.grid[0][0].seat_id, Some(1));
        // 6 позиций сетки, все пустые
        assert_eq!(map.summary.empty, 6);
        assert!(map.by_status.is_empty());
    }

    #[test]
    fn seat_map_serializes_with_snake_case_states() {
        let t = now();
        let studio = studio();
        let seats = vec![seat(1, 1, 1, 1)];
        let assignments = vec![assignment(100, 1, AssignmentStatus::Blocked)];
        let map = build_seat_map(10, &studio, &seats, &assignments, t);

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["grid"][0][0]["state"], "blocked");
        assert_eq!(json["summary"]["blocked"], 1);
        assert_eq!(json["studio"]["addressing"], "left_to_right");
        assert!(json["by_status"]["blocked"].is_array());
    }

    #[test]
    fn invalid_grid_produces_an_empty_map() {
        let mut bad = studio();
        bad.grid_rows = 0;
        let map = build_seat_map(10, &bad, &[], &[], now());
        assert!(map.grid.is_empty());
        assert_eq!(map.summary, SeatMapSummary::default());
    }
}
