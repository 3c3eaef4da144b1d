//! Интеграционные сценарии против настоящего PostgreSQL.
//!
//! По умолчанию тесты выключены: нужен DATABASE_URL на одноразовую базу.
//! Запуск: `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveTime, Utc};

use studio_booking::config::{AppConfig, Config, DatabaseConfig, ReservationConfig};
use studio_booking::models::NewOccurrence;
use studio_booking::services::layout::LayoutService;
use studio_booking::services::occurrences::OccurrenceService;
use studio_booking::services::reservations::ReservationService;
use studio_booking::services::waitlist::WaitlistService;
use studio_booking::{EngineState, SchedulingEngine};

async fn engine_state() -> Result<Arc<EngineState>> {
    let config = Config {
        app: AppConfig {
            environment: "test".to_string(),
            rust_log: "studio_booking=debug".to_string(),
        },
        database: DatabaseConfig {
            url: std::env::var("DATABASE_URL")?,
            pool_size: 5,
        },
        reservation: ReservationConfig {
            hold_ttl_minutes: 15,
            sweep_interval_seconds: 60,
        },
    };
    studio_booking::init_tracing(&config.app);
    Ok(EngineState::new(config).await?)
}

async fn create_studio(
    state: &Arc<EngineState>,
    rows: i32,
    cols: i32,
    capacity: i32,
    addressing: &str,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO studios (name, grid_rows, grid_cols, capacity_per_seat, addressing)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(format!("test studio {}x{}", rows, cols))
    .bind(rows)
    .bind(cols)
    .bind(capacity)
    .bind(addressing)
    .fetch_one(&state.db.pool)
    .await?;
    Ok(id)
}

fn new_occurrence(studio_id: i64, max_capacity: i32) -> NewOccurrence {
    // неделя вперёд, фиксированное время - бронь гарантированно открыта
    NewOccurrence {
        class_id: 1,
        instructor_id: 1,
        studio_id,
        scheduled_date: (Utc::now() + Duration::days(7)).date_naive(),
        start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        max_capacity,
        booking_opens_at: None,
        booking_closes_at: None,
        cancellation_deadline: None,
    }
}

async fn assignment_count(state: &Arc<EngineState>, occurrence_id: i64) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM seat_assignments WHERE occurrence_id = $1",
    )
    .bind(occurrence_id)
    .fetch_one(&state.db.pool)
    .await?)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn inventory_is_built_for_every_active_seat() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 3, 4, 10, "left_to_right").await?;

    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_id, 10))
        .await?;

    // ленивый бэкофилл: мест не было, генератор создал их сам
    let seats = LayoutService::new(state.clone()).active_seats(studio_id).await?;
    assert_eq!(seats.len(), 10);
    let numbers: Vec<i32> = seats.iter().filter_map(|s| s.seat_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());

    assert_eq!(assignment_count(&state, occ.id).await?, 10);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn concurrent_reserves_have_exactly_one_winner() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 2, 2, 4, "left_to_right").await?;
    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_id, 4))
        .await?;

    let seat_id = sqlx::query_scalar::<_, i64>(
        "SELECT seat_id FROM seat_assignments WHERE occurrence_id = $1 LIMIT 1",
    )
    .bind(occ.id)
    .fetch_one(&state.db.pool)
    .await?;

    let engine_a = SchedulingEngine::from_state(state.clone());
    let engine_b = SchedulingEngine::from_state(state.clone());
    let (a, b) = tokio::join!(
        engine_a.reserve_seat(occ.id, seat_id, 101),
        engine_b.reserve_seat(occ.id, seat_id, 102),
    );
    let (a, b) = (a?, b?);

    assert!(a.is_some() ^ b.is_some(), "ровно одна из попыток должна выиграть");

    let winner = a.or(b).expect("one reservation won");
    assert_eq!(
        winner.expires_at,
        winner.reserved_at.map(|t| t + Duration::minutes(15))
    );
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn expired_hold_is_taken_over_atomically() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 1, 2, 2, "left_to_right").await?;
    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_id, 2))
        .await?;

    let seat_id = sqlx::query_scalar::<_, i64>(
        "SELECT seat_id FROM seat_assignments WHERE occurrence_id = $1 LIMIT 1",
    )
    .bind(occ.id)
    .fetch_one(&state.db.pool)
    .await?;

    let reservations = ReservationService::new(state.clone());

    // нулевой TTL: резерв истекает немедленно
    let first = reservations
        .reserve_seat_with_ttl(occ.id, seat_id, 101, Duration::zero())
        .await?;
    assert!(first.is_some());
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = reservations.reserve_seat(occ.id, seat_id, 102).await?;
    let second = second.expect("expired hold must be taken over");
    assert_eq!(second.holder_id, Some(102));

    // живой резерв перехватить нельзя
    assert!(reservations.reserve_seat(occ.id, seat_id, 103).await?.is_none());

    // подтверждение фиксирует место за держателем
    assert!(reservations.confirm_seat(second.id).await?);
    assert!(reservations.reserve_seat(occ.id, seat_id, 104).await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn studio_reassignment_rebuilds_the_inventory() -> Result<()> {
    let state = engine_state().await?;
    let studio_a = create_studio(&state, 5, 2, 10, "left_to_right").await?;
    let studio_b = create_studio(&state, 3, 2, 6, "right_to_left").await?;

    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_a, 10))
        .await?;
    assert_eq!(assignment_count(&state, occ.id).await?, 10);

    // действующий резерв будет уничтожен перегенерацией
    let seat_id = sqlx::query_scalar::<_, i64>(
        "SELECT seat_id FROM seat_assignments WHERE occurrence_id = $1 LIMIT 1",
    )
    .bind(occ.id)
    .fetch_one(&state.db.pool)
    .await?;
    let engine = SchedulingEngine::from_state(state.clone());
    assert!(engine.reserve_seat(occ.id, seat_id, 55).await?.is_some());

    let report = engine.reassign_occurrence_studio(occ.id, studio_b).await?;
    assert_eq!(report.dropped_holds, 1);
    assert_eq!(report.created, 6);

    assert_eq!(assignment_count(&state, occ.id).await?, 6);
    let stale: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM seat_assignments a
        JOIN seats s ON s.id = a.seat_id
        WHERE a.occurrence_id = $1 AND s.studio_id = $2
        "#,
    )
    .bind(occ.id)
    .bind(studio_a)
    .fetch_one(&state.db.pool)
    .await?;
    assert_eq!(stale, 0, "строки старой студии должны исчезнуть");
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn cancellation_cascades_to_footwear_loans() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 2, 2, 4, "center_out").await?;
    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_id, 4))
        .await?;

    for (user_id, size, status) in [
        (1i64, "38", "pending"),
        (2, "38", "confirmed"),
        (3, "41", "pending"),
        (4, "44", "canceled"),
    ] {
        sqlx::query(
            "INSERT INTO footwear_reservations (occurrence_id, user_id, footwear_size, status)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(occ.id)
        .bind(user_id)
        .bind(size)
        .bind(status)
        .execute(&state.db.pool)
        .await?;
    }

    let engine = SchedulingEngine::from_state(state.clone());
    let report = engine
        .cancel_occurrence(occ.id, "instructor unavailable")
        .await?
        .expect("first cancellation runs the cascade");

    assert_eq!(report.len(), 2);
    assert_eq!(report[0].footwear_size, "38");
    assert_eq!(report[0].reservation_ids.len(), 2);
    assert_eq!(report[1].footwear_size, "41");

    let canceled: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM footwear_reservations
         WHERE occurrence_id = $1 AND status = 'canceled'",
    )
    .bind(occ.id)
    .fetch_one(&state.db.pool)
    .await?;
    assert_eq!(canceled, 4);

    let occ = OccurrenceService::new(state.clone()).get_occurrence(occ.id).await?;
    assert!(occ.is_cancelled);
    assert_eq!(
        occ.status,
        studio_booking::models::OccurrenceStatus::Cancelled
    );
    assert_eq!(occ.cancellation_reason.as_deref(), Some("instructor unavailable"));

    // повторная отмена - no-op
    assert!(engine.cancel_occurrence(occ.id, "again").await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn waitlist_is_served_in_join_order() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 1, 1, 1, "left_to_right").await?;
    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_id, 1))
        .await?;

    let engine = SchedulingEngine::from_state(state.clone());
    let first = engine.join_waitlist(occ.id, 201).await?;
    let _second = engine.join_waitlist(occ.id, 202).await?;

    let occ_row = OccurrenceService::new(state.clone()).get_occurrence(occ.id).await?;
    assert_eq!(occ_row.waitlist_count, 2);

    let waitlist = WaitlistService::new(state.clone());
    let notified = waitlist.notify_next(occ.id).await?.expect("head of queue");
    assert_eq!(notified.id, first.id);
    assert_eq!(notified.user_id, 201);

    assert!(waitlist.convert_to_booking(notified.id).await?);

    // второй зовётся следующим
    let next = waitlist.notify_next(occ.id).await?.expect("second in queue");
    assert_eq!(next.user_id, 202);
    assert!(waitlist.cancel(next.id).await?);

    let occ_row = OccurrenceService::new(state.clone()).get_occurrence(occ.id).await?;
    assert_eq!(occ_row.waitlist_count, 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn layout_round_trip_is_stable() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 4, 5, 17, "center_out").await?;

    let layout = LayoutService::new(state.clone());
    let before: Vec<(i32, i32, Option<i32>)> = layout
        .generate_seats(studio_id)
        .await?
        .into_iter()
        .map(|s| (s.row, s.column, s.seat_number))
        .collect();

    sqlx::query("DELETE FROM seats WHERE studio_id = $1")
        .bind(studio_id)
        .execute(&state.db.pool)
        .await?;

    let after: Vec<(i32, i32, Option<i32>)> = layout
        .generate_seats(studio_id)
        .await?
        .into_iter()
        .map(|s| (s.row, s.column, s.seat_number))
        .collect();

    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn booked_spot_counters_stay_consistent() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 2, 2, 4, "left_to_right").await?;
    let occurrences = OccurrenceService::new(state.clone());
    let occ = occurrences
        .create_occurrence_with_inventory(new_occurrence(studio_id, 2))
        .await?;

    assert!(occurrences.book_spot(occ.id).await?);
    assert!(occurrences.book_spot(occ.id).await?);
    // мест больше нет
    assert!(!occurrences.book_spot(occ.id).await?);

    let row = occurrences.get_occurrence(occ.id).await?;
    assert_eq!(row.booked_spots, 2);
    assert_eq!(row.available_spots, 0);

    assert!(occurrences.cancel_booking(occ.id).await?);
    let row = occurrences.get_occurrence(occ.id).await?;
    assert_eq!(row.available_spots, 1);

    // сверка с истиной строк: броней по инвентарю нет вовсе
    let row = occurrences.reconcile_counters(occ.id).await?;
    assert_eq!(row.booked_spots, 0);
    assert_eq!(row.available_spots, 2);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch PostgreSQL"]
async fn seat_map_reports_states_and_counts() -> Result<()> {
    let state = engine_state().await?;
    let studio_id = create_studio(&state, 2, 3, 5, "left_to_right").await?;
    let occ = OccurrenceService::new(state.clone())
        .create_occurrence_with_inventory(new_occurrence(studio_id, 5))
        .await?;

    let engine = SchedulingEngine::from_state(state.clone());
    let seats = LayoutService::new(state.clone()).active_seats(studio_id).await?;
    let held = engine
        .reserve_seat(occ.id, seats[0].id, 77)
        .await?
        .expect("seat is free");
    assert!(engine.confirm_seat(held.id).await?);

    let map = engine.seat_map(occ.id).await?;
    assert_eq!(map.studio.grid_rows, 2);
    assert_eq!(map.grid.len(), 2);
    assert_eq!(map.summary.occupied, 1);
    assert_eq!(map.summary.available, 4);
    // сетка 2x3 при пяти местах: одна позиция пустует
    assert_eq!(map.summary.empty, 1);
    assert_eq!(map.by_status["occupied"].len(), 1);
    Ok(())
}
