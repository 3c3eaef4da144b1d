//! loans.rs
//!
//! Каскад в подсистему проката сменной обуви. Сам прокат - внешний
//! коллаборатор; движку расписания принадлежит только отмена его записей
//! при отмене занятия.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::EngineError;
use crate::models::loan::{group_by_size, FootwearReservation, SizeGroup};
use crate::EngineState;

pub struct LoanService {
    state: Arc<EngineState>,
}

impl LoanService {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Каскадная отмена выдач занятия: {pending, confirmed} -> canceled,
    /// пакетами по размеру обуви. Сбой одной группы логируется и не
    /// прерывает остальные; уже отменённые записи не затрагиваются.
    pub async fn cancel_for_occurrence(
        &self,
        occurrence_id: i64,
    ) -> Result<Vec<SizeGroup>, EngineError> {
        let cancellable = sqlx::query_as::<_, FootwearReservation>(
            r#"
            SELECT * FROM footwear_reservations
            WHERE occurrence_id = $1 AND status IN ('pending', 'confirmed')
            ORDER BY id
            "#,
        )
        .bind(occurrence_id)
        .fetch_all(&self.state.db.pool)
        .await?;

        let groups = group_by_size(&cancellable);
        let mut cancelled = Vec::with_capacity(groups.len());

        for group in groups {
            let res = sqlx::query(
                r#"
                UPDATE footwear_reservations
                SET status = 'canceled'
                WHERE occurrence_id = $1 AND footwear_size = $2
                  AND status IN ('pending', 'confirmed')
                "#,
            )
            .bind(occurrence_id)
            .bind(&group.footwear_size)
            .execute(&self.state.db.pool)
            .await;

            match res {
                Ok(done) => {
                    info!(
                        "occurrence {}: canceled {} footwear loans of size {}",
                        occurrence_id,
                        done.rows_affected(),
                        group.footwear_size
                    );
                    cancelled.push(group);
                }
                Err(e) => {
                    error!(
                        "occurrence {}: footwear cascade failed for size {}: {:?}",
                        occurrence_id, group.footwear_size, e
                    );
                }
            }
        }

        Ok(cancelled)
    }
}
