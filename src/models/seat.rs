use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub studio_id: i64,
    #[sqlx(rename = "row_num")]
    pub row: i32,
    #[sqlx(rename = "col_num")]
    pub column: i32,
    // Сквозной номер 1..N в порядке обхода; NULL до первой пронумеровки.
    pub seat_number: Option<i32>,
    pub is_active: bool,
}
