use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub reservation: ReservationConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Политика резервирования мест
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    /// Время жизни неподтверждённого резерва, в минутах.
    pub hold_ttl_minutes: i64,
    /// Интервал фонового обхода истёкших резервов, в секундах.
    pub sweep_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Config {
            app: AppConfig {
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "studio_booking=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            reservation: ReservationConfig {
                hold_ttl_minutes: env::var("RESERVATION_HOLD_TTL_MINUTES")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .expect("RESERVATION_HOLD_TTL_MINUTES must be a valid number"),
                sweep_interval_seconds: env::var("RESERVATION_SWEEP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("RESERVATION_SWEEP_INTERVAL_SECONDS must be a valid number"),
            },
        }
    }
}
