use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::models::location::GeoPoint;

const DEFAULT_API_BASE_URL: &str = "http://192.168.1.7:8000";
const DEFAULT_REALTIME_DB_URL: &str =
    "https://moyakristal-1a81e-default-rtdb.asia-southeast1.firebasedatabase.app";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub realtime_db_url: String,
    pub realtime_auth: Option<String>,
    pub session_file: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
    pub username: Option<String>,
    pub password: Option<String>,
    pub fixed_position: Option<GeoPoint>,
    pub proof_photo: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let latitude: Option<f64> = parse_optional("DRIVER_LATITUDE")?;
        let longitude: Option<f64> = parse_optional("DRIVER_LONGITUDE")?;
        let fixed_position = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)?),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "DRIVER_LATITUDE and DRIVER_LONGITUDE must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(parse_or_default("REQUEST_TIMEOUT_SECS", 20)?),
            poll_interval: Duration::from_secs(parse_or_default("POLL_INTERVAL_SECS", 15)?),
            realtime_db_url: env::var("REALTIME_DB_URL")
                .unwrap_or_else(|_| DEFAULT_REALTIME_DB_URL.to_string()),
            realtime_auth: env::var("REALTIME_AUTH").ok(),
            session_file: env::var("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("moya-session.json")),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            username: env::var("MOYA_USERNAME").ok(),
            password: env::var("MOYA_PASSWORD").ok(),
            fixed_position,
            proof_photo: env::var("PROOF_PHOTO").ok().filter(|p| !p.trim().is_empty()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_secs(15),
            realtime_db_url: DEFAULT_REALTIME_DB_URL.to_string(),
            realtime_auth: None,
            session_file: PathBuf::from("moya-session.json"),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            username: None,
            password: None,
            fixed_position: None,
            proof_photo: None,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Config(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
