use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::utils::ip_filter::AllowedNetwork;
use crate::utils::time_utils::parse_hh_mm;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Network restriction
    pub enable_ip_restriction: bool,
    pub allowed_ips: Vec<AllowedNetwork>,
    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only set behind a proxy that overwrites those headers.
    pub trust_proxy: bool,

    pub audit_queue_capacity: usize,

    pub policy: AttendancePolicy,
}

/// Office rules for attendance and leave, passed into the services at
/// construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendancePolicy {
    pub check_in_start_time: NaiveTime,
    pub late_threshold_minutes: i64,
    pub half_day_hours: Decimal,
    pub full_day_hours: Decimal,
    pub annual_paid_leaves: i32,
    /// Offset of the office's local calendar; "today" and the check-in
    /// threshold are evaluated in it.
    pub utc_offset: FixedOffset,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            check_in_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            late_threshold_minutes: 30,
            half_day_hours: Decimal::from(4),
            full_day_hours: Decimal::from(8),
            annual_paid_leaves: 7,
            utc_offset: FixedOffset::east_opt(330 * 60).unwrap_or(Utc.fix()),
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

impl AttendancePolicy {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let check_in_start_time = match env::var("CHECK_IN_START_TIME") {
            Ok(raw) => parse_hh_mm(&raw).context("CHECK_IN_START_TIME must be HH:MM")?,
            Err(_) => defaults.check_in_start_time,
        };

        let offset_minutes: i32 = parsed_or("UTC_OFFSET_MINUTES", 330)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        let policy = Self {
            check_in_start_time,
            late_threshold_minutes: parsed_or("LATE_THRESHOLD_MINUTES", defaults.late_threshold_minutes)?,
            half_day_hours: parsed_or("HALF_DAY_HOURS", defaults.half_day_hours)?,
            full_day_hours: parsed_or("FULL_DAY_HOURS", defaults.full_day_hours)?,
            annual_paid_leaves: parsed_or("ANNUAL_PAID_LEAVES", defaults.annual_paid_leaves)?,
            utc_offset,
        };

        if policy.half_day_hours > policy.full_day_hours {
            return Err(anyhow!(
                "HALF_DAY_HOURS ({}) cannot exceed FULL_DAY_HOURS ({})",
                policy.half_day_hours,
                policy.full_day_hours
            ));
        }

        Ok(policy)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let allowed_ips = env::var("ALLOWED_IPS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<AllowedNetwork>().map_err(|e| anyhow!("ALLOWED_IPS: {e}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 20)?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // default 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // default 7 days

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            enable_ip_restriction: parsed_or("ENABLE_IP_RESTRICTION", false)?,
            allowed_ips,
            trust_proxy: parsed_or("TRUST_PROXY", false)?,

            audit_queue_capacity: parsed_or("AUDIT_QUEUE_CAPACITY", 1024)?,

            policy: AttendancePolicy::from_env()?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://unused".into(),
            db_max_connections: 1,
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            enable_ip_restriction: false,
            allowed_ips: Vec::new(),
            trust_proxy: false,
            audit_queue_capacity: 8,
            policy: AttendancePolicy::default(),
        }
    }
}
