extern crate chrono_tz;
extern crate dotenvy;

use crate::result;

pub const DEFAULT_FEED_URL: &str =
    "https://tfl.gov.uk/tfl/syndication/feeds/cycle-hire/livecyclehireupdates.xml";
pub const DEFAULT_TIMEZONE: &str = "Europe/London";

const DB_VAR: &str = "BIKEDASH_DB";
const FEED_URL_VAR: &str = "BIKEDASH_FEED_URL";
const TIMEZONE_VAR: &str = "BIKEDASH_TIMEZONE";

#[derive(Debug, Clone)]
pub struct Config {
    pub conn_str: String,
    pub feed_url: String,
    pub timezone: chrono_tz::Tz,
}

pub fn load_config() -> result::BikeDashResult<Config> {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {:?}", path),
        Err(_) => debug!("No .env file, using process environment"),
    }

    return config_from_lookup(|key| std::env::var(key).ok());
}

// Split out so tests don't have to mutate the process environment.
fn config_from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> result::BikeDashResult<Config> {
    let conn_str = lookup(DB_VAR)
        .filter(|v| !v.trim().is_empty())
        .ok_or(result::BikeDashError::ConfigError(
            format!("{} must be set to the readings database", DB_VAR)))?;

    let feed_url = lookup(FEED_URL_VAR).unwrap_or(DEFAULT_FEED_URL.to_string());
    let timezone = parse_timezone(
        &lookup(TIMEZONE_VAR).unwrap_or(DEFAULT_TIMEZONE.to_string()))?;

    return Ok(Config{
        conn_str: conn_str,
        feed_url: feed_url,
        timezone: timezone,
    });
}

pub fn parse_timezone(name: &str) -> result::BikeDashResult<chrono_tz::Tz> {
    return name.trim().parse::<chrono_tz::Tz>().map_err(|err| {
        result::BikeDashError::ConfigError(format!("Unknown timezone '{}': {}", name, err))
    });
}
