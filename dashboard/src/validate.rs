use crate::errors::{Error, Result};
use crate::model::LatestReading;
use chrono::{NaiveDate, NaiveTime};

const TEMP_MIN: f64 = -50.0;
const TEMP_MAX: f64 = 100.0;
const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;
const LIGHT_MIN: f64 = 0.0;
const WIND_MIN: f64 = 0.0;

pub const PAGE_SIZES: [u32; 4] = [5, 10, 15, 20];

/// Validates a latest-reading payload. Missing quantities are fine.
pub fn validate(reading: &LatestReading) -> Result<()> {
    if let Some(temperature) = reading.temperature {
        if !(TEMP_MIN..=TEMP_MAX).contains(&temperature) {
            return Err(Error::Validation(format!(
                "Temperature {} out of range [{}, {}]",
                temperature, TEMP_MIN, TEMP_MAX
            )));
        }
    }

    if let Some(humidity) = reading.humidity {
        if !(HUMIDITY_MIN..=HUMIDITY_MAX).contains(&humidity) {
            return Err(Error::Validation(format!(
                "Humidity {} out of range [{}, {}]",
                humidity, HUMIDITY_MIN, HUMIDITY_MAX
            )));
        }
    }

    if let Some(light) = reading.light {
        if light < LIGHT_MIN {
            return Err(Error::Validation(format!("Light {} is negative", light)));
        }
    }

    if let Some(wind) = reading.wind {
        if wind < WIND_MIN {
            return Err(Error::Validation(format!("Wind {} is negative", wind)));
        }
    }

    Ok(())
}

pub fn validate_page_size(size: u32) -> Result<()> {
    if PAGE_SIZES.contains(&size) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Page size {} not one of {:?}",
            size, PAGE_SIZES
        )))
    }
}

/// Checks a filter value against the format the server parses for `field`.
///
/// `timestamp` takes a calendar day (`2024-10-01`) or a time of day
/// (`14:05`); every other numeric column takes an integer.
pub fn validate_filter(field: &str, value: &str) -> Result<()> {
    match field {
        "timestamp" => {
            let is_date = value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();
            let is_time = value.len() == 5 && NaiveTime::parse_from_str(value, "%H:%M").is_ok();
            if is_date || is_time {
                Ok(())
            } else {
                Err(Error::Validation(format!(
                    "Timestamp filter {:?} must be YYYY-MM-DD or HH:MM",
                    value
                )))
            }
        }
        "temperature" | "humidity" | "light" | "wind" => value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| Error::Validation(format!("Filter {} needs an integer, got {:?}", field, value))),
        "active" => match value {
            "on" | "off" => Ok(()),
            _ => Err(Error::Validation(format!("Filter active must be on or off, got {:?}", value))),
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> LatestReading {
        LatestReading {
            temperature: Some(25.0),
            humidity: Some(60.0),
            light: Some(400.0),
            wind: Some(12.0),
        }
    }

    #[test]
    fn test_valid_reading() {
        assert!(validate(&reading()).is_ok());
    }

    #[test]
    fn test_missing_values_are_valid() {
        let reading = LatestReading {
            temperature: None,
            humidity: None,
            light: None,
            wind: None,
        };
        assert!(validate(&reading).is_ok());
    }

    #[test]
    fn test_invalid_temperature() {
        let reading = LatestReading {
            temperature: Some(150.0), // Out of range
            ..reading()
        };
        assert!(validate(&reading).is_err());
    }

    #[test]
    fn test_invalid_humidity() {
        let reading = LatestReading {
            humidity: Some(-3.0),
            ..reading()
        };
        assert!(validate(&reading).is_err());
    }

    #[test]
    fn test_negative_wind() {
        let reading = LatestReading {
            wind: Some(-1.0),
            ..reading()
        };
        assert!(validate(&reading).is_err());
    }

    #[test]
    fn test_page_sizes() {
        assert!(validate_page_size(15).is_ok());
        assert!(validate_page_size(0).is_err());
        assert!(validate_page_size(12).is_err());
    }

    #[test]
    fn test_timestamp_filter_formats() {
        assert!(validate_filter("timestamp", "2024-10-01").is_ok());
        assert!(validate_filter("timestamp", "14:05").is_ok());
        assert!(validate_filter("timestamp", "2024-10").is_err());
        assert!(validate_filter("timestamp", "25:00").is_err());
    }

    #[test]
    fn test_numeric_filter() {
        assert!(validate_filter("temperature", "25").is_ok());
        assert!(validate_filter("temperature", "2").is_ok());
        assert!(validate_filter("humidity", "sixty").is_err());
    }

    #[test]
    fn test_free_text_filter() {
        assert!(validate_filter("deviceName", "fan").is_ok());
        assert!(validate_filter("active", "on").is_ok());
        assert!(validate_filter("active", "maybe").is_err());
    }
}
