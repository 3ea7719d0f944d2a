//! Timestamp helpers for snapshots and console output.
use chrono::{DateTime, Local};
use serde::{self, Deserialize, Deserializer, Serializer};
use std::time::{Duration, SystemTime};

/// Serializes a `SystemTime` to an RFC 3339 string.
pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let datetime: DateTime<Local> = (*time).into();
    serializer.serialize_str(&datetime.to_rfc3339())
}

/// Deserializes an RFC 3339 string to a `SystemTime`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(SystemTime::from)
        .map_err(serde::de::Error::custom)
}

/// `Option<SystemTime>` as an optional RFC 3339 string.
pub mod option {
    use super::*;

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => {
                let datetime: DateTime<Local> = (*t).into();
                serializer.serialize_some(&datetime.to_rfc3339())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Temp(#[serde(with = "super")] SystemTime);

        let opt: Option<Temp> = Option::deserialize(deserializer)?;
        Ok(opt.map(|Temp(st)| st))
    }
}

/// Wall-clock prefix for console lines, e.g. `[14:03:27]`.
pub fn clock_prefix(time: SystemTime) -> String {
    let datetime: DateTime<Local> = time.into();
    datetime.format("[%H:%M:%S]").to_string()
}

/// Compact elapsed time, e.g. `4.2s` or `3m07s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Stamped {
        #[serde(with = "super::option", default)]
        at: Option<SystemTime>,
    }

    #[test]
    fn option_round_trips_to_the_second() {
        let now = SystemTime::now();
        let json = serde_json::to_string(&Stamped { at: Some(now) }).unwrap();
        let back: Stamped = serde_json::from_str(&json).unwrap();
        let delta = now
            .duration_since(back.at.unwrap())
            .unwrap_or_else(|e| e.duration());
        assert!(delta < Duration::from_secs(1));
    }

    #[test]
    fn missing_option_is_none() {
        let back: Stamped = serde_json::from_str("{}").unwrap();
        assert!(back.at.is_none());
    }

    #[test]
    fn clock_prefix_shape() {
        let prefix = clock_prefix(SystemTime::now());
        assert_eq!(prefix.len(), 10);
        assert!(prefix.starts_with('[') && prefix.ends_with(']'));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m07s");
    }
}
