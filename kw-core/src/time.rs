// Durations in config files are written in humantime format ("30m", "250ms", "1h 30m")
pub mod humantime_duration {
    use std::time::Duration;

    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
