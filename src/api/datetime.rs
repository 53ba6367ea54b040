//! Serde helpers for timestamps on the wire.
//!
//! Timestamps are written as RFC 3339. On input a bare `YYYY-MM-DD` date is
//! accepted as well and taken as midnight UTC.

use serde::{de, ser, Deserialize, Deserializer, Serializer};
use time::{
    error::Parse, format_description::well_known::Rfc3339,
    macros::format_description, Date, OffsetDateTime, UtcOffset,
};

pub fn parse(raw: &str) -> Result<OffsetDateTime, Parse> {
    OffsetDateTime::parse(raw, &Rfc3339).or_else(|e| {
        Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map(|date| date.midnight().assume_utc())
            .map_err(|_| e)
    })
}

/// Calendar date used for every same-day comparison.
pub fn calendar_day(at: OffsetDateTime) -> Date {
    at.to_offset(UtcOffset::UTC).date()
}

pub fn serialize<S: Serializer>(
    at: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let formatted = at.format(&Rfc3339).map_err(ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}

pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<OffsetDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(de::Error::custom)
}

pub mod option {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(
        at: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => super::serialize(at, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .filter(|raw| !raw.is_empty())
            .map(|raw| super::parse(&raw).map_err(de::Error::custom))
            .transpose()
    }
}
