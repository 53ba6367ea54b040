use std::{error::Error as StdError, num::ParseIntError, str::FromStr};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::types::{
    accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql, Type,
};

/// One occurrence of an event at a place and date.
///
/// At most one row exists per event name, place and UTC calendar day.
#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub ticket_service: String,
    pub event_name: String,
    pub event_date: OffsetDateTime,
    pub event_place: String,
    pub ticket_regist_date: OffsetDateTime,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Id(i64);

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for Id {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

/// Attributes identifying an event occurrence.
#[derive(Clone, Copy, Debug)]
pub struct EventKey<'a> {
    pub name: &'a str,
    pub date: OffsetDateTime,
    pub place: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct NewTicket<'a> {
    pub ticket_service: &'a str,
    pub event: EventKey<'a>,
    pub ticket_regist_date: OffsetDateTime,
}
