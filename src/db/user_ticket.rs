use std::{
    collections::BTreeSet, error::Error as StdError, fmt, num::ParseIntError,
};

use derive_more::Display;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::types::{
    accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql, Type,
};

use super::ticket;

/// One user's claim on a [`ticket::Ticket`].
#[derive(Clone, Debug)]
pub struct UserTicket {
    pub id: Id,
    pub user_id: String,
    pub ticket_id: ticket::Id,
    pub ticket_count: i32,
    pub is_reserve: bool,
    pub pay_limit_date: Option<OffsetDateTime>,
    pub is_paid: bool,
    pub is_duplicate: bool,
    pub duplicate_ticket_id: DuplicateIds,
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

/// Ticket ids a claim collides with, stored as a comma-joined list.
///
/// Kept sorted and free of repeats, so `"3,1,3"` reads back as `"1,3"`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DuplicateIds(BTreeSet<ticket::Id>);

impl DuplicateIds {
    pub fn decode(raw: &str) -> Result<Self, ParseIntError> {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::parse::<ticket::Id>)
            .collect()
    }

    pub fn encode(&self) -> String {
        self.0.iter().join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: ticket::Id) -> bool {
        self.0.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ticket::Id> + '_ {
        self.0.iter().copied()
    }

    /// Union of `self` and `ids`.
    pub fn merged(&self, ids: impl IntoIterator<Item = ticket::Id>) -> Self {
        let mut merged = self.clone();
        merged.0.extend(ids);
        merged
    }
}

impl FromIterator<ticket::Id> for DuplicateIds {
    fn from_iter<I: IntoIterator<Item = ticket::Id>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for DuplicateIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromSql<'_> for DuplicateIds {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let raw = <&str>::from_sql(ty, raw)?;
        Ok(Self::decode(raw)?)
    }
}

impl ToSql for DuplicateIds {
    accepts!(TEXT);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.encode().to_sql(ty, out)
    }
}

#[derive(Clone, Debug)]
pub struct NewUserTicket<'a> {
    pub user_id: &'a str,
    pub ticket_id: ticket::Id,
    pub ticket_count: i32,
    pub is_reserve: bool,
    pub pay_limit_date: Option<OffsetDateTime>,
    pub is_paid: bool,
    pub duplicate_ticket_id: DuplicateIds,
}

/// Existing claim as seen by duplicate detection.
#[derive(Clone, Debug)]
pub struct Claim {
    pub id: Id,
    pub ticket_id: ticket::Id,
    pub event_date: OffsetDateTime,
    pub duplicates: DuplicateIds,
}
