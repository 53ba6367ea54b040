use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::datetime;

pub use crate::db::{
    ticket::Id,
    user_ticket::{DuplicateIds, Id as UserTicketId},
    vendor::Vendor,
};

/// Body of `POST /insert`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub ticket_service: String,
    pub event_name: String,
    #[serde(with = "datetime")]
    pub event_date: OffsetDateTime,
    pub event_place: String,
    /// Defaults to the time of registration.
    #[serde(default, with = "datetime::option")]
    pub ticket_regist_date: Option<OffsetDateTime>,
    pub ticket_count: i32,
    #[serde(default)]
    pub is_reserve: bool,
    #[serde(default, with = "datetime::option")]
    pub pay_limit_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_paid: bool,
    pub user_id: String,
}

/// How an event's date is matched against stored tickets.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum DateMatch {
    /// Same UTC calendar day, time of day ignored.
    #[default]
    CalendarDay,
    /// Identical instant.
    Exact,
}

/// Body of `POST /update`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub user_id: String,
    pub event_name: String,
    #[serde(with = "datetime")]
    pub event_date: OffsetDateTime,
    pub event_place: String,
    pub is_paid: bool,
    #[serde(default)]
    pub date_match: DateMatch,
}

/// One row of the user ticket listings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub user_id: String,
    pub event_name: String,
    #[serde(with = "datetime")]
    pub event_date: OffsetDateTime,
    pub ticket_count: i32,
}

/// Body of `POST /register`, a raw notification from a ticket vendor.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRecord {
    pub ticket_service: String,
    #[serde(with = "datetime")]
    pub regist_date: OffsetDateTime,
    #[serde(with = "datetime")]
    pub event_date: OffsetDateTime,
    pub event_place: String,
    pub event_name: String,
    pub ticket_count: i32,
    #[serde(default)]
    pub is_reserve: bool,
    #[serde(default, with = "datetime::option")]
    pub pay_limit_date: Option<OffsetDateTime>,
}

/// Outcome of a successful registration.
#[derive(Clone, Debug)]
pub struct Registered {
    pub ticket_id: Id,
    pub user_ticket_id: UserTicketId,
    pub duplicates: DuplicateIds,
}

impl Registered {
    pub fn is_duplicate(&self) -> bool {
        !self.duplicates.is_empty()
    }
}
