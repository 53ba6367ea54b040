//! Storage capability handed to the HTTP handlers.
//!
//! [`Storage`] is what handlers see. [`Transaction`] is the set of statements
//! the write paths are composed of; the algorithms in [`ledger`] are written
//! once against it and every backend runs them inside its own transaction.

pub mod ledger;

use async_trait::async_trait;
use derive_more::{Display, From};
use time::{Date, OffsetDateTime};

use crate::{
    api::ticket::{
        DateMatch, Holding, PaymentUpdate, Registered, Registration,
        VendorRecord,
    },
    db::{
        ticket::{self, EventKey, NewTicket},
        user_ticket::{self, Claim, DuplicateIds, NewUserTicket},
        vendor::Vendor,
    },
};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Registers a user's ticket, flagging same-day claims as duplicates.
    async fn register(
        &self,
        registration: &Registration,
    ) -> Result<Registered, Error>;

    async fn mark_paid(&self, update: &PaymentUpdate) -> Result<(), Error>;

    /// Paid claims, and unpaid ones whose pay limit is still ahead of `now`.
    async fn fetch_user_tickets(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<Holding>, Error>;

    /// Claims sharing their event day with another claim of the same user.
    async fn fetch_overlapping_tickets(
        &self,
        user_id: &str,
    ) -> Result<Vec<Holding>, Error>;

    /// Returns the number of claims flagged.
    async fn mark_duplicate_tickets(&self, user_id: &str)
        -> Result<usize, Error>;

    async fn record_vendor_ticket(
        &self,
        vendor: Vendor,
        record: &VendorRecord,
    ) -> Result<(), Error>;
}

/// Statements run inside one open transaction.
///
/// Every statement observes the uncommitted writes of the ones before it.
#[async_trait]
pub trait Transaction: Send {
    /// Serialises this transaction against every other one holding the lock
    /// for `user_id`, until commit or rollback.
    async fn lock_user(&mut self, user_id: &str) -> Result<(), Error>;

    async fn find_ticket(
        &mut self,
        event: &EventKey<'_>,
        date_match: DateMatch,
    ) -> Result<Option<ticket::Id>, Error>;

    /// Returns [`None`] when a ticket for the same event day already exists.
    async fn insert_ticket(
        &mut self,
        ticket: &NewTicket<'_>,
    ) -> Result<Option<ticket::Id>, Error>;

    /// Claims of `user_id` whose ticket falls on `day`.
    async fn same_day_claims(
        &mut self,
        user_id: &str,
        day: Date,
    ) -> Result<Vec<Claim>, Error>;

    async fn paid_claims(&mut self, user_id: &str) -> Result<Vec<Claim>, Error>;

    async fn insert_user_ticket(
        &mut self,
        user_ticket: &NewUserTicket<'_>,
    ) -> Result<user_ticket::Id, Error>;

    /// Sets the duplicate list of a claim and flags it.
    async fn set_duplicates(
        &mut self,
        id: user_ticket::Id,
        duplicates: &DuplicateIds,
    ) -> Result<(), Error>;

    /// Returns the number of claims updated.
    async fn set_paid(
        &mut self,
        user_id: &str,
        ticket_id: ticket::Id,
        is_paid: bool,
    ) -> Result<u64, Error>;
}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("{_0} not found")]
    NotFound(&'static str),
    #[display("{}", describe_postgres(_0))]
    #[from]
    Postgres(tokio_postgres::Error),
    #[display("{_0}")]
    #[from]
    Pool(bb8::RunError<tokio_postgres::Error>),
    #[display("constraint violated: {_0}")]
    Constraint(&'static str),
    #[display("ticket for {_0} was inserted concurrently but is not visible")]
    Conflict(String),
}

impl std::error::Error for Error {}

/// `tokio_postgres::Error` alone only reads "db error".
fn describe_postgres(e: &tokio_postgres::Error) -> String {
    if let Some(db) = e.as_db_error() {
        let mut msg = format!("{}: {}", db.severity(), db.message());
        if let Some(detail) = db.detail() {
            msg = format!("{msg} ({detail})");
        }
        if let Some(constraint) = db.constraint() {
            msg = format!("{msg} [constraint {constraint}]");
        }
        return msg;
    }
    match std::error::Error::source(e) {
        Some(source) => format!("{e}: {source}"),
        None => e.to_string(),
    }
}
