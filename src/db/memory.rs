//! In-process [`Storage`] backend.
//!
//! Transactions hold the store lock for their whole lifetime and work on a
//! staged copy of the tables, which replaces the committed one only on
//! [`Transaction::commit`]. Dropping a transaction discards its writes.
//! The checks PostgreSQL enforces through `schema.sql` are mirrored here.

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::{Mutex, MutexGuard};

use super::{
    ticket::{self, EventKey, NewTicket, Ticket},
    user_ticket::{self, Claim, DuplicateIds, NewUserTicket, UserTicket},
    vendor::Vendor,
};
use crate::{
    api::{
        datetime::calendar_day,
        ticket::{
            DateMatch, Holding, PaymentUpdate, Registered, Registration,
            VendorRecord,
        },
    },
    store::{self, ledger, Error, Storage},
};

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    tickets: Vec<Ticket>,
    user_tickets: Vec<UserTicket>,
    vendor_records: Vec<(Vendor, VendorRecord)>,
}

impl Tables {
    fn ticket(&self, id: ticket::Id) -> Option<&Ticket> {
        self.tickets.iter().find(|ticket| ticket.id == id)
    }

    fn holdings<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = (&'a UserTicket, &'a Ticket)> + 'a {
        self.user_tickets
            .iter()
            .filter(move |ut| ut.user_id == user_id)
            .filter_map(move |ut| self.ticket(ut.ticket_id).map(|t| (ut, t)))
    }

    fn claims<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = Claim> + 'a {
        self.holdings(user_id).map(|(ut, t)| Claim {
            id: ut.id,
            ticket_id: ut.ticket_id,
            event_date: t.event_date,
            duplicates: ut.duplicate_ticket_id.clone(),
        })
    }
}

fn holding(user_ticket: &UserTicket, ticket: &Ticket) -> Holding {
    Holding {
        user_id: user_ticket.user_id.clone(),
        event_name: ticket.event_name.clone(),
        event_date: ticket.event_date,
        ticket_count: user_ticket.ticket_count,
    }
}

fn sorted(mut holdings: Vec<(&UserTicket, &Ticket)>) -> Vec<Holding> {
    holdings.sort_by_key(|(ut, t)| (t.event_date, ut.id));
    holdings.into_iter().map(|(ut, t)| holding(ut, t)).collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self) -> Transaction<'_> {
        let committed = self.tables.lock().await;
        let staged = committed.clone();
        Transaction { committed, staged }
    }

    pub async fn tickets(&self) -> Vec<Ticket> {
        self.tables.lock().await.tickets.clone()
    }

    pub async fn user_tickets(&self) -> Vec<UserTicket> {
        self.tables.lock().await.user_tickets.clone()
    }

    pub async fn vendor_records(&self, vendor: Vendor) -> Vec<VendorRecord> {
        self.tables
            .lock()
            .await
            .vendor_records
            .iter()
            .filter(|(v, _)| *v == vendor)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn register(
        &self,
        registration: &Registration,
    ) -> Result<Registered, Error> {
        let mut tx = self.begin().await;
        let registered =
            ledger::register(&mut tx, registration, OffsetDateTime::now_utc())
                .await?;
        tx.commit();
        Ok(registered)
    }

    async fn mark_paid(&self, update: &PaymentUpdate) -> Result<(), Error> {
        let mut tx = self.begin().await;
        ledger::mark_paid(&mut tx, update).await?;
        tx.commit();
        Ok(())
    }

    async fn fetch_user_tickets(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<Holding>, Error> {
        let tables = self.tables.lock().await;
        Ok(sorted(
            tables
                .holdings(user_id)
                .filter(|(ut, _)| {
                    ut.is_paid || ut.pay_limit_date.map_or(true, |at| at > now)
                })
                .collect(),
        ))
    }

    async fn fetch_overlapping_tickets(
        &self,
        user_id: &str,
    ) -> Result<Vec<Holding>, Error> {
        let tables = self.tables.lock().await;
        let days = tables
            .holdings(user_id)
            .map(|(_, t)| calendar_day(t.event_date))
            .collect::<Vec<Date>>();
        let shared = |day: Date| days.iter().filter(|d| **d == day).count() > 1;
        Ok(sorted(
            tables
                .holdings(user_id)
                .filter(|(_, t)| shared(calendar_day(t.event_date)))
                .collect(),
        ))
    }

    async fn mark_duplicate_tickets(
        &self,
        user_id: &str,
    ) -> Result<usize, Error> {
        let mut tx = self.begin().await;
        let flagged = ledger::mark_duplicate_tickets(&mut tx, user_id).await?;
        tx.commit();
        Ok(flagged)
    }

    async fn record_vendor_ticket(
        &self,
        vendor: Vendor,
        record: &VendorRecord,
    ) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;
        tables.vendor_records.push((vendor, record.clone()));
        Ok(())
    }
}

/// Exclusive transaction over a [`MemoryStore`].
pub struct Transaction<'a> {
    committed: MutexGuard<'a, Tables>,
    staged: Tables,
}

impl Transaction<'_> {
    pub fn commit(self) {
        let Self {
            mut committed,
            staged,
        } = self;
        *committed = staged;
    }
}

fn same_event(
    ticket: &Ticket,
    event: &EventKey<'_>,
    date_match: DateMatch,
) -> bool {
    ticket.event_name == event.name
        && ticket.event_place == event.place
        && match date_match {
            DateMatch::CalendarDay => {
                calendar_day(ticket.event_date) == calendar_day(event.date)
            }
            DateMatch::Exact => ticket.event_date == event.date,
        }
}

#[async_trait]
impl<'a> store::Transaction for Transaction<'a> {
    // Already exclusive over the whole store.
    async fn lock_user(&mut self, _user_id: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn find_ticket(
        &mut self,
        event: &EventKey<'_>,
        date_match: DateMatch,
    ) -> Result<Option<ticket::Id>, Error> {
        Ok(self
            .staged
            .tickets
            .iter()
            .find(|t| same_event(t, event, date_match))
            .map(|t| t.id))
    }

    async fn insert_ticket(
        &mut self,
        new: &NewTicket<'_>,
    ) -> Result<Option<ticket::Id>, Error> {
        let tickets = &mut self.staged.tickets;
        if tickets
            .iter()
            .any(|t| same_event(t, &new.event, DateMatch::CalendarDay))
        {
            return Ok(None);
        }

        let id = ticket::Id::from(tickets.len() as i64 + 1);
        tickets.push(Ticket {
            id,
            ticket_service: new.ticket_service.to_owned(),
            event_name: new.event.name.to_owned(),
            event_date: new.event.date,
            event_place: new.event.place.to_owned(),
            ticket_regist_date: new.ticket_regist_date,
        });
        Ok(Some(id))
    }

    async fn same_day_claims(
        &mut self,
        user_id: &str,
        day: Date,
    ) -> Result<Vec<Claim>, Error> {
        Ok(self
            .staged
            .claims(user_id)
            .filter(|claim| calendar_day(claim.event_date) == day)
            .collect())
    }

    async fn paid_claims(&mut self, user_id: &str) -> Result<Vec<Claim>, Error> {
        let staged = &self.staged;
        Ok(staged
            .claims(user_id)
            .filter(|claim| {
                staged
                    .user_tickets
                    .iter()
                    .any(|ut| ut.id == claim.id && ut.is_paid)
            })
            .collect())
    }

    async fn insert_user_ticket(
        &mut self,
        new: &NewUserTicket<'_>,
    ) -> Result<user_ticket::Id, Error> {
        if new.ticket_count <= 0 {
            return Err(Error::Constraint("ticket_count must be positive"));
        }
        if self.staged.ticket(new.ticket_id).is_none() {
            return Err(Error::Constraint("ticket_id must reference a ticket"));
        }

        let user_tickets = &mut self.staged.user_tickets;
        let id = user_ticket::Id::from(user_tickets.len() as i64 + 1);
        user_tickets.push(UserTicket {
            id,
            user_id: new.user_id.to_owned(),
            ticket_id: new.ticket_id,
            ticket_count: new.ticket_count,
            is_reserve: new.is_reserve,
            pay_limit_date: new.pay_limit_date,
            is_paid: new.is_paid,
            is_duplicate: !new.duplicate_ticket_id.is_empty(),
            duplicate_ticket_id: new.duplicate_ticket_id.clone(),
        });
        Ok(id)
    }

    async fn set_duplicates(
        &mut self,
        id: user_ticket::Id,
        duplicates: &DuplicateIds,
    ) -> Result<(), Error> {
        if let Some(ut) =
            self.staged.user_tickets.iter_mut().find(|ut| ut.id == id)
        {
            ut.duplicate_ticket_id = duplicates.clone();
            ut.is_duplicate = true;
        }
        Ok(())
    }

    async fn set_paid(
        &mut self,
        user_id: &str,
        ticket_id: ticket::Id,
        is_paid: bool,
    ) -> Result<u64, Error> {
        let mut updated = 0;
        for ut in self.staged.user_tickets.iter_mut().filter(|ut| {
            ut.user_id == user_id && ut.ticket_id == ticket_id
        }) {
            ut.is_paid = is_paid;
            updated += 1;
        }
        Ok(updated)
    }
}
