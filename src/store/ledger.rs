//! Write paths shared by every [`Storage`] backend.
//!
//! Each function expects to run inside an open [`Transaction`] and leaves
//! committing to the caller, so a failure anywhere discards every statement
//! issued before it.
//!
//! [`Storage`]: super::Storage

use itertools::Itertools as _;
use time::OffsetDateTime;
use tracing::info;

use super::{Error, Transaction};
use crate::{
    api::{
        datetime::calendar_day,
        ticket::{DateMatch, PaymentUpdate, Registered, Registration},
    },
    db::{
        ticket::{self, EventKey, NewTicket},
        user_ticket::{Claim, DuplicateIds, NewUserTicket},
    },
};

/// Finds the ticket for the event day, inserting it when absent.
///
/// A ticket inserted by a concurrent transaction after the lookup is picked
/// up by reading again once our insert backs off.
pub async fn resolve_ticket<T: Transaction>(
    tx: &mut T,
    ticket: &NewTicket<'_>,
) -> Result<ticket::Id, Error> {
    let event = &ticket.event;
    if let Some(id) = tx.find_ticket(event, DateMatch::CalendarDay).await? {
        info!(ticket_id = %id, "found existing ticket");
        return Ok(id);
    }

    if let Some(id) = tx.insert_ticket(ticket).await? {
        info!(ticket_id = %id, "inserted new ticket");
        return Ok(id);
    }

    tx.find_ticket(event, DateMatch::CalendarDay)
        .await?
        .ok_or_else(|| Error::Conflict(event.name.to_owned()))
}

/// Claims `user_id` already holds on the calendar day of `event_date`.
pub async fn find_duplicates<T: Transaction>(
    tx: &mut T,
    user_id: &str,
    event_date: OffsetDateTime,
) -> Result<Vec<Claim>, Error> {
    tx.same_day_claims(user_id, calendar_day(event_date)).await
}

pub async fn register<T: Transaction>(
    tx: &mut T,
    registration: &Registration,
    now: OffsetDateTime,
) -> Result<Registered, Error> {
    // Concurrent registrations of one user must see each other's claims.
    tx.lock_user(&registration.user_id).await?;

    let ticket_id = resolve_ticket(
        tx,
        &NewTicket {
            ticket_service: &registration.ticket_service,
            event: EventKey {
                name: &registration.event_name,
                date: registration.event_date,
                place: &registration.event_place,
            },
            ticket_regist_date: registration
                .ticket_regist_date
                .unwrap_or(now),
        },
    )
    .await?;

    // Must run before the insert, so the new claim never sees itself.
    let existing =
        find_duplicates(tx, &registration.user_id, registration.event_date)
            .await?;
    let duplicates = existing
        .iter()
        .map(|claim| claim.ticket_id)
        .collect::<DuplicateIds>();

    let user_ticket_id = tx
        .insert_user_ticket(&NewUserTicket {
            user_id: &registration.user_id,
            ticket_id,
            ticket_count: registration.ticket_count,
            is_reserve: registration.is_reserve,
            pay_limit_date: registration.pay_limit_date,
            is_paid: registration.is_paid,
            duplicate_ticket_id: duplicates.clone(),
        })
        .await?;
    info!(
        user_id = %registration.user_id,
        %ticket_id,
        %user_ticket_id,
        is_duplicate = !duplicates.is_empty(),
        "inserted user ticket",
    );

    if !existing.is_empty() {
        info!(duplicate_ticket_ids = %duplicates, "found duplicate tickets");
        flag_group(tx, &existing, Some(ticket_id)).await?;
    }

    Ok(Registered {
        ticket_id,
        user_ticket_id,
        duplicates,
    })
}

pub async fn mark_paid<T: Transaction>(
    tx: &mut T,
    update: &PaymentUpdate,
) -> Result<(), Error> {
    let event = EventKey {
        name: &update.event_name,
        date: update.event_date,
        place: &update.event_place,
    };
    let ticket_id = tx
        .find_ticket(&event, update.date_match)
        .await?
        .ok_or(Error::NotFound("event"))?;

    let updated = tx
        .set_paid(&update.user_id, ticket_id, update.is_paid)
        .await?;
    if updated == 0 {
        return Err(Error::NotFound("user ticket"));
    }
    info!(
        user_id = %update.user_id,
        %ticket_id,
        is_paid = update.is_paid,
        "updated payment status",
    );
    Ok(())
}

/// Flags every paid claim of `user_id` sharing its event day with another
/// paid claim. Returns the number of claims flagged.
pub async fn mark_duplicate_tickets<T: Transaction>(
    tx: &mut T,
    user_id: &str,
) -> Result<usize, Error> {
    tx.lock_user(user_id).await?;
    let groups = tx
        .paid_claims(user_id)
        .await?
        .into_iter()
        .into_group_map_by(|claim| calendar_day(claim.event_date));

    let mut flagged = 0;
    for group in groups.values().filter(|group| group.len() > 1) {
        flag_group(tx, group, None).await?;
        flagged += group.len();
    }
    info!(%user_id, flagged, "marked duplicate tickets");
    Ok(flagged)
}

/// Makes every claim in `group` list the tickets of all the other claims,
/// plus `newcomer`, on top of what it listed before.
async fn flag_group<T: Transaction>(
    tx: &mut T,
    group: &[Claim],
    newcomer: Option<ticket::Id>,
) -> Result<(), Error> {
    for claim in group {
        let duplicates = claim.duplicates.merged(
            group
                .iter()
                .filter(|other| other.id != claim.id)
                .map(|other| other.ticket_id)
                .chain(newcomer),
        );
        tx.set_duplicates(claim.id, &duplicates).await?;
    }
    Ok(())
}
