pub mod memory;
pub mod ticket;
pub mod user_ticket;
pub mod vendor;

use async_trait::async_trait;
use bb8_postgres::PostgresConnectionManager;
use time::{Date, OffsetDateTime};
use tokio_postgres::{NoTls, Row};

use crate::{
    api::{
        datetime::calendar_day,
        ticket::{
            DateMatch, Holding, PaymentUpdate, Registered, Registration,
            VendorRecord,
        },
    },
    config,
    store::{self, ledger, Error, Storage},
};

pub use self::{
    memory::MemoryStore, ticket::Ticket, user_ticket::UserTicket,
    vendor::Vendor,
};

use self::{
    ticket::{EventKey, NewTicket},
    user_ticket::{Claim, DuplicateIds, NewUserTicket},
};

pub type Pool = bb8::Pool<PostgresConnectionManager<NoTls>>;

pub async fn connect(
    db: &config::Db,
    pool: &config::Pool,
) -> Result<Client, tokio_postgres::Error> {
    let manager = PostgresConnectionManager::new(db.to_pg_config(), NoTls);
    bb8::Pool::builder()
        .max_size(pool.max_size)
        .connection_timeout(pool.connection_timeout)
        .build(manager)
        .await
        .map(Client)
}

/// PostgreSQL backed [`Storage`].
#[derive(Clone)]
pub struct Client(Pool);

impl Client {
    /// Checks that a connection can be established.
    pub async fn ping(&self) -> Result<(), Error> {
        self.0.get().await?.simple_query("SELECT 1").await?;
        Ok(())
    }
}

const HOLDING_COLUMNS: &str = "ut.user_id, t.event_name, t.event_date, \
                               ut.ticket_count";

fn holding(row: Row) -> Holding {
    Holding {
        user_id: row.get("user_id"),
        event_name: row.get("event_name"),
        event_date: row.get("event_date"),
        ticket_count: row.get("ticket_count"),
    }
}

#[async_trait]
impl Storage for Client {
    async fn register(
        &self,
        registration: &Registration,
    ) -> Result<Registered, Error> {
        let mut conn = self.0.get().await?;
        let mut tx = Transaction(conn.transaction().await?);
        let registered =
            ledger::register(&mut tx, registration, OffsetDateTime::now_utc())
                .await?;
        tx.0.commit().await?;
        Ok(registered)
    }

    async fn mark_paid(&self, update: &PaymentUpdate) -> Result<(), Error> {
        let mut conn = self.0.get().await?;
        let mut tx = Transaction(conn.transaction().await?);
        ledger::mark_paid(&mut tx, update).await?;
        tx.0.commit().await?;
        Ok(())
    }

    async fn fetch_user_tickets(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<Holding>, Error> {
        let sql = format!(
            "SELECT {HOLDING_COLUMNS} \
             FROM user_tickets ut \
             INNER JOIN tickets t ON ut.ticket_id = t.ticket_id \
             WHERE ut.user_id = $1 \
               AND (ut.is_paid \
                    OR ut.pay_limit_date IS NULL \
                    OR ut.pay_limit_date > $2) \
             ORDER BY t.event_date, ut.user_ticket_id"
        );
        Ok(self
            .0
            .get()
            .await?
            .query(&sql, &[&user_id, &now])
            .await?
            .into_iter()
            .map(holding)
            .collect())
    }

    async fn fetch_overlapping_tickets(
        &self,
        user_id: &str,
    ) -> Result<Vec<Holding>, Error> {
        let sql = format!(
            "SELECT {HOLDING_COLUMNS} \
             FROM user_tickets ut \
             INNER JOIN tickets t ON ut.ticket_id = t.ticket_id \
             WHERE ut.user_id = $1 \
               AND (t.event_date AT TIME ZONE 'UTC')::date IN ( \
                   SELECT (t2.event_date AT TIME ZONE 'UTC')::date \
                   FROM user_tickets ut2 \
                   INNER JOIN tickets t2 ON ut2.ticket_id = t2.ticket_id \
                   WHERE ut2.user_id = $1 \
                   GROUP BY 1 \
                   HAVING COUNT(*) > 1) \
             ORDER BY t.event_date, ut.user_ticket_id"
        );
        Ok(self
            .0
            .get()
            .await?
            .query(&sql, &[&user_id])
            .await?
            .into_iter()
            .map(holding)
            .collect())
    }

    async fn mark_duplicate_tickets(
        &self,
        user_id: &str,
    ) -> Result<usize, Error> {
        let mut conn = self.0.get().await?;
        let mut tx = Transaction(conn.transaction().await?);
        let flagged = ledger::mark_duplicate_tickets(&mut tx, user_id).await?;
        tx.0.commit().await?;
        Ok(flagged)
    }

    async fn record_vendor_ticket(
        &self,
        vendor: Vendor,
        record: &VendorRecord,
    ) -> Result<(), Error> {
        let mut conn = self.0.get().await?;
        let tx = conn.transaction().await?;
        tx.execute(
            vendor.insert_sql(),
            &[
                &record.ticket_service,
                &record.regist_date,
                &record.event_date,
                &record.event_place,
                &record.event_name,
                &record.ticket_count,
                &record.is_reserve,
                &record.pay_limit_date,
            ],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Open PostgreSQL transaction. Rolled back when dropped uncommitted.
struct Transaction<'a>(tokio_postgres::Transaction<'a>);

fn claim(row: Row) -> Claim {
    Claim {
        id: row.get("user_ticket_id"),
        ticket_id: row.get("ticket_id"),
        event_date: row.get("event_date"),
        duplicates: row.get("duplicate_ticket_id"),
    }
}

#[async_trait]
impl<'a> store::Transaction for Transaction<'a> {
    async fn lock_user(&mut self, user_id: &str) -> Result<(), Error> {
        // Released on commit or rollback. Hash collisions only serialise
        // unrelated users.
        const SQL: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";
        self.0.execute(SQL, &[&user_id]).await?;
        Ok(())
    }

    async fn find_ticket(
        &mut self,
        event: &EventKey<'_>,
        date_match: DateMatch,
    ) -> Result<Option<ticket::Id>, Error> {
        const BY_DAY: &str = "\
            SELECT ticket_id FROM tickets \
            WHERE event_name = $1 \
              AND (event_date AT TIME ZONE 'UTC')::date = $2 \
              AND event_place = $3 \
            LIMIT 1";
        const EXACT: &str = "\
            SELECT ticket_id FROM tickets \
            WHERE event_name = $1 \
              AND event_date = $2 \
              AND event_place = $3 \
            LIMIT 1";

        let row = match date_match {
            DateMatch::CalendarDay => {
                let day = calendar_day(event.date);
                self.0
                    .query_opt(BY_DAY, &[&event.name, &day, &event.place])
                    .await?
            }
            DateMatch::Exact => {
                self.0
                    .query_opt(EXACT, &[&event.name, &event.date, &event.place])
                    .await?
            }
        };
        Ok(row.map(|row| row.get("ticket_id")))
    }

    async fn insert_ticket(
        &mut self,
        ticket: &NewTicket<'_>,
    ) -> Result<Option<ticket::Id>, Error> {
        // Backs off on the unique event-day index instead of failing.
        const SQL: &str = "\
            INSERT INTO tickets (ticket_service, ticket_regist_date, \
                                 event_name, event_date, event_place) \
            VALUES ($1, $2, $3, $4, $5) \
            ON CONFLICT DO NOTHING \
            RETURNING ticket_id";
        Ok(self
            .0
            .query_opt(
                SQL,
                &[
                    &ticket.ticket_service,
                    &ticket.ticket_regist_date,
                    &ticket.event.name,
                    &ticket.event.date,
                    &ticket.event.place,
                ],
            )
            .await?
            .map(|row| row.get("ticket_id")))
    }

    async fn same_day_claims(
        &mut self,
        user_id: &str,
        day: Date,
    ) -> Result<Vec<Claim>, Error> {
        const SQL: &str = "\
            SELECT ut.user_ticket_id, ut.ticket_id, ut.duplicate_ticket_id, \
                   t.event_date \
            FROM user_tickets ut \
            INNER JOIN tickets t ON ut.ticket_id = t.ticket_id \
            WHERE ut.user_id = $1 \
              AND (t.event_date AT TIME ZONE 'UTC')::date = $2 \
            ORDER BY ut.user_ticket_id";
        Ok(self
            .0
            .query(SQL, &[&user_id, &day])
            .await?
            .into_iter()
            .map(claim)
            .collect())
    }

    async fn paid_claims(&mut self, user_id: &str) -> Result<Vec<Claim>, Error> {
        const SQL: &str = "\
            SELECT ut.user_ticket_id, ut.ticket_id, ut.duplicate_ticket_id, \
                   t.event_date \
            FROM user_tickets ut \
            INNER JOIN tickets t ON ut.ticket_id = t.ticket_id \
            WHERE ut.user_id = $1 AND ut.is_paid \
            ORDER BY ut.user_ticket_id";
        Ok(self
            .0
            .query(SQL, &[&user_id])
            .await?
            .into_iter()
            .map(claim)
            .collect())
    }

    async fn insert_user_ticket(
        &mut self,
        user_ticket: &NewUserTicket<'_>,
    ) -> Result<user_ticket::Id, Error> {
        const SQL: &str = "\
            INSERT INTO user_tickets (user_id, ticket_id, ticket_count, \
                                      is_reserve, pay_limit_date, is_paid, \
                                      duplicate_ticket_id, is_duplicate) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
            RETURNING user_ticket_id";
        let is_duplicate = !user_ticket.duplicate_ticket_id.is_empty();
        Ok(self
            .0
            .query_one(
                SQL,
                &[
                    &user_ticket.user_id,
                    &user_ticket.ticket_id,
                    &user_ticket.ticket_count,
                    &user_ticket.is_reserve,
                    &user_ticket.pay_limit_date,
                    &user_ticket.is_paid,
                    &user_ticket.duplicate_ticket_id,
                    &is_duplicate,
                ],
            )
            .await?
            .get("user_ticket_id"))
    }

    async fn set_duplicates(
        &mut self,
        id: user_ticket::Id,
        duplicates: &DuplicateIds,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            UPDATE user_tickets \
            SET duplicate_ticket_id = $2, is_duplicate = TRUE \
            WHERE user_ticket_id = $1";
        self.0.execute(SQL, &[&id, duplicates]).await?;
        Ok(())
    }

    async fn set_paid(
        &mut self,
        user_id: &str,
        ticket_id: ticket::Id,
        is_paid: bool,
    ) -> Result<u64, Error> {
        const SQL: &str = "\
            UPDATE user_tickets SET is_paid = $3 \
            WHERE user_id = $1 AND ticket_id = $2";
        Ok(self.0.execute(SQL, &[&user_id, &ticket_id, &is_paid]).await?)
    }
}
