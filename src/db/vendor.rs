use std::str::FromStr;

use derive_more::Display;

/// Ticket vendors whose raw notifications are logged, one table each.
///
/// Table names come only from this enumeration, never from request data.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Vendor {
    #[display("eplus")]
    Eplus,
    #[display("ltike")]
    LTike,
    #[display("pia")]
    Pia,
}

macro_rules! insert_into {
    ($table:literal) => {
        concat!(
            "INSERT INTO ",
            $table,
            " (ticket_service, regist_date, event_date, event_place, \
               event_name, ticket_count, is_reserve, pay_limit_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        )
    };
}

impl Vendor {
    pub const ALL: [Self; 3] = [Self::Eplus, Self::LTike, Self::Pia];

    pub fn table(self) -> &'static str {
        match self {
            Self::Eplus => "eplus_tickets",
            Self::LTike => "ltike_tickets",
            Self::Pia => "pia_tickets",
        }
    }

    pub(crate) fn insert_sql(self) -> &'static str {
        match self {
            Self::Eplus => insert_into!("eplus_tickets"),
            Self::LTike => insert_into!("ltike_tickets"),
            Self::Pia => insert_into!("pia_tickets"),
        }
    }
}

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("unknown ticket service `{_0}`")]
pub struct UnknownVendor(pub String);

impl std::error::Error for UnknownVendor {}

impl FromStr for Vendor {
    type Err = UnknownVendor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|vendor| s.eq_ignore_ascii_case(&vendor.to_string()))
            .ok_or_else(|| UnknownVendor(s.to_owned()))
    }
}
