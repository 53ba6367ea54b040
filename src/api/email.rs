use serde::{Deserialize, Serialize};

/// Message accepted by the relay and passed downstream verbatim.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// HTML body.
    pub body: String,
}
