pub mod datetime;
pub mod email;
pub mod ticket;

pub use self::{email::Email, ticket::Registration};
