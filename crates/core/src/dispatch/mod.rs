//! Inbound event routing: `/add`, `/zip`, `/cancel` and file attachments.

mod dispatcher;
mod types;

pub use dispatcher::Dispatcher;
pub use types::*;
