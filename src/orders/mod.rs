//! Order lifecycle: creation and checkout-group reconstruction

mod create;
mod grouping;

pub use create::{RegistrationEntry, RegistrationRequest, create_orders};
pub use grouping::{OrderGroup, group_orders};
