//! Customer domain model.

mod customers_model;

pub use customers_model::*;
