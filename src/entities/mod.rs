//! SeaORM entities for the three collections. Rows are converted into the
//! types in [`crate::model`] before anything else sees them.

pub mod store;
pub mod table;
pub mod waitlist;
