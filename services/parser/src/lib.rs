//! Ingestion of Indian daily power-generation reports into a relational
//! store: daily generation spreadsheets, renewable reports and the state
//! demand backfill.

pub mod classify;
pub mod config;
pub mod daily;
pub mod demand;
pub mod error;
pub mod grid;
pub mod header;
pub mod identity;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod refdata;
pub mod renewable;
pub mod runner;
pub mod status;
pub mod store;
