//! Loading tabular data into polars `DataFrame`s.
//!
//! Two sources are supported, selected by `load_data.how`:
//! - **csv**: a delimited file read through polars' CSV reader
//! - **query**: a SQL statement (inline or from a file, with placeholder
//!   substitution) executed against PostgreSQL
//!
//! Persisting datasets and target vectors back to CSV lives here too.

pub mod db;
pub mod io;
pub mod source;
pub mod sql;

pub use db::{DbClient, DbSettings};
pub use io::{read_csv, save_df, save_series};
pub use source::{CsvSource, LoadDataConfig, LoadMethod, QuerySource, load_data};
pub use sql::{format_sql, load_sql};
