//! Source, transform and sink actions.
//!
//! Each adapter wraps one external collaborator (a process, a file format,
//! a web page, a database) behind the [`Action`](crate::stages::Action)
//! trait and reports failures as a single classified
//! [`ActionError`](crate::errors::ActionError).

mod command;
mod config;
mod currency;
mod delimited;
mod fixed_width;
mod flatfile;
mod html;
mod sqlite;
mod transform;

pub use command::ShellCommand;
pub use config::ActionConfig;
pub use currency::{CurrencyConversion, CODE_PLACEHOLDER, DEFAULT_FIELD_PATTERN};
pub use delimited::DelimitedExtract;
pub use fixed_width::{FixedColumn, FixedWidthExtract};
pub use flatfile::{parse_csv, read_csv, write_csv, CsvFileLoad};
pub(crate) use html::fetch_url;
pub use html::{HtmlColumn, HtmlSource, HtmlTableExtract};
pub use sqlite::{render_table, SqlQuery, SqliteLoad, SqliteStore};
pub use transform::{PasteColumns, StripCarriageReturns, UppercaseField};
