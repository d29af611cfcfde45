//! Domain model, persistence seams and application plumbing.

pub mod config;
pub mod error;
pub mod log;
pub mod model;
pub mod price;
pub mod repository;

pub use error::{DocumentKind, ParseError, PipelineError, StoreError, TrendError};
pub use model::{Currency, CurrencyPrice, PriceTable, TableLabel};
pub use price::HistoryRange;
pub use repository::{ChangeSet, PersistenceGateway, UnitOfWork, WriteMode};
