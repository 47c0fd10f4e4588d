pub mod error;
pub mod graphql;
pub mod model;
pub mod source;

pub use error::SourceError;
pub use graphql::GraphQlSource;
pub use model::{CrawlRecord, CrawlRecordRef, CrawlScope, LinkRef, Page};
pub use source::{DataSource, StaticSource};
