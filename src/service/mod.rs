//! Services built on the repository and the migration engine

pub mod collection;
pub mod record;
pub mod validator;

pub use collection::CollectionService;
pub use record::RecordService;
pub use validator::validate_record;
