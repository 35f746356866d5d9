pub mod catalog;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use catalog::{CatalogStats, SchemaCatalog};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::{
    AssetTypeStore, ChangeLogStore, FieldStore, FieldWrite, MutationStore, RecordStore,
    SchemaMutation, SchemaStore, Store, ValueStore, VersionStore,
};
