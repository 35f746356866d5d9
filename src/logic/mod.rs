pub mod manager;
pub mod migrate;
pub mod validate;
pub mod version_control;

pub use manager::{FieldChanges, LockRegistry, SchemaManager};
pub use migrate::{
    AdditionImpact, ImpactAnalyzer, MigrationGenerator, MigrationScript, RemovalImpact, RiskLevel,
    TypeChangeImpact,
};
pub use validate::{ValidationEngine, ValidationReport, ValueError};
pub use version_control::{RollbackOutcome, SchemaVersionControl};
