//! Migration engine: file grammar, statement splitting, checksum-anchored
//! history, module collection.

pub mod engine;
pub mod file;
pub mod modules;
pub mod splitter;

pub use engine::{
    AppliedMigration, MigrateOptions, MigrationEngine, MigrationResult, MigrationStatus,
    VerifyReport, MIGRATIONS_TABLE,
};
pub use file::{MigrationFile, MigrationScope};
pub use modules::{ModuleDefinition, ModuleRegistry, MigrationSource};
pub use splitter::split_statements;
