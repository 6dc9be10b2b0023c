pub mod database;
pub mod generator;
pub mod memory;

pub use database::{Database, SaveUnit};
pub use generator::{
    SequentialValueGenerator, StandardValueGenerator, UuidValueGenerator, ValueGenerator,
};
pub use memory::MemoryStore;
