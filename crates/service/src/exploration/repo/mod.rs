pub mod memory;
pub mod seaorm;

pub use memory::MemoryExplorationStore;
pub use seaorm::SeaOrmExplorationStore;
