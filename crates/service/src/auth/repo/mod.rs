pub mod memory;
pub mod seaorm;

pub use memory::MemoryAuthStore;
pub use seaorm::SeaOrmAuthStore;
