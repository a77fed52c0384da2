pub mod memory;
pub mod seaorm;

pub use memory::MemoryDashboardStore;
pub use seaorm::SeaOrmDashboardStore;
