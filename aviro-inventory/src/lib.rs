pub mod inventory;
pub mod memory;

pub use inventory::{RestoreReport, SeatError, SeatInventory};
pub use memory::MemorySeatMapStore;
