//! Data models

pub mod inventory;
pub mod session;
pub mod snapshot;

pub use inventory::{monophone_of, InventoryPhase, PhoneInventory, PhoneInventoryView, ShortPause};
pub use session::{PipelineState, StageKind, StageRecord};
pub use snapshot::{ModelSnapshot, UnitBundle, UnitDefinition};
