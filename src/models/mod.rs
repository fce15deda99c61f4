pub mod enums;
pub mod events;
pub mod insights;
pub mod twin;
pub mod update;
pub mod visualization;

pub use enums::*;
pub use events::*;
pub use insights::*;
pub use twin::*;
pub use update::*;
pub use visualization::*;
