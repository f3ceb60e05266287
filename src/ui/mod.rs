pub mod format;
pub mod scroll;
pub mod state;

pub use scroll::ScrollAnchor;
pub use state::{ChatViewState, OpenLatch};
