pub mod router;

pub use router::{AppState, pilot_router};
