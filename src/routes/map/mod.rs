mod handler;
mod model;

pub use handler::{list_markers, recenter, update_radius};
pub use model::{RadiusResponse, UpdateRadiusRequest};
