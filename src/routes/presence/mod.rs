mod handler;
mod model;

pub use handler::{
    find_peer_card,
    find_peers,
    get_status,
    report_location,
    report_location_error,
    retry_location,
    update_profile,
    update_visibility,
};
pub use model::{LocationErrorKind, LocationErrorRequest, ReportLocationRequest};
