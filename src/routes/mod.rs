pub mod map;
pub mod presence;
