pub mod nsec3;
pub mod types;
