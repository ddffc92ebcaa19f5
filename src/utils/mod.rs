pub mod json;
pub mod params;
