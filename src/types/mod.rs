pub mod bundle;
pub mod resource;

pub use bundle::{Bundle, BundleEntry, BundleRequest, BundleType};
pub use resource::{resource_id, resource_key, resource_type};
