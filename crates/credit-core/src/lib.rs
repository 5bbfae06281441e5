pub mod align;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod util;
