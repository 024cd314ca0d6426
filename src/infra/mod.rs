pub mod archive;
pub mod error;
pub mod http;
pub mod renderer;
pub mod resolver;
pub mod staging;
pub mod telemetry;
pub mod workspace;
