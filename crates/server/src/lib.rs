pub mod deployment;
pub mod error;
pub mod routes;

pub use deployment::Deployment;
