#[macro_use]
mod macros;

pub mod deployments;
pub mod frontend;
