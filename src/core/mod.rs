pub mod errors;
pub mod locks;
pub mod logging;
