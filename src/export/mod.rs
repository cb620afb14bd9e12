pub mod metadata;
pub mod naming;
pub mod session;
pub mod uid;
