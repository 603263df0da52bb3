pub mod location;
pub mod order;
pub mod proof;
pub mod session;
