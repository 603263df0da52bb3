pub mod launch;
pub mod lifecycle;
pub mod poller;
