pub mod coordinator;
pub mod functions;
pub mod worker;
