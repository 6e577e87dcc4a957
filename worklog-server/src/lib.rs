pub mod attendance;
pub mod jobs;
pub mod notify;
pub mod server;
pub mod storage;
