pub mod attendance;
pub mod blog;
pub mod branch;
pub mod employee;
pub mod job;
pub mod lead;
pub mod student;
pub mod user;
