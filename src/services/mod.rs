pub mod deadline;
pub mod gate;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod sharing;
pub mod storage;
pub mod token;
pub mod worker;
