pub mod gallery;
pub mod job;
pub mod photo;
pub mod sharing;
