//! Background jobs for social-service

pub mod story_sweeper;
