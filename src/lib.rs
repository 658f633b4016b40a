//! # visionq
//!
//! Crash-resumable batch driver for image analysis.
//!
//! Images in a source directory are enrolled into a SQLite work queue, sent
//! one at a time to the Google Cloud Vision API, and written out as one JSON
//! file per image. Progress lives in the queue, so an interrupted run picks
//! up exactly where it stopped.

pub mod analysis;
pub mod config;
pub mod decision;
pub mod engine;
pub mod enroll;
pub mod error;
pub mod event;
pub mod model;
pub mod output;
pub mod storage;
pub mod telemetry;
