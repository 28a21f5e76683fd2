// src/lib.rs
pub mod detector;
pub mod extract;
pub mod geometry;
pub mod live;
pub mod overlay;
pub mod playback;
pub mod pose;
pub mod report;
pub mod rig;
pub mod session;
pub mod upload;
pub mod video;
