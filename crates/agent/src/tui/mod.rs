//! Terminal User Interface
//!
//! Stands in for a menu-bar item: shows the camera status label, the
//! auto-mode checkbox and the tracked device, and keeps a log of the
//! notifications and alerts the controller raised.

pub mod app;
pub mod events;
pub mod ui;

pub use app::run;
