//! Terminal User Interface for the traffic console

mod app;
mod ui;

pub use app::{Command, TuiApp, TuiEvent};
pub use ui::draw;
