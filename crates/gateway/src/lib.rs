pub mod actions;
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod cors;
pub mod delivery;
pub mod dispatch;
pub mod state;
