pub mod app;
pub mod assets;
pub mod cli;
pub mod config;
pub mod interop;
pub mod scripts;
pub mod time;

pub use app::run;
pub use scripts::ScriptHost;
