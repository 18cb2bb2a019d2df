pub mod keyboard_input;

mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use orchestrator::EvalcamApp;
pub use startup::render_summary_text;
pub use types::{RunMode, ShutdownReason};
