pub mod generate;
pub mod history;
pub mod progress;
pub mod voices;
