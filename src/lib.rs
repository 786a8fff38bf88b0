pub mod api;
pub mod app;
pub mod community;
pub mod config;
pub mod entry_store;
pub mod insights;
pub mod journal_entry;
pub mod logging;
pub mod playback;
pub mod text_input;
pub mod ui;
pub mod voice;
pub mod voice_events;

#[cfg(test)]
mod test_support;
