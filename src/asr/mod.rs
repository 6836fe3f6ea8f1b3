pub mod factory;
pub mod interface;
pub mod remote;
pub mod whisper_api;

pub use factory::TranscriberFactory;
pub use interface::{TranscriptionError, Transcriber};
