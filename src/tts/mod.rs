pub mod factory;
pub mod interface;
pub mod remote;

pub use factory::SynthesizerFactory;
pub use interface::{SynthesisError, SynthesizedAudio, Synthesizer};
