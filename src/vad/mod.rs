pub mod classifier;
pub mod factory;
pub mod segmenter;

pub use classifier::{ClassificationError, SpeechClassifier};
pub use factory::ClassifierFactory;
pub use segmenter::{SpeechSegment, VadSegmenter};
