pub mod classifier;
pub mod translation;

// Re-export commonly used services
pub use classifier::{Classifier, ClassifierLoader, ClassifierProvider};
pub use translation::{TranslationGateway, Translator};
