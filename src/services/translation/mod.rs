pub mod gateway;

pub use gateway::{TranslationGateway, Translator};
