pub mod completion;
pub mod document_scope;
pub mod file_store;
pub mod registry;

pub use completion::OpenAiCompatibleCompletion;
pub use document_scope::DocumentScopedStore;
pub use file_store::FileStore;
pub use registry::JsonFileRegistry;
