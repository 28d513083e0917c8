pub mod context_generator;
pub mod export;
pub mod extract;
pub mod file_selector;
pub mod ignore;
pub mod preview;
pub mod selection;
pub mod tree;
pub mod walker;
