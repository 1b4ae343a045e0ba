pub mod annotator;
pub mod classifier;
pub mod config;
pub mod embedder;
pub mod llm;
pub mod models;
pub mod parser;
pub mod ranking;
pub mod storage;
pub mod tts;
pub mod utils;
