pub mod archive;
pub mod cache;
pub mod cleanup;
pub mod commands;
pub mod download;
pub mod error;
pub mod graph;
pub mod http;
pub mod index;
pub mod install;
pub mod manifest;
pub mod package;
pub mod repository;
pub mod runtime;
pub mod version;
