pub mod agent;
pub mod api;
pub mod automate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod duplication;
pub mod error;
pub mod genesis;
pub mod generators;
pub mod git;
pub mod github;
pub mod guardrails;
pub mod insights;
pub mod memory;
pub mod profile;
pub mod providers;
pub mod pysource;
pub mod roadmap;
pub mod scaffold;
pub mod skills;
pub mod style;
pub mod watcher;
pub mod workspace;
