// SPDX-License-Identifier: GPL-3.0-or-later

pub mod args;
pub mod config;
pub mod context;
pub mod entry;
pub mod environment;
pub mod launcher;
pub mod modes;
pub mod options;
pub mod persistence;
pub mod provider;
pub mod rerun;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod tokenizer;
pub mod workspace;

#[cfg(test)]
mod testing;
