// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use super::*;
use ringlog::Level;

#[derive(Clone, Deserialize)]
pub struct Debug {
    #[serde(default = "log_level")]
    log_level: String,
    /// Log to this file instead of stderr.
    log_file: Option<String>,
    /// Where the log file is rotated to, defaults to `<log_file>.old`.
    log_backup: Option<String>,
    #[serde(default = "log_max_size")]
    log_max_size: u64,
    #[serde(default = "log_queue_depth")]
    log_queue_depth: usize,
    #[serde(default = "log_single_message_size")]
    log_single_message_size: usize,
}

impl Default for Debug {
    fn default() -> Self {
        Self {
            log_level: log_level(),
            log_file: None,
            log_backup: None,
            log_max_size: log_max_size(),
            log_queue_depth: log_queue_depth(),
            log_single_message_size: log_single_message_size(),
        }
    }
}

fn log_level() -> String {
    "info".to_string()
}

fn log_max_size() -> u64 {
    1024 * 1024 * 1024
}

fn log_queue_depth() -> usize {
    4096
}

fn log_single_message_size() -> usize {
    1024
}

impl Debug {
    /// Unrecognized levels fall back to `info`.
    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::Info)
    }

    pub fn log_file(&self) -> Option<String> {
        self.log_file.clone()
    }

    pub fn log_backup(&self) -> Option<String> {
        self.log_backup.clone()
    }

    pub fn log_max_size(&self) -> u64 {
        self.log_max_size
    }

    pub fn log_queue_depth(&self) -> usize {
        self.log_queue_depth
    }

    pub fn log_single_message_size(&self) -> usize {
        self.log_single_message_size
    }
}
