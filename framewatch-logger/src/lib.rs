/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Console logger for code injected into third-party pages.
//!
//! Records are prefixed so they can be told apart from the host page's own
//! output, and records from foreign crates can be filtered out entirely.
#![cfg(target_arch = "wasm32")]

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;
use web_sys::console;

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub console_level: LevelFilter,
    /// Prepended to every line, e.g. `[framewatch]`.
    pub prefix: String,
    /// When set, only records whose target starts with one of these are printed.
    pub target_allowlist: Vec<String>,
    pub max_message_len: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            prefix: "[framewatch]".to_string(),
            target_allowlist: vec!["framewatch".to_string()],
            max_message_len: 300,
        }
    }
}

pub struct ConsoleLogger {
    config: ConsoleConfig,
}

impl ConsoleLogger {
    pub fn init(config: ConsoleConfig) -> Result<(), log::SetLoggerError> {
        let level = config.console_level;
        let logger = ConsoleLogger { config };

        // Leak the logger to satisfy the 'static requirement of set_logger
        let leaked: &'static ConsoleLogger = Box::leak(Box::new(logger));
        log::set_logger(leaked)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level().to_level_filter() <= self.config.console_level
            && target_allowed(&self.config.target_allowlist, metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = format_record(&self.config.prefix, self.config.max_message_len, record);
        match record.level() {
            Level::Error => console::error_1(&JsValue::from_str(&msg)),
            Level::Warn => console::warn_1(&JsValue::from_str(&msg)),
            Level::Info => console::info_1(&JsValue::from_str(&msg)),
            Level::Debug => console::log_1(&JsValue::from_str(&msg)),
            Level::Trace => console::debug_1(&JsValue::from_str(&msg)),
        }
    }

    fn flush(&self) {}
}

fn target_allowed(allowlist: &[String], target: &str) -> bool {
    allowlist.is_empty() || allowlist.iter().any(|t| target.starts_with(t.as_str()))
}

fn format_record(prefix: &str, max_len: usize, record: &Record) -> String {
    let mut msg = format!(
        "{} {}: {} - {}",
        prefix,
        record.level(),
        record.target(),
        record.args()
    );
    if msg.len() > max_len {
        let mut cut = max_len;
        while !msg.is_char_boundary(cut) {
            cut -= 1;
        }
        msg.truncate(cut);
    }
    msg
}

// Bridge API: hand each record to a host-provided function, e.g. one that
// posts it to the extension's background script.
#[cfg(feature = "bridge")]
pub mod bridge {
    use super::*;

    pub fn init_with_bridge(
        config: ConsoleConfig,
        send: js_sys::Function,
    ) -> Result<(), log::SetLoggerError> {
        let level = config.console_level;
        log::set_boxed_logger(Box::new(BridgeLogger {
            config,
            sender: send,
        }))?;
        log::set_max_level(level);
        Ok(())
    }

    struct BridgeLogger {
        config: ConsoleConfig,
        sender: js_sys::Function,
    }

    impl Log for BridgeLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level().to_level_filter() <= self.config.console_level
                && target_allowed(&self.config.target_allowlist, metadata.target())
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let obj = js_sys::Object::new();
            let _ =
                js_sys::Reflect::set(&obj, &JsValue::from_str("type"), &JsValue::from_str("log"));
            let _ = js_sys::Reflect::set(
                &obj,
                &JsValue::from_str("level"),
                &JsValue::from_str(record.level().as_str()),
            );
            let _ = js_sys::Reflect::set(
                &obj,
                &JsValue::from_str("target"),
                &JsValue::from_str(record.target()),
            );
            let _ = js_sys::Reflect::set(
                &obj,
                &JsValue::from_str("message"),
                &JsValue::from_str(&format_record(
                    &self.config.prefix,
                    self.config.max_message_len,
                    record,
                )),
            );
            let _ = self.sender.call1(&JsValue::NULL, &obj);
        }

        fn flush(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn allowlist_matches_prefixes() {
        let allow = vec!["framewatch".to_string()];
        assert!(target_allowed(&allow, "framewatch_client::sampler"));
        assert!(!target_allowed(&allow, "hyper::client"));
        assert!(target_allowed(&[], "anything"));
    }

    #[wasm_bindgen_test]
    fn long_messages_are_truncated() {
        let msg = format_record(
            "[fw]",
            20,
            &Record::builder()
                .args(format_args!("{}", "x".repeat(100)))
                .level(Level::Info)
                .target("framewatch_client")
                .build(),
        );
        assert_eq!(msg.len(), 20);
        assert!(msg.starts_with("[fw] INFO"));
    }
}
