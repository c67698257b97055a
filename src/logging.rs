//! Log sink selection: the browser console under wasm, `env_logger` natively.

#[cfg(target_arch = "wasm32")]
mod console {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use wasm_bindgen::JsValue;
    use web_sys::console;

    pub struct ConsoleLogger;

    pub static LOGGER: ConsoleLogger = ConsoleLogger;

    impl Log for ConsoleLogger {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record<'_>) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
            match record.level() {
                Level::Error => console::error_1(&line),
                Level::Warn => console::warn_1(&line),
                _ => console::log_1(&line),
            }
        }

        fn flush(&self) {}
    }

    pub fn init() {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
    }
}

/// Install the global logger. Safe to call more than once.
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console::init();

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
