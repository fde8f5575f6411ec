use std::path::Path;

use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use super::config::{ServerConfig, SystemMode};

const PRODUCTION_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}";
const DEVELOPMENT_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {t} - {m}{n}";

/// Development logs also carry the module target.
pub fn log_pattern(mode: SystemMode) -> &'static str {
    match mode {
        SystemMode::Development => DEVELOPMENT_PATTERN,
        SystemMode::Production => PRODUCTION_PATTERN,
    }
}

/// Install the global logger: console always, plus a timestamped file in
/// `LOG_DIR` when one is configured.
pub fn init_logging(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pattern = log_pattern(config.system_mode);

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(dir) = &config.log_dir {
        let file_appender = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(pattern)))
            .build(log_file_path(dir))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file_appender)));
        root = root.appender("file");
    }

    // hyper is chatty at debug
    let config = builder
        .logger(Logger::builder().build("hyper", LevelFilter::Warn))
        .build(root.build(config.log_level))?;

    log4rs::init_config(config)?;

    Ok(())
}

fn log_file_path(dir: &Path) -> std::path::PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    dir.join(format!("nsf_server_{timestamp}.log"))
}
