use crate::config::OverlayConfig;

pub fn setup_logging(config: &OverlayConfig) {
    common::setup_logging(config.environment, "info");
}
