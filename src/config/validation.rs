//! Configuration validation

use super::{Config, DEFAULT_TABLE_CAPACITY};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_segment(config, &mut result);
    validate_polling(config, &mut result);
    validate_table(config, &mut result);
    validate_hunt(config, &mut result);
    validate_notification(config, &mut result);

    result
}

fn validate_segment(config: &Config, result: &mut ValidationResult) {
    if config.interface.trim().is_empty() {
        result.error("interface: must not be empty");
    }

    let lan = config.home_lan;
    if lan.prefix_len() < 24 {
        result.warn(format!(
            "home_lan: {} is larger than a /24, the host table may not cover it",
            lan
        ));
    }

    if !lan.contains(config.host_ip) {
        result.error(format!(
            "host_ip: {} is outside home_lan {}",
            config.host_ip, lan
        ));
    }

    if !lan.contains(config.gateway_ip) {
        result.error(format!(
            "gateway_ip: {} is outside home_lan {}",
            config.gateway_ip, lan
        ));
    }

    if config.host_ip == config.gateway_ip {
        result.error("host_ip: must differ from gateway_ip");
    }

    if config.gateway_mac.is_none() {
        result.warn("gateway_mac: not specified, gateway will be tracked as a regular host");
    }
}

fn validate_polling(config: &Config, result: &mut ValidationResult) {
    if config.polling.interval_secs == 0 {
        result.error("polling.interval_secs: must be greater than 0");
    }
    if config.polling.offline_after_cycles == 0 {
        result.error("polling.offline_after_cycles: must be greater than 0");
    }
}

fn validate_table(config: &Config, result: &mut ValidationResult) {
    let capacity = config.table.capacity;
    if capacity == 0 {
        result.error("table.capacity: must be greater than 0");
    } else if capacity > DEFAULT_TABLE_CAPACITY {
        result.warn(format!(
            "table.capacity: {} exceeds the {} hosts of a /24",
            capacity, DEFAULT_TABLE_CAPACITY
        ));
    }
}

fn validate_hunt(config: &Config, result: &mut ValidationResult) {
    if config.hunt.interval_ms == 0 {
        result.error("hunt.interval_ms: must be greater than 0");
    }
    if config.hunt.timeout_secs == 0 {
        result.warn("hunt.timeout_secs: 0, hunting never gives up");
    }
}

fn validate_notification(config: &Config, result: &mut ValidationResult) {
    if config.notification.queue_size == 0 {
        result.error("notification.queue_size: must be greater than 0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse;

    fn config(extra: &str) -> Config {
        let base = r#"
interface = "eth0"
host_ip = "192.168.1.10"
gateway_ip = "192.168.1.1"
gateway_mac = "aa:bb:cc:dd:ee:ff"
home_lan = "192.168.1.0/24"
"#;
        parse(&format!("{}{}", base, extra)).unwrap()
    }

    #[test]
    fn test_valid_config() {
        let result = validate(&config(""));
        assert!(!result.has_errors(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_host_outside_lan() {
        let mut cfg = config("");
        cfg.host_ip = "10.0.0.1".parse().unwrap();

        let result = validate(&cfg);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.starts_with("host_ip")));
    }

    #[test]
    fn test_zero_values_rejected() {
        let cfg = config(
            "[polling]\ninterval_secs = 0\n[table]\ncapacity = 0\n[notification]\nqueue_size = 0\n",
        );
        let result = validate(&cfg);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_warnings() {
        let mut cfg = config("[hunt]\ntimeout_secs = 0\n");
        cfg.gateway_mac = None;
        cfg.home_lan = "192.168.0.0/16".parse().unwrap();

        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 3);
    }
}
