/// Local checks on a worker config before it is sent

use crate::error::ValidationError;
use crate::models::WorkerConfig;

/// Hostname accepted in place of a dotted-quad address
const LOCALHOST: &str = "localhost";

pub fn validate_for_creation(config: &WorkerConfig) -> Result<(), ValidationError> {
    if config.name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    Ok(())
}

pub fn validate_for_connection(config: &WorkerConfig) -> Result<(), ValidationError> {
    validate_for_creation(config)?;

    if config.zeroconf {
        return Ok(());
    }

    let port = config.port.filter(|p| *p != 0);
    let ip = config.ip.as_deref().filter(|ip| !ip.is_empty());

    if port.is_none() {
        return Err(ValidationError::MissingPort);
    }
    match ip {
        None => Err(ValidationError::MissingIp),
        Some(ip) if is_valid_ip(ip) => Ok(()),
        Some(ip) => Err(ValidationError::InvalidIp(ip.to_string())),
    }
}

pub fn is_valid_for_creation(config: &WorkerConfig) -> bool {
    validate_for_creation(config).is_ok()
}

pub fn is_valid_for_connection(config: &WorkerConfig) -> bool {
    validate_for_connection(config).is_ok()
}

/// Four dot-separated groups of 1-3 digits, each at most 255, or `localhost`
fn is_valid_ip(ip: &str) -> bool {
    if ip == LOCALHOST {
        return true;
    }

    let groups: Vec<&str> = ip.split('.').collect();
    groups.len() == 4
        && groups.iter().all(|group| {
            (1..=3).contains(&group.len())
                && group.bytes().all(|b| b.is_ascii_digit())
                && group.parse::<u16>().map_or(false, |v| v <= 255)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_connection_ips() {
        for ip in ["127.0.0.1", "localhost", "10.0.0.254", "0.0.0.0"] {
            let config = WorkerConfig::direct("worker1", ip, 9000);
            assert!(is_valid_for_connection(&config), "{ip} should be accepted");
        }

        let rejected = [
            "999.999.999.999",
            "256.1.1.1",
            "1.2.3",
            "1.2.3.4.5",
            "a.b.c.d",
            "1..2.3",
            "1234.1.1.1",
            "LOCALHOST",
            " 127.0.0.1",
        ];
        for ip in rejected {
            let config = WorkerConfig::direct("worker1", ip, 9000);
            assert_eq!(
                validate_for_connection(&config),
                Err(ValidationError::InvalidIp(ip.to_string())),
                "{ip} should be rejected"
            );
        }
    }

    #[test]
    fn test_direct_connection_requires_ip_and_port() {
        let mut config = WorkerConfig::direct("worker1", "127.0.0.1", 0);
        assert_eq!(validate_for_connection(&config), Err(ValidationError::MissingPort));

        config.port = None;
        assert!(!is_valid_for_connection(&config));

        let mut config = WorkerConfig::direct("worker1", "", 9000);
        assert_eq!(validate_for_connection(&config), Err(ValidationError::MissingIp));

        config.ip = None;
        assert_eq!(validate_for_connection(&config), Err(ValidationError::MissingIp));
    }

    #[test]
    fn test_zeroconf_ignores_address() {
        let mut config = WorkerConfig::zeroconf("worker1");
        assert!(is_valid_for_connection(&config));

        config.ip = Some("not an ip".to_string());
        config.port = Some(0);
        assert!(is_valid_for_connection(&config));
    }

    #[test]
    fn test_empty_name_rejected_everywhere() {
        let configs = [
            WorkerConfig::new(""),
            WorkerConfig::zeroconf(""),
            WorkerConfig::direct("", "127.0.0.1", 9000),
        ];
        for config in &configs {
            assert!(!is_valid_for_creation(config));
            assert!(!is_valid_for_connection(config));
            assert_eq!(validate_for_connection(config), Err(ValidationError::MissingName));
        }
    }

    #[test]
    fn test_creation_only_needs_name() {
        assert!(is_valid_for_creation(&WorkerConfig::new("worker1")));
        assert!(is_valid_for_creation(&WorkerConfig::direct("worker1", "999.1.1.1", 0)));
    }
}
