pub mod security_monitor;

pub use security_monitor::{
    SecurityEvent, SecurityEventType, SecurityMonitor, SecurityMonitorConfig, MAX_EVENT_CAPACITY,
};
