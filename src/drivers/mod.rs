//! Peripheral drivers and thread helpers for the expansion connector.

#[cfg(target_os = "espidf")]
pub mod hotplug;
pub mod task_pin;
#[cfg(target_os = "espidf")]
pub mod uart;
