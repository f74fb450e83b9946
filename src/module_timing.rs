use embassy_time::Duration;

/// Low time of `RESET_N` pin to trigger module reset (reboot)
pub fn reset_time() -> Duration {
    Duration::from_millis(300)
}

/// Time to wait for `+SYSSTART` after a reset
pub fn boot_time() -> Duration {
    Duration::from_secs(10)
}

/// Backoff after a failed read on the serial channel
pub fn rx_backoff() -> Duration {
    Duration::from_millis(100)
}
