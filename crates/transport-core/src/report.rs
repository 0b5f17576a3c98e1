//! Per-run delivery counters.

/// Counters describing one registry's work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Running guests returned by enumeration, summed over refreshes.
    pub discovered: usize,
    /// Sessions that logged in.
    pub connected: usize,
    /// Payloads confirmed written.
    pub delivered: usize,
    /// Guests skipped because they were already delivered.
    pub already_done: usize,
    /// Guests skipped for having no payload for their OS family.
    pub unsupported: usize,
    /// Logins that failed.
    pub auth_failures: usize,
    /// Deliveries that failed.
    pub exec_failures: usize,
    /// Guests that stopped running mid-session.
    pub gone: usize,
    /// Logouts attempted.
    pub disconnects: usize,
    /// Logouts that failed.
    pub teardown_failures: usize,
}

impl RunReport {
    /// Per-guest failures of any kind.
    pub fn failures(&self) -> usize {
        self.auth_failures + self.exec_failures + self.gone
    }
}
