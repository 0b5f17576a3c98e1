//! Scripted in-memory host for registry tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use transport_host::{
    ConnectionHandle, Guest, GuestId, HostApi, HostError, OsFamily, OutputSink, RemoteCommand,
    Result, StdinSource,
};

#[derive(Default)]
struct FakeState {
    guests: Vec<Guest>,
    enumeration_fails: bool,
    login_failures: HashSet<GuestId>,
    exec_failures: HashSet<GuestId>,
    gone_on_exec: HashSet<GuestId>,
    panic_on_exec: HashSet<GuestId>,
    logout_failures: HashSet<GuestId>,
    exit_codes: HashMap<GuestId, i32>,
    exec_delay: Option<Duration>,

    logins: Vec<GuestId>,
    executions: Vec<(GuestId, RemoteCommand, StdinSource)>,
    logouts: Vec<GuestId>,
    in_flight: usize,
    max_in_flight: usize,
}

/// A host whose guests and failures are set up by the test.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new(guests: Vec<Guest>) -> Self {
        let host = Self::default();
        host.state.lock().unwrap().guests = guests;
        host
    }

    pub fn add_guest(&self, guest: Guest) {
        self.state.lock().unwrap().guests.push(guest);
    }

    pub fn remove_guest(&self, id: GuestId) {
        self.state.lock().unwrap().guests.retain(|g| g.id != id);
    }

    pub fn set_enumeration_fails(&self, fails: bool) {
        self.state.lock().unwrap().enumeration_fails = fails;
    }

    pub fn fail_login(&self, id: GuestId) {
        self.state.lock().unwrap().login_failures.insert(id);
    }

    pub fn allow_login(&self, id: GuestId) {
        self.state.lock().unwrap().login_failures.remove(&id);
    }

    pub fn fail_exec(&self, id: GuestId) {
        self.state.lock().unwrap().exec_failures.insert(id);
    }

    pub fn allow_exec(&self, id: GuestId) {
        self.state.lock().unwrap().exec_failures.remove(&id);
    }

    pub fn gone_on_exec(&self, id: GuestId) {
        self.state.lock().unwrap().gone_on_exec.insert(id);
    }

    pub fn panic_on_exec(&self, id: GuestId) {
        self.state.lock().unwrap().panic_on_exec.insert(id);
    }

    pub fn fail_logout(&self, id: GuestId) {
        self.state.lock().unwrap().logout_failures.insert(id);
    }

    pub fn set_exit_code(&self, id: GuestId, code: i32) {
        self.state.lock().unwrap().exit_codes.insert(id, code);
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = Some(delay);
    }

    pub fn logins(&self, id: GuestId) -> usize {
        self.state.lock().unwrap().logins.iter().filter(|g| **g == id).count()
    }

    pub fn executions(&self, id: GuestId) -> Vec<(RemoteCommand, StdinSource)> {
        self.state
            .lock()
            .unwrap()
            .executions
            .iter()
            .filter(|(g, _, _)| *g == id)
            .map(|(_, cmd, stdin)| (cmd.clone(), stdin.clone()))
            .collect()
    }

    pub fn logouts(&self, id: GuestId) -> usize {
        self.state.lock().unwrap().logouts.iter().filter(|g| **g == id).count()
    }

    pub fn total_logins(&self) -> usize {
        self.state.lock().unwrap().logins.len()
    }

    pub fn total_logouts(&self) -> usize {
        self.state.lock().unwrap().logouts.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl HostApi for FakeHost {
    async fn list_running_guests(&self) -> Result<Vec<Guest>> {
        let state = self.state.lock().unwrap();
        if state.enumeration_fails {
            return Err(HostError::Enumerate("host unreachable".into()));
        }
        Ok(state.guests.clone())
    }

    async fn login(&self, guest: &Guest, user: &str) -> Result<ConnectionHandle> {
        let mut state = self.state.lock().unwrap();
        state.logins.push(guest.id);
        if state.login_failures.contains(&guest.id) {
            return Err(HostError::Auth {
                guest: guest.id,
                reason: "guest tools not running".into(),
            });
        }
        Ok(ConnectionHandle::new(guest.id, user))
    }

    async fn execute(
        &self,
        handle: &ConnectionHandle,
        command: &RemoteCommand,
        stdin: StdinSource,
        _stdout: OutputSink,
        _stderr: OutputSink,
    ) -> Result<i32> {
        let guest = handle.guest();
        let (delay, panics) = {
            let mut state = self.state.lock().unwrap();
            state.executions.push((guest, command.clone(), stdin));
            if state.panic_on_exec.contains(&guest) {
                (None, true)
            } else {
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                (state.exec_delay, false)
            }
        };
        // Raised outside the lock so the state stays usable
        if panics {
            panic!("scripted panic during execute");
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        if state.gone_on_exec.contains(&guest) {
            return Err(HostError::GuestGone(guest));
        }
        if state.exec_failures.contains(&guest) {
            return Err(HostError::Exec {
                guest,
                reason: "connection reset".into(),
            });
        }
        Ok(state.exit_codes.get(&guest).copied().unwrap_or(0))
    }

    async fn logout(&self, handle: ConnectionHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.logouts.push(handle.guest());
        if state.logout_failures.contains(&handle.guest()) {
            return Err(HostError::Exec {
                guest: handle.guest(),
                reason: "logout job failed".into(),
            });
        }
        Ok(())
    }
}

pub fn linux(name: &str) -> Guest {
    Guest::running(GuestId::new(), name, OsFamily::Linux)
}

pub fn windows(name: &str) -> Guest {
    Guest::running(GuestId::new(), name, OsFamily::Windows)
}

pub fn other(name: &str) -> Guest {
    Guest::running(GuestId::new(), name, OsFamily::Other)
}

/// A fresh directory holding both payload artifacts.
pub fn payload_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "transport-core-it-{}-{}",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create payload dir");
    std::fs::write(dir.join("drs-transport"), b"\x7fELF posix payload").expect("write posix");
    std::fs::write(dir.join("drs-transport.exe"), b"MZ windows payload").expect("write windows");
    dir
}
