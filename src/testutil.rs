//! Scripted [`ContainerLogSource`] for unit tests.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};

use crate::container::{ContainerID, ContainerIdentity};
use crate::runtime::{ContainerLogSource, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Serve,
    FailFetch,
    FailRead,
    Stall,
}

#[derive(Debug)]
struct Entry {
    id: ContainerID,
    logs: Vec<u8>,
    behavior: Behavior,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, Entry>,
    unavailable: bool,
    list_calls: usize,
    last_window: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct FakeSource {
    state: Mutex<State>,
}

impl FakeSource {
    /// Adds a running container or replaces the logs of an existing one.
    pub fn add_container(&self, name: &str, logs: &[u8]) -> ContainerID {
        let id = ContainerID::new(format!("id-{name}")).unwrap();
        self.state.lock().unwrap().containers.insert(
            name.to_owned(),
            Entry {
                id: id.clone(),
                logs: logs.to_vec(),
                behavior: Behavior::Serve,
            },
        );
        id
    }

    pub fn remove_container(&self, name: &str) {
        self.state.lock().unwrap().containers.remove(name);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn fail_fetch(&self, name: &str) {
        self.set_behavior(name, Behavior::FailFetch);
    }

    pub fn fail_read(&self, name: &str) {
        self.set_behavior(name, Behavior::FailRead);
    }

    /// Makes fetching the logs of `name` hang forever.
    pub fn stall_fetch(&self, name: &str) {
        self.set_behavior(name, Behavior::Stall);
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn last_window(&self) -> Option<Duration> {
        self.state.lock().unwrap().last_window
    }

    fn set_behavior(&self, name: &str, behavior: Behavior) {
        self.state
            .lock()
            .unwrap()
            .containers
            .get_mut(name)
            .expect("unknown container")
            .behavior = behavior;
    }
}

impl ContainerLogSource for FakeSource {
    type Logs = FakeLogs;

    async fn list_active_containers(&self) -> Result<Vec<ContainerIdentity>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.unavailable {
            return Err(Error::RuntimeUnavailable("daemon not running".into()));
        }
        Ok(state
            .containers
            .iter()
            .map(|(name, entry)| ContainerIdentity::new(entry.id.clone(), name.clone()))
            .collect())
    }

    async fn fetch_recent_logs(&self, id: &ContainerID, window: Duration) -> Result<FakeLogs> {
        let found = {
            let mut state = self.state.lock().unwrap();
            state.last_window = Some(window);
            state
                .containers
                .values()
                .find(|entry| &entry.id == id)
                .map(|entry| (entry.behavior, entry.logs.clone()))
        };

        match found {
            None => Err(Error::LogFetch {
                id: id.clone(),
                source: "no such container".into(),
            }),
            Some((Behavior::Serve, logs)) => Ok(FakeLogs {
                data: Some(logs),
                fail: false,
            }),
            Some((Behavior::FailRead, logs)) => Ok(FakeLogs {
                data: Some(logs),
                fail: true,
            }),
            Some((Behavior::FailFetch, _)) => Err(Error::LogFetch {
                id: id.clone(),
                source: "permission denied".into(),
            }),
            Some((Behavior::Stall, _)) => std::future::pending().await,
        }
    }
}

/// Yields the scripted logs, then either ends or fails.
#[derive(Debug)]
pub struct FakeLogs {
    data: Option<Vec<u8>>,
    fail: bool,
}

impl AsyncRead for FakeLogs {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.data.as_mut() {
            Some(data) if !data.is_empty() => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                data.drain(..n);
                Poll::Ready(Ok(()))
            }
            _ if this.fail => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed early",
            ))),
            _ => Poll::Ready(Ok(())),
        }
    }
}
