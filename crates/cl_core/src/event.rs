use tokio::sync::broadcast;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// What a `check` event is verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Library,
    Asset,
    Native,
    Mod,
}

/// Everything the pipeline reports to its consumers, as one sum type.
/// Frontends subscribe once and match on the kinds they care about.
#[derive(Debug, Clone)]
pub enum Event {
    Progress {
        done: u64,
        total: u64,
        element: String,
    },
    Speed {
        bytes_per_sec: f64,
    },
    Estimated {
        seconds_left: f64,
    },
    Check {
        index: usize,
        total: usize,
        kind: CheckKind,
    },
    Extract {
        name: String,
    },
    Patch {
        chunk: String,
    },
    Data {
        chunk: String,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    Close {
        code: Option<i32>,
    },
    Error {
        kind: ErrorKind,
        detail: String,
    },
}

/// Fan-out bus over [`Event`]. Sends never block; subscribers that lag
/// behind lose the oldest events rather than stalling the pipeline.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(512)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Send with no receivers is not an error: progress is best-effort.
    pub fn emit(&self, event: Event) {
        _ = self.sender.send(event);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(Event::Log {
            level,
            message: message.into(),
        });
    }

    pub fn log_debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn error(&self, kind: ErrorKind, detail: impl Into<String>) {
        self.emit(Event::Error {
            kind,
            detail: detail.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_each_get_a_copy() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(Event::Extract {
            name: "liblwjgl.so".to_owned(),
        });

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                Event::Extract { name } => assert_eq!(name, "liblwjgl.so"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.error(ErrorKind::Network, "nobody listening");
    }
}
