use crate::correction::LensDirection;
use crate::error::{ErrorKind, EventBusError};
use crate::lifecycle::{CameraLifecycleState, TransitionKind};
use crate::orientation::DeviceOrientation;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications emitted by the lifecycle controller
#[derive(Debug, Clone, Serialize)]
pub enum LifecycleEvent {
    StateChanged {
        from: CameraLifecycleState,
        to: CameraLifecycleState,
        timestamp: SystemTime,
    },
    /// A new capture rotation was applied after an orientation change
    OrientationApplied {
        orientation: DeviceOrientation,
        rotation_degrees: u16,
    },
    OrientationLocked {
        orientation: DeviceOrientation,
        rotation_degrees: u16,
    },
    OrientationUnlocked,
    LensSwitched {
        lens: LensDirection,
    },
    PhotoCaptured {
        path: PathBuf,
        rotation_degrees: u16,
    },
    RecordingStarted {
        rotation_degrees: u16,
    },
    RecordingStopped {
        path: PathBuf,
    },
    /// Recording was cut off by backgrounding, an error or dispose
    RecordingDiscarded {
        reason: String,
    },
    TransitionFailed {
        transition: TransitionKind,
        kind: ErrorKind,
        message: String,
    },
    RetryScheduled {
        attempt: u32,
        delay: Duration,
    },
}

impl LifecycleEvent {
    pub fn description(&self) -> String {
        match self {
            LifecycleEvent::StateChanged { from, to, .. } => {
                format!("State {} -> {}", from, to)
            }
            LifecycleEvent::OrientationApplied {
                orientation,
                rotation_degrees,
            } => format!("Orientation {} applied, rotation {}°", orientation, rotation_degrees),
            LifecycleEvent::OrientationLocked {
                orientation,
                rotation_degrees,
            } => format!("Capture orientation locked at {} ({}°)", orientation, rotation_degrees),
            LifecycleEvent::OrientationUnlocked => "Capture orientation unlocked".to_string(),
            LifecycleEvent::LensSwitched { lens } => format!("Switched to {} camera", lens),
            LifecycleEvent::PhotoCaptured {
                path,
                rotation_degrees,
            } => format!("Photo saved to {} ({}°)", path.display(), rotation_degrees),
            LifecycleEvent::RecordingStarted { rotation_degrees } => {
                format!("Recording started ({}°)", rotation_degrees)
            }
            LifecycleEvent::RecordingStopped { path } => {
                format!("Recording saved to {}", path.display())
            }
            LifecycleEvent::RecordingDiscarded { reason } => {
                format!("Recording discarded: {}", reason)
            }
            LifecycleEvent::TransitionFailed {
                transition,
                kind,
                message,
            } => format!("{:?} failed ({}): {}", transition, kind, message),
            LifecycleEvent::RetryScheduled { attempt, delay } => {
                format!("Retry {} scheduled in {:?}", attempt, delay)
            }
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::StateChanged { .. } => "state_changed",
            LifecycleEvent::OrientationApplied { .. } => "orientation_applied",
            LifecycleEvent::OrientationLocked { .. } => "orientation_locked",
            LifecycleEvent::OrientationUnlocked => "orientation_unlocked",
            LifecycleEvent::LensSwitched { .. } => "lens_switched",
            LifecycleEvent::PhotoCaptured { .. } => "photo_captured",
            LifecycleEvent::RecordingStarted { .. } => "recording_started",
            LifecycleEvent::RecordingStopped { .. } => "recording_stopped",
            LifecycleEvent::RecordingDiscarded { .. } => "recording_discarded",
            LifecycleEvent::TransitionFailed { .. } => "transition_failed",
            LifecycleEvent::RetryScheduled { .. } => "retry_scheduled",
        }
    }
}

/// Broadcast bus for lifecycle notifications.
///
/// Publishing never blocks and is safe while holding the controller lock.
#[derive(Clone)]
pub struct LifecycleEventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of receivers reached; zero is not an error
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        match &event {
            LifecycleEvent::TransitionFailed { .. } => error!("{}", event.description()),
            LifecycleEvent::RecordingDiscarded { .. } => warn!("{}", event.description()),
            LifecycleEvent::StateChanged { .. } => debug!("{}", event.description()),
            _ => info!("{}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    Custom(fn(&LifecycleEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named receiver that only yields events passing its filter
pub struct EventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(bus: &LifecycleEventBus, filter: EventFilter, name: &str) -> Self {
        Self {
            receiver: bus.subscribe(),
            filter,
            name: name.to_string(),
        }
    }

    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                    return Err(EventBusError::Lagged { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain whatever is queued without waiting
    pub fn try_recv(&mut self) -> Result<Option<LifecycleEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                    return Err(EventBusError::Lagged { skipped });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
