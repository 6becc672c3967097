use super::state::TransitionKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// What a registered operation is doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Transition(TransitionKind),
    /// Caller-owned work tied to the camera session, cancelled on backgrounding
    Background(String),
}

impl OperationKind {
    pub fn is_background(&self) -> bool {
        matches!(self, OperationKind::Background(_))
    }
}

struct RegisteredOperation {
    kind: OperationKind,
    token: CancellationToken,
    started_at: Instant,
}

type OperationMap = Mutex<HashMap<Uuid, RegisteredOperation>>;

/// Tracks cancellable operations so dispose and backgrounding can cut them short
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: Arc<OperationMap>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: OperationKind) -> OperationTicket {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        debug!("Registering operation {} ({:?})", id, kind);

        self.operations.lock().insert(
            id,
            RegisteredOperation {
                kind: kind.clone(),
                token: token.clone(),
                started_at: Instant::now(),
            },
        );

        OperationTicket {
            id,
            kind,
            token,
            operations: Arc::downgrade(&self.operations),
        }
    }

    /// Cancel and forget every operation matching `predicate`
    pub fn cancel_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&OperationKind) -> bool,
    {
        let mut operations = self.operations.lock();
        let ids: Vec<Uuid> = operations
            .iter()
            .filter(|(_, op)| predicate(&op.kind))
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(op) = operations.remove(id) {
                debug!(
                    "Cancelling operation {} ({:?}) after {:?}",
                    id,
                    op.kind,
                    op.started_at.elapsed()
                );
                op.token.cancel();
            }
        }
        ids.len()
    }

    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    pub fn cancel_background(&self) -> usize {
        self.cancel_where(OperationKind::is_background)
    }

    pub fn cancel_transitions(&self) -> usize {
        self.cancel_where(|kind| matches!(kind, OperationKind::Transition(_)))
    }

    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations
            .lock()
            .values()
            .map(|op| op.kind.clone())
            .collect()
    }
}

/// Handle to a registered operation; deregisters itself on drop
pub struct OperationTicket {
    id: Uuid,
    kind: OperationKind,
    token: CancellationToken,
    operations: Weak<OperationMap>,
}

impl OperationTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Drop for OperationTicket {
    fn drop(&mut self) {
        if let Some(operations) = self.operations.upgrade() {
            operations.lock().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for OperationTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTicket")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
