use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::{Alert, IntegrityEvent};

/// Most recent alerts for one session, newest first. Oldest entries fall off.
#[derive(Clone)]
pub struct AlertSurface {
    alerts: Arc<Mutex<VecDeque<Alert>>>,
    capacity: usize,
}

impl AlertSurface {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, event: &IntegrityEvent) -> Alert {
        let alert = Alert::from_event(event);
        let mut alerts = match self.alerts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        alerts.push_front(alert.clone());
        alerts.truncate(self.capacity);
        alert
    }

    pub fn list(&self) -> Vec<Alert> {
        match self.alerts.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
