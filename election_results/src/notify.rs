//! The notification trigger.
//!
//! The transports (email, SMS, webhooks) live outside this crate. They are
//! registered once at startup in a [`Notifications`] registry, which is then
//! passed to whoever commits imports. A notification is sent after the
//! import has been committed, on a background thread: its failure is logged
//! and never affects the import.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::summary::Summary;

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub enum NotificationOption {
    Email,
    Sms,
    Webhooks,
}

impl NotificationOption {
    pub fn parse(s: &str) -> Option<NotificationOption> {
        match s.trim() {
            "email" => Some(NotificationOption::Email),
            "sms" => Some(NotificationOption::Sms),
            "webhooks" => Some(NotificationOption::Webhooks),
            _ => None,
        }
    }
}

pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

/// A notification transport.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &Summary) -> Result<(), NotifyError>;
}

/// The registered transports, one per option.
#[derive(Default, Clone)]
pub struct Notifications {
    transports: BTreeMap<NotificationOption, Arc<dyn Notifier>>,
}

impl Notifications {
    pub fn new() -> Notifications {
        Notifications::default()
    }

    pub fn register(mut self, option: NotificationOption, notifier: Arc<dyn Notifier>) -> Notifications {
        self.transports.insert(option, notifier);
        self
    }

    /// Sends the summary of a committed import through the requested
    /// transports. Does nothing for an empty set of options. Options without
    /// a registered transport are skipped.
    pub fn notify(
        &self,
        summary: Summary,
        options: &BTreeSet<NotificationOption>,
    ) -> Option<JoinHandle<()>> {
        if options.is_empty() {
            return None;
        }
        let mut selected: Vec<(NotificationOption, Arc<dyn Notifier>)> = Vec::new();
        for option in options.iter() {
            match self.transports.get(option) {
                Some(n) => selected.push((*option, n.clone())),
                None => warn!("notify: no transport registered for {:?}", option),
            }
        }
        if selected.is_empty() {
            return None;
        }
        info!(
            "notify: {} {} via {:?}",
            summary.item_type,
            summary.title,
            selected.iter().map(|(o, _)| *o).collect::<Vec<_>>()
        );
        Some(std::thread::spawn(move || {
            for (option, notifier) in selected {
                if let Err(e) = notifier.notify(&summary) {
                    warn!("notify: {:?} failed for {}: {}", option, summary.url, e);
                }
            }
        }))
    }
}
