//! Configuration types for the castwatch system
//!
//! This module defines all configuration structures used throughout the
//! crate. The event action table is supplied once at startup and is
//! immutable for the process lifetime.

use serde::{Deserialize, Serialize};

/// Main watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Poll scheduler settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Per-stage action table
    pub events: EventsConfig,
}

impl WatcherConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll.base_interval_secs == 0 {
            return Err(crate::Error::config("poll.base_interval_secs must be > 0"));
        }

        if self.events.schedule.is_none()
            && self.events.schedule_remind.is_none()
            && self.events.start.is_none()
        {
            return Err(crate::Error::config("no event stages configured"));
        }

        if let Some(schedule) = &self.events.schedule {
            schedule.validate("events.schedule")?;
        }

        if let Some(remind) = &self.events.schedule_remind {
            remind.validate("events.schedule_remind")?;
            match remind.before_secs {
                Some(before) if before > 0 => {}
                _ => {
                    return Err(crate::Error::config(
                        "events.schedule_remind.before_secs must be > 0",
                    ));
                }
            }
        }

        if let Some(start) = &self.events.start {
            start.validate("events.start")?;
        }

        Ok(())
    }
}

/// Poll scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Configured interval floor in seconds; the adaptive scheduler never
    /// polls more often than this
    #[serde(default = "default_base_interval_secs")]
    pub base_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Per-stage action table
///
/// A stage with no entry is disabled: the resolver never emits it (for
/// schedule stages) or the notifier treats it as a no-op (for start).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Action for the schedule stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<EventActionConfig>,

    /// Action for the schedule-remind stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_remind: Option<EventActionConfig>,

    /// Action for the start stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventActionConfig>,
}

/// Action bound to one notification stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventActionConfig {
    /// Remind window in seconds before the scheduled start; only
    /// meaningful for the schedule-remind stage, where it is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_secs: Option<u64>,

    /// Outbound message for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,

    /// Side-effect command for this stage (fire-and-forget)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandConfig>,
}

impl EventActionConfig {
    fn validate(&self, path: &str) -> Result<(), crate::Error> {
        if let Some(notification) = &self.notification
            && notification.message.is_empty()
        {
            return Err(crate::Error::config(format!(
                "{path}.notification.message cannot be empty"
            )));
        }

        if let Some(command) = &self.command
            && command.name.is_empty()
        {
            return Err(crate::Error::config(format!(
                "{path}.command.name cannot be empty"
            )));
        }

        Ok(())
    }
}

/// Outbound message configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Message template; placeholders like `{title}` are substituted with
    /// session/creator context at delivery time
    pub message: String,
}

/// Side-effect command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Executable to run
    pub name: String,

    /// Arguments; each is rendered as a template before launch
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Whether to capture and log the command's stderr on failure
    #[serde(default)]
    pub capture_stderr: bool,
}

fn default_base_interval_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    256
}
