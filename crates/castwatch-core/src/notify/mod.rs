// # Notifier
//
// Turns a (session, stage) transition into at most one outbound
// delivery, plus an optional fire-and-forget side command.
//
// ## Behavior
//
// 1. Look up the action configured for the stage; none → no-op success.
// 2. Launch the side command, if configured (detached; its failure is
//    logged and never affects the notification result).
// 3. Render the message template and perform exactly one delivery
//    through the `DeliverySink`.
//
// The notification is successful once the primary delivery succeeds,
// independent of the side command's outcome.

pub mod template;

use std::process::Stdio;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{CommandConfig, EventActionConfig, EventsConfig};
use crate::error::Result;
use crate::status::NotificationStatus;
use crate::traits::delivery::{DeliveryReceipt, DeliverySink};
use crate::traits::session_source::{Creator, SessionSnapshot};

/// Stage-keyed notifier over a delivery sink
pub struct Notifier {
    events: EventsConfig,
    sink: Arc<dyn DeliverySink>,
}

impl Notifier {
    /// Create a notifier bound to the startup action table
    pub fn new(events: EventsConfig, sink: Arc<dyn DeliverySink>) -> Self {
        Self { events, sink }
    }

    fn action_for(&self, status: NotificationStatus) -> Option<&EventActionConfig> {
        match status {
            NotificationStatus::Schedule => self.events.schedule.as_ref(),
            NotificationStatus::ScheduleRemind => self.events.schedule_remind.as_ref(),
            NotificationStatus::Start => self.events.start.as_ref(),
            NotificationStatus::None => None,
        }
    }

    /// Deliver the notification configured for `status`.
    ///
    /// # Errors
    ///
    /// - `Error::Render` when the message template is malformed
    /// - `Error::Delivery` when the sink fails; the stage is retried by
    ///   the next poll cycle
    pub async fn notify(
        &self,
        status: NotificationStatus,
        session: &SessionSnapshot,
        creator: &Creator,
    ) -> Result<DeliveryReceipt> {
        let Some(action) = self.action_for(status) else {
            return Ok(DeliveryReceipt::Skipped);
        };

        if let Some(command) = &action.command {
            spawn_command(command.clone(), session.clone(), creator.clone());
        }

        let Some(notification) = &action.notification else {
            return Ok(DeliveryReceipt::Skipped);
        };

        let text = template::render(&notification.message, session, creator)?;
        let receipt = self.sink.deliver(&text).await?;

        if let DeliveryReceipt::Posted { id } = &receipt {
            info!(
                session = %session.id,
                %status,
                sink = self.sink.sink_name(),
                post = %id,
                "notification delivered"
            );
        }

        Ok(receipt)
    }
}

/// Launch the side command for a stage, detached from the notification.
///
/// Argument templates are rendered inside the spawned task; render and
/// exec failures are logged, never propagated.
fn spawn_command(config: CommandConfig, session: SessionSnapshot, creator: Creator) {
    tokio::spawn(async move {
        let mut args = Vec::with_capacity(config.args.len());
        for arg in &config.args {
            match template::render(arg, &session, &creator) {
                Ok(rendered) => args.push(rendered),
                Err(e) => {
                    error!(session = %session.id, error = %e, "command argument render failed");
                    return;
                }
            }
        }

        let mut command = tokio::process::Command::new(&config.name);
        command.args(&args);
        if let Some(dir) = &config.working_directory {
            command.current_dir(dir);
        }
        if config.capture_stderr {
            command.stderr(Stdio::piped());
        } else {
            command.stderr(Stdio::null());
        }
        command.stdout(Stdio::null());
        command.stdin(Stdio::null());

        info!(session = %session.id, command = %config.name, "command start");
        match command.output().await {
            Ok(output) if output.status.success() => {
                info!(
                    session = %session.id,
                    command = %config.name,
                    code = output.status.code().unwrap_or(-1),
                    "command completed"
                );
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                error!(
                    session = %session.id,
                    command = %config.name,
                    code = output.status.code().unwrap_or(-1),
                    stderr = %stderr,
                    "command failed"
                );
            }
            Err(e) => {
                error!(
                    session = %session.id,
                    command = %config.name,
                    error = %e,
                    "command exec failed"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn deliver(&self, text: &str) -> Result<DeliveryReceipt> {
            if self.fail {
                return Err(Error::delivery("remote unavailable"));
            }
            self.delivered.lock().unwrap().push(text.to_string());
            Ok(DeliveryReceipt::Posted {
                id: "900".to_string(),
            })
        }

        fn sink_name(&self) -> &'static str {
            "recording"
        }
    }

    fn session() -> SessionSnapshot {
        SessionSnapshot {
            id: "1abc".to_string(),
            creator_id: "42".to_string(),
            title: "launch party".to_string(),
            state: Some("live".to_string()),
            scheduled_start: None,
            started_at: None,
            created_at: None,
            url: "https://example.com/s/1abc".to_string(),
        }
    }

    fn creator() -> Creator {
        Creator {
            id: "42".to_string(),
            name: "Host".to_string(),
            username: "host".to_string(),
        }
    }

    fn events_with_start(message: &str) -> EventsConfig {
        EventsConfig {
            schedule: None,
            schedule_remind: None,
            start: Some(EventActionConfig {
                before_secs: None,
                notification: Some(NotificationConfig {
                    message: message.to_string(),
                }),
                command: None,
            }),
        }
    }

    #[tokio::test]
    async fn unconfigured_stage_is_noop_success() {
        let sink = Arc::new(RecordingSink::new(false));
        let notifier = Notifier::new(events_with_start("{title}"), sink.clone());

        let receipt = notifier
            .notify(NotificationStatus::Schedule, &session(), &creator())
            .await
            .unwrap();

        assert_eq!(receipt, DeliveryReceipt::Skipped);
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn configured_stage_delivers_rendered_message() {
        let sink = Arc::new(RecordingSink::new(false));
        let notifier = Notifier::new(events_with_start("{creator_name} is live: {url}"), sink.clone());

        let receipt = notifier
            .notify(NotificationStatus::Start, &session(), &creator())
            .await
            .unwrap();

        assert!(matches!(receipt, DeliveryReceipt::Posted { .. }));
        assert_eq!(
            sink.delivered.lock().unwrap().as_slice(),
            ["Host is live: https://example.com/s/1abc"]
        );
    }

    #[tokio::test]
    async fn bad_template_is_render_error() {
        let sink = Arc::new(RecordingSink::new(false));
        let notifier = Notifier::new(events_with_start("{bogus}"), sink.clone());

        let err = notifier
            .notify(NotificationStatus::Start, &session(), &creator())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Render(_)));
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_propagates_as_delivery_error() {
        let sink = Arc::new(RecordingSink::new(true));
        let notifier = Notifier::new(events_with_start("{title}"), sink);

        let err = notifier
            .notify(NotificationStatus::Start, &session(), &creator())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Delivery(_)));
    }

    #[tokio::test]
    async fn action_without_notification_skips_delivery() {
        let sink = Arc::new(RecordingSink::new(false));
        let events = EventsConfig {
            schedule: None,
            schedule_remind: None,
            start: Some(EventActionConfig {
                before_secs: None,
                notification: None,
                command: None,
            }),
        };
        let notifier = Notifier::new(events, sink.clone());

        let receipt = notifier
            .notify(NotificationStatus::Start, &session(), &creator())
            .await
            .unwrap();

        assert_eq!(receipt, DeliveryReceipt::Skipped);
    }
}
