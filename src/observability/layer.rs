//! `tracing` layer that feeds the sink router.
//!
//! Every event is converted into a [`LogEvent`], stamped with the active
//! correlation id (if the event happens inside a request scope), and handed
//! to [`SinkRouter::emit`].
//!
//! Sink minimum levels change at runtime, so callsite interest is always
//! `sometimes` and `enabled` consults the live configuration per event.

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::subscriber::Interest;
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::correlation;
use crate::observability::event::{LogEvent, LogLevel};
use crate::observability::router::SinkRouter;
use crate::observability::sink::PERFORMANCE_TARGET;

pub struct SinkRouterLayer {
    router: Arc<SinkRouter>,
}

impl SinkRouterLayer {
    pub fn new(router: Arc<SinkRouter>) -> Self {
        Self { router }
    }

    fn wants(&self, metadata: &Metadata<'_>) -> bool {
        let Some(level) = LogLevel::from_tracing(metadata.level()) else {
            return false;
        };
        if metadata.target() == PERFORMANCE_TARGET {
            return self.router.performance_enabled();
        }
        self.router
            .min_enabled_level()
            .is_some_and(|minimum| level >= minimum)
    }
}

impl<S> Layer<S> for SinkRouterLayer
where
    S: Subscriber,
{
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        // Spans carry no output of their own.
        metadata.is_span() || self.wants(metadata)
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let Some(level) = LogLevel::from_tracing(metadata.level()) else {
            return;
        };

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut log_event = LogEvent::new(level, visitor.message.unwrap_or_default())
            .with_correlation_id(correlation::current_id());
        log_event.target = metadata.target().to_string();
        log_event.fields = visitor.fields;
        log_event.error = visitor.error;

        self.router.emit(&log_event);
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
    error: Option<String>,
}

impl EventVisitor {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            "error" => {
                self.error = Some(value.clone());
                self.fields.push(("error".to_string(), value));
            }
            // Raw identifiers arrive with their prefix.
            name => {
                let name = name.strip_prefix("r#").unwrap_or(name);
                self.fields.push((name.to_string(), value));
            }
        }
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, LoggingSettings};
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn console_only() -> (Arc<SinkRouter>, SharedBuffer) {
        let store = Arc::new(ConfigStore::default());
        let mut logging = LoggingSettings::default();
        logging.app_log.enable = false;
        logging.app_json_log.enable = false;
        logging.performance_log.enable = false;
        logging.console_log.message_template =
            "[{Level:u3}] [{CorrelationId}] {Message}{NewLine}{Exception}".to_string();
        store.publish(logging).unwrap();

        let console = SharedBuffer::default();
        let router = Arc::new(SinkRouter::new(store).with_console_writer(console.clone()));
        (router, console)
    }

    #[test]
    fn events_reach_console_with_bound_fields() {
        let (router, console) = console_only();
        let subscriber = tracing_subscriber::registry().with(SinkRouterLayer::new(router));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(city = "Bangkok", "Forecast for {{city}}");
            tracing::debug!("below console minimum");
            tracing::error!(error = "disk full", "Write failed");
        });

        assert_eq!(
            console.contents(),
            "[INF] [] Forecast for Bangkok\n[ERR] [] Write failed\ndisk full\n"
        );
    }

    #[test]
    fn level_change_takes_effect_without_restart() {
        let (router, console) = console_only();
        let store = Arc::clone(router.store());
        let subscriber = tracing_subscriber::registry().with(SinkRouterLayer::new(router));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first");
            let mut logging = (**store.logging()).clone();
            logging.console_log.minimum_level = LogLevel::Warning;
            store.publish(logging).unwrap();
            tracing::info!("second");
            tracing::warn!("third");
        });

        assert_eq!(console.contents(), "[INF] [] first\n[WRN] [] third\n");
    }

    #[tokio::test]
    async fn events_inside_a_scope_carry_the_correlation_id() {
        let (router, console) = console_only();
        let subscriber = tracing_subscriber::registry().with(SinkRouterLayer::new(router));
        let _guard = tracing::subscriber::set_default(subscriber);

        let context = correlation::CorrelationContext::new(
            "abc123".to_string(),
            correlation::IdSource::Inbound,
        );
        correlation::scope(context, async {
            tracing::info!("inside");
        })
        .await;
        tracing::info!("outside");

        assert_eq!(console.contents(), "[INF] [abc123] inside\n[INF] [] outside\n");
    }
}
