//! Bridge from `tracing` events to the log sink.
//!
//! Every event at or above the configured level becomes a [`LogRecord`]
//! annotated with the ambient request correlation, so application code only
//! ever writes `tracing::info!(...)`.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::correlation::RequestCorrelation;
use crate::observability::record::{value_text, LogLevel, LogRecord};
use crate::observability::sink::{SharedSink, INTERNAL_TARGET};

/// `tracing_subscriber` layer forwarding events to a [`SharedSink`].
pub struct SinkLayer {
    sink: SharedSink,
    min_level: tracing::Level,
}

impl SinkLayer {
    pub fn new(sink: SharedSink, min_level: tracing::Level) -> Self {
        Self { sink, min_level }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // More verbose levels compare greater.
        if *meta.level() > self.min_level || meta.target().starts_with(INTERNAL_TARGET) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(LogLevel::from(meta.level()), visitor.message.unwrap_or_default())
            .with_property("SourceContext", meta.target());

        if let Some(error) = visitor.fields.remove("error") {
            record = record.with_exception(value_text(&error));
        }
        for (name, value) in visitor.fields {
            record.properties.insert(name, value);
        }

        let record = RequestCorrelation::with_current(|c| {
            let mut r = record.clone().with_trace(c.trace.as_ref());
            r.enrich("CorrelationId", &Value::String(c.correlation_id.to_string()));
            if let Some(parent) = &c.parent_request_id {
                r.enrich("ParentRequestId", &Value::String(parent.to_string()));
            }
            if let Some(request_id) = &c.request_id {
                r.enrich("RequestId", &Value::String(request_id.clone()));
            }
            r
        })
        .unwrap_or(record);

        self.sink.write(record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_string(), Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.fields.insert(field.name().to_string(), Value::from(text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    use crate::correlation::context::CORRELATION_ID_HEADER;

    #[derive(Default)]
    struct Collect(Mutex<Vec<LogRecord>>);

    impl crate::observability::sink::LogSink for Collect {
        fn write(&self, record: LogRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn subscriber(sink: Arc<Collect>, level: tracing::Level) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(SinkLayer::new(sink, level))
    }

    #[test]
    fn test_event_fields_become_properties() {
        let sink = Arc::new(Collect::default());
        tracing::subscriber::with_default(subscriber(sink.clone(), tracing::Level::INFO), || {
            tracing::info!(client = "api2", attempt = 2_u64, "Calling downstream");
            tracing::debug!("filtered out");
            tracing::warn!(target: INTERNAL_TARGET, "sink internals are ignored");
        });

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.level, LogLevel::Information);
        assert_eq!(r.message, "Calling downstream");
        assert_eq!(r.property_text("client").as_deref(), Some("api2"));
        assert_eq!(r.property_text("attempt").as_deref(), Some("2"));
        assert!(r.properties.get("CorrelationId").is_none());
    }

    #[test]
    fn test_error_field_fills_exception() {
        let sink = Arc::new(Collect::default());
        tracing::subscriber::with_default(subscriber(sink.clone(), tracing::Level::INFO), || {
            tracing::error!(error = "connection reset", "Upstream error");
        });

        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].exception.as_deref(), Some("connection reset"));
        assert_eq!(records[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_ambient_correlation_is_attached() {
        let sink = Arc::new(Collect::default());
        let _guard = tracing::subscriber::set_default(subscriber(sink.clone(), tracing::Level::INFO));

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "chain-42".parse().unwrap());
        let ctx = RequestCorrelation::from_headers(&headers);

        ctx.scope(async {
            tokio::task::yield_now().await;
            tracing::info!("inside request");
        })
        .await;
        tracing::info!("outside request");

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].property_text("CorrelationId").as_deref(), Some("chain-42"));
        assert!(records[1].properties.get("CorrelationId").is_none());
    }
}
