//! Tracing subscriber initialization for parley processes.
//!
//! Session servers and dispatched units log inside `chat_session{bot, chat_id}`
//! and `update{bot, update_id}` spans; the subscriber installed here renders
//! those fields on every line and can bridge the spans to OpenTelemetry.
//!
//! ```no_run
//! // Human-readable logs only
//! parley_observe::tracing_setup::init_tracing(false).unwrap();
//!
//! // JSON logs plus OpenTelemetry spans on stdout
//! use parley_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing_with};
//! init_tracing_with(TracingOptions { format: LogFormat::Json, otel: true, ..Default::default() })
//!     .unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Kept so `shutdown_tracing` can flush buffered spans.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Line format of the `fmt` layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingOptions {
    pub format: LogFormat,
    /// Export spans through OpenTelemetry (stdout exporter).
    pub otel: bool,
    /// Directive applied when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            otel: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

/// Install the global subscriber with text output, optionally exporting spans.
pub fn init_tracing(enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_with(TracingOptions {
        otel: enable_otel,
        ..Default::default()
    })
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `options.default_filter`.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global subscriber
/// is already installed.
pub fn init_tracing_with(options: TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = build_filter(&options.default_filter)?;

    let otel_layer = if options.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("parley");
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let (text_layer, json_layer) = match options.format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()?;

    Ok(())
}

/// `RUST_LOG` if set and valid, otherwise `default`.
fn build_filter(default: &str) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(default)?),
    }
}

/// Flush pending spans and shut down the tracer provider.
///
/// A no-op when OpenTelemetry was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            tracing::warn!(error = %err, "tracer provider shutdown failed");
        }
    }
}
