use crate::error::LoggerError;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{SdkTracerProvider, TraceError},
};
use parking_lot::Mutex;

/// Handle over the installed global `OpenTelemetry` tracer provider.
///
/// Shutting down flushes batched spans; repeated calls are no-ops.
#[derive(Debug)]
pub struct OtlpTracer {
    provider: Mutex<Option<SdkTracerProvider>>,
}

impl OtlpTracer {
    /// Flushes and shuts down the tracer provider. Safe to call multiple
    /// times; only the first call reaches the exporter.
    ///
    /// # Errors
    /// Returns [`LoggerError::OpenTelemetry`] if the provider fails to
    /// flush its remaining spans.
    pub fn shutdown(&self) -> Result<(), LoggerError> {
        if let Some(provider) = self.provider.lock().take() {
            provider.shutdown().map_err(|source| LoggerError::OpenTelemetry {
                source: TraceError::Other(Box::new(source)),
                context: Some("Failed to shut down OTLP tracer provider".into()),
            })?;
        }
        Ok(())
    }

    /// Whether the provider is still installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.provider.lock().is_some()
    }
}

impl Drop for OtlpTracer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Installs an OTLP tracer provider and sets it as the global tracer provider.
///
/// With `endpoint` unset, the exporter respects the standard OTEL environment
/// variables such as `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`, and
/// `OTEL_RESOURCE_ATTRIBUTES`.
///
/// # Errors
/// Returns [`LoggerError::InvalidConfiguration`] if `service_name` is empty.
/// Returns [`LoggerError::OpenTelemetry`] if the OTLP pipeline fails to initialize.
pub fn init_otlp_tracer(
    service_name: impl Into<String>,
    endpoint: Option<&str>,
) -> Result<OtlpTracer, LoggerError> {
    let service_name = service_name.into();
    if service_name.trim().is_empty() {
        return Err(LoggerError::InvalidConfiguration {
            message: "service_name cannot be empty".into(),
            context: None,
        });
    }

    let resource = Resource::builder_empty()
        .with_attributes([KeyValue::new("service.name", service_name)])
        .build();

    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    let exporter = builder.build().map_err(|source| LoggerError::OpenTelemetry {
        source: TraceError::Other(Box::new(source)),
        context: Some("Failed to build OTLP span exporter".into()),
    })?;

    let provider =
        SdkTracerProvider::builder().with_batch_exporter(exporter).with_resource(resource).build();

    global::set_tracer_provider(provider.clone());

    Ok(OtlpTracer { provider: Mutex::new(Some(provider)) })
}
