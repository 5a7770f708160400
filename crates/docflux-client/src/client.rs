use docflux_common::protocol::{
    decode_method_response, encode_method_call, ConvertError, Result, Value,
};
use docflux_common::transport::{HttpTransport, TransportTimeouts};
use tracing::debug;

use crate::job::{ConvertJob, ConvertOutput, JobBody};

/// Wire method for conversions.
const CONVERT_METHOD: &str = "convert";
/// Wire method for liveness probes.
const PROBE_METHOD: &str = "info";
/// Wire method for the format diagnostic.
const FORMATS_METHOD: &str = "getSupportedFormats";

/// Client for one conversion backend.
///
/// Every call opens its own TCP connection and closes it afterwards; the
/// client itself holds no connection state and is cheap to clone. It
/// never retries - each call reports a single error kind per attempt,
/// and retry policy lives with the balancer.
///
/// # Example
///
/// ```no_run
/// use docflux_client::{ConvertJob, ConverterClient};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ConverterClient::new("127.0.0.1", 2003);
/// let job = ConvertJob::stream(b"Hello".to_vec(), "pdf");
/// let output = client.convert(&job).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConverterClient {
    host: String,
    port: u16,
    transport: HttpTransport,
}

impl ConverterClient {
    /// Creates a client with default socket timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            transport: HttpTransport::new(),
        }
    }

    /// Creates a client with custom per-phase timeouts.
    pub fn with_timeouts(host: impl Into<String>, port: u16, timeouts: TransportTimeouts) -> Self {
        Self {
            host: host.into(),
            port,
            transport: HttpTransport::with_timeouts(timeouts),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Runs one conversion attempt.
    ///
    /// Stream jobs require a base64 value in the response and hand its
    /// raw text back; FilePath jobs acknowledge with the configured
    /// output path. A `<fault>` surfaces as [`ConvertError::Upstream`].
    pub async fn convert(&self, job: &ConvertJob) -> Result<ConvertOutput> {
        let call = encode_method_call(CONVERT_METHOD, &convert_params(job));
        let response = self.transport.post_xml(&self.host, self.port, &call).await?;
        let value = decode_method_response(&response.xml)?;

        match &job.body {
            JobBody::Stream { .. } => match value {
                Value::Base64(text) => Ok(ConvertOutput::Payload(text)),
                other => Err(ConvertError::MalformedResponse(format!(
                    "expected base64 payload, got {}",
                    other.type_name()
                ))),
            },
            JobBody::FilePath { output_path, .. } => Ok(ConvertOutput::Written(output_path.clone())),
        }
    }

    /// Liveness probe.
    ///
    /// True iff the status line shows `200 OK` and the body decodes
    /// without a fault. Never propagates an error - any connect, IO,
    /// timeout, parse or fault outcome is simply `false`.
    pub async fn ping(&self) -> bool {
        match self.try_ping().await {
            Ok(alive) => alive,
            Err(e) => {
                debug!(backend = %self.addr(), error = %e, "probe failed");
                false
            }
        }
    }

    async fn try_ping(&self) -> Result<bool> {
        let call = encode_method_call(PROBE_METHOD, &[]);
        let response = self.transport.post_xml(&self.host, self.port, &call).await?;
        if !response.is_success() {
            return Ok(false);
        }
        decode_method_response(&response.xml)?;
        Ok(true)
    }

    /// Asks the backend which output formats it supports. Diagnostic.
    pub async fn supported_formats(&self) -> Result<Vec<Value>> {
        let call = encode_method_call(FORMATS_METHOD, &[]);
        let response = self.transport.post_xml(&self.host, self.port, &call).await?;
        match decode_method_response(&response.xml)? {
            Value::Array(items) => Ok(items),
            other => Err(ConvertError::MalformedResponse(format!(
                "expected format list, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Builds the 8-slot `convert` parameter tuple.
///
/// Order on the wire: inpath, indata, outpath, convert_to, reserved,
/// filter_options, flag, reserved. Stream mode fills slot 2 and nils the
/// paths; FilePath mode fills slots 1 and 3 and nils the data.
fn convert_params(job: &ConvertJob) -> Vec<Value> {
    let (inpath, indata, outpath) = match &job.body {
        JobBody::Stream { data } => (Value::Nil, Value::base64_from_bytes(data), Value::Nil),
        JobBody::FilePath {
            input_path,
            output_path,
        } => (
            Value::String(input_path.clone()),
            Value::Nil,
            Value::String(output_path.clone()),
        ),
    };

    vec![
        inpath,
        indata,
        outpath,
        Value::String(job.output_format.clone()),
        Value::Nil,
        Value::Array(vec![]),
        Value::Bool(true),
        Value::Nil,
    ]
}
