//! Conversion job types.

/// How the document travels to and from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum JobBody {
    /// Document bytes go inline (base64 on the wire) and the converted
    /// payload comes back inline.
    Stream { data: Vec<u8> },
    /// The backend reads the input and writes the output on its own
    /// filesystem; the response is an acknowledgement.
    FilePath {
        input_path: String,
        output_path: String,
    },
}

/// One conversion to run against a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertJob {
    pub body: JobBody,
    /// Target format, e.g. `"pdf"`.
    pub output_format: String,
}

impl ConvertJob {
    /// Stream-mode job: bytes in, payload out.
    pub fn stream(data: impl Into<Vec<u8>>, output_format: impl Into<String>) -> Self {
        Self {
            body: JobBody::Stream { data: data.into() },
            output_format: output_format.into(),
        }
    }

    /// FilePath-mode job: the backend reads `input_path` and writes
    /// `output_path` itself.
    pub fn file_path(
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            body: JobBody::FilePath {
                input_path: input_path.into(),
                output_path: output_path.into(),
            },
            output_format: output_format.into(),
        }
    }
}

/// Result of a conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertOutput {
    /// Raw base64 payload of a Stream-mode conversion. Decoding to bytes
    /// is left to the caller.
    Payload(String),
    /// Acknowledged output path of a FilePath-mode conversion.
    Written(String),
}

impl ConvertOutput {
    pub fn into_inner(self) -> String {
        match self {
            ConvertOutput::Payload(text) => text,
            ConvertOutput::Written(path) => path,
        }
    }
}
