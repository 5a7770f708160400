use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::protocol::error::{ConvertError, Result};

/// Default timeout for each socket phase (5 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminator of the XML body, included in the slice handed to the codec.
const RESPONSE_END: &[u8] = b"</methodResponse>";

/// Per-phase socket timeouts.
///
/// Connect, write and read are bounded independently; whichever phase
/// stalls surfaces as [`ConvertError::Timeout`] for that phase.
#[derive(Debug, Clone)]
pub struct TransportTimeouts {
    pub connect: Duration,
    pub write: Duration,
    pub read: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_TIMEOUT,
            write: DEFAULT_TIMEOUT,
            read: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP transport for XML-RPC calls.
///
/// One TCP connection per call, no pooling and no pipelining. The request
/// is a hand-framed `POST /` with `Connection: close`, so the peer closes
/// the socket after the response and the reader can simply drain to EOF.
///
/// # Wire format
///
/// ```text
/// POST / HTTP/1.1
/// Host: <host>:<port>
/// Content-Type: text/xml
/// Content-Length: <n>
/// Connection: close
///
/// <?xml version="1.0"?><methodCall>...</methodCall>
/// ```
///
/// The response body begins after the first `\r\n\r\n`; the XML document
/// spans `<?xml` through `</methodResponse>` inclusive.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    timeouts: TransportTimeouts,
}

/// A decoded-enough HTTP reply: the status line plus the XML body slice.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_line: String,
    pub xml: Vec<u8>,
}

impl HttpResponse {
    /// Success per the probe contract: the status line shows `200 OK`.
    pub fn is_success(&self) -> bool {
        self.status_line.contains("200 OK")
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeouts(timeouts: TransportTimeouts) -> Self {
        Self { timeouts }
    }

    /// Round-trips one XML-RPC document against `host:port`.
    ///
    /// The socket is scoped to this call and closed on every exit path
    /// when `stream` drops.
    pub async fn post_xml(&self, host: &str, port: u16, body: &str) -> Result<HttpResponse> {
        let mut stream = self.connect(host, port).await?;

        let request = build_request(host, port, body);
        match timeout(self.timeouts.write, stream.write_all(request.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ConvertError::Send(e.to_string())),
            Err(_) => return Err(ConvertError::Timeout(self.timeouts.write.as_millis() as u64)),
        }
        match timeout(self.timeouts.write, stream.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ConvertError::Send(e.to_string())),
            Err(_) => return Err(ConvertError::Timeout(self.timeouts.write.as_millis() as u64)),
        }

        let mut raw = Vec::new();
        match timeout(self.timeouts.read, stream.read_to_end(&mut raw)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ConvertError::Recv(e.to_string())),
            Err(_) => return Err(ConvertError::Timeout(self.timeouts.read.as_millis() as u64)),
        }
        if raw.is_empty() {
            return Err(ConvertError::Recv("empty response".to_string()));
        }
        debug!(host, port, bytes = raw.len(), "response received");

        parse_response(&raw)
    }

    /// Connects to the first resolvable address for `host:port`.
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addrs = (host, port).to_socket_addrs().map_err(|e| {
            ConvertError::Connect(format!("invalid address '{}:{}': {}", host, port, e))
        })?;

        let mut last_err = None;
        for addr in addrs {
            match timeout(self.timeouts.connect, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => last_err = Some(ConvertError::Connect(e.to_string())),
                Err(_) => {
                    last_err = Some(ConvertError::Timeout(
                        self.timeouts.connect.as_millis() as u64,
                    ))
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ConvertError::Connect(format!("no addresses resolved for {}:{}", host, port))
        }))
    }
}

fn build_request(host: &str, port: u16, body: &str) -> String {
    format!(
        "POST / HTTP/1.1\r\nHost: {}:{}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        host,
        port,
        body.len(),
        body
    )
}

fn parse_response(raw: &[u8]) -> Result<HttpResponse> {
    let header_end = find(raw, b"\r\n\r\n").ok_or_else(|| {
        ConvertError::MalformedResponse("missing HTTP header terminator".to_string())
    })?;

    let headers = &raw[..header_end];
    let status_line = match find(headers, b"\r\n") {
        Some(end) => String::from_utf8_lossy(&headers[..end]).into_owned(),
        None => String::from_utf8_lossy(headers).into_owned(),
    };

    let body = &raw[header_end + 4..];
    let xml_start = find(body, b"<?xml").ok_or_else(|| {
        ConvertError::MalformedResponse("no XML declaration in body".to_string())
    })?;
    let xml_end = find(&body[xml_start..], RESPONSE_END)
        .ok_or_else(|| {
            ConvertError::MalformedResponse("body missing </methodResponse>".to_string())
        })?
        + xml_start
        + RESPONSE_END.len();

    Ok(HttpResponse {
        status_line,
        xml: body[xml_start..xml_end].to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const BODY: &str = "<?xml version=\"1.0\"?><methodResponse><params><param>\
        <value><string>ok</string></value></param></params></methodResponse>";

    async fn canned_server(status: &'static str, body: &'static str) -> (String, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "{}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });
        (addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_post_xml_round_trip() {
        let (host, port) = canned_server("HTTP/1.1 200 OK", BODY).await;
        let transport = HttpTransport::new();
        let response = transport.post_xml(&host, port, "<x/>").await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.status_line, "HTTP/1.1 200 OK");
        assert_eq!(response.xml, BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_post_xml_captures_error_status() {
        let (host, port) = canned_server("HTTP/1.1 500 Internal Server Error", BODY).await;
        let transport = HttpTransport::new();
        let response = transport.post_xml(&host, port, "<x/>").await.unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connect_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new();
        let err = transport.post_xml("127.0.0.1", port, "<x/>").await.unwrap_err();
        assert!(matches!(err, ConvertError::Connect(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_silent_server_maps_to_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                // Hold the socket open without replying.
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(socket);
            }
        });

        let transport = HttpTransport::with_timeouts(TransportTimeouts {
            connect: Duration::from_secs(1),
            write: Duration::from_secs(1),
            read: Duration::from_millis(100),
        });
        let err = transport
            .post_xml(&addr.ip().to_string(), addr.port(), "<x/>")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_response_without_header_terminator_is_malformed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(b"HTTP/1.1 200 OK\r\ntruncated").await;
            }
        });

        let transport = HttpTransport::new();
        let err = transport
            .post_xml(&addr.ip().to_string(), addr.port(), "<x/>")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedResponse(_)), "got {:?}", err);
    }

    #[test]
    fn test_parse_response_slices_through_terminator() {
        let raw = format!(
            "HTTP/1.1 200 OK\r\nServer: conv\r\n\r\nnoise {} trailing garbage",
            BODY
        );
        let response = parse_response(raw.as_bytes()).unwrap();
        assert_eq!(response.xml, BODY.as_bytes());
    }

    #[test]
    fn test_parse_response_requires_xml_declaration() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\n<html>not xml-rpc</html>";
        assert!(matches!(
            parse_response(raw),
            Err(ConvertError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_framing() {
        let request = build_request("conv1.internal", 2003, "<body/>");
        assert!(request.starts_with("POST / HTTP/1.1\r\n"));
        assert!(request.contains("Host: conv1.internal:2003\r\n"));
        assert!(request.contains("Content-Type: text/xml\r\n"));
        assert!(request.contains("Content-Length: 7\r\n"));
        assert!(request.contains("Connection: close\r\n\r\n<body/>"));
    }
}
