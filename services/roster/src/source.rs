use std::{io::Read, time::Duration};

use tracing::debug;
use ureq::{
    Agent,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use url::Url;

use crate::RosterError;

/// Response of a source fetch, body not yet consumed.
pub struct FetchedSource {
    /// Every `Content-Type` header value, in order.
    pub content_types: Vec<String>,
    /// Declared `Content-Length`, when present and numeric.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl FetchedSource {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            content_types: Vec::new(),
            content_length: Some(bytes.len() as u64),
            body: Box::new(std::io::Cursor::new(bytes)),
        }
    }
}

/// Opens the feed behind a caller-supplied URL.
pub trait SourceFetcher: Send + Sync {
    /// Fails with [`RosterError::SourceUnavailable`] on transport errors and
    /// non-success statuses.
    fn fetch(&self, url: &Url) -> Result<FetchedSource, RosterError>;
}

/// Blocking HTTP(S) GET.
pub struct HttpSourceFetcher {
    agent: Agent,
}

impl Default for HttpSourceFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpSourceFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl SourceFetcher for HttpSourceFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedSource, RosterError> {
        let response =
            self.agent
                .get(url.as_str())
                .call()
                .map_err(|err| RosterError::SourceUnavailable {
                    status: None,
                    detail: format!("status code: 0 error: {err}"),
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RosterError::SourceUnavailable {
                status: Some(status.as_u16()),
                detail: format!("status code: {}", status.as_u16()),
            });
        }

        let content_types = response
            .headers()
            .get_all(CONTENT_TYPE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect::<Vec<_>>();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        debug!(
            %url,
            status = status.as_u16(),
            ?content_length,
            ?content_types,
            "fetched source"
        );

        Ok(FetchedSource {
            content_types,
            content_length,
            body: Box::new(response.into_body().into_reader()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread,
    };

    fn serve_once(response: &'static str) -> (Url, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
        });
        let url = Url::parse(&format!("http://{addr}/people.txt")).unwrap();
        (url, handle)
    }

    #[test]
    fn fetch_reports_headers_and_streams_body() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 9\r\nConnection: close\r\n\r\nDoe John\n",
        );
        let mut source = HttpSourceFetcher::default().fetch(&url).unwrap();
        let mut body = String::new();
        source.body.read_to_string(&mut body).unwrap();
        server.join().unwrap();

        assert_eq!(source.content_types, vec!["text/plain"]);
        assert_eq!(source.content_length, Some(9));
        assert_eq!(body, "Doe John\n");
    }

    #[test]
    fn fetch_maps_non_success_status() {
        let (url, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let err = HttpSourceFetcher::default().fetch(&url).err().unwrap();
        server.join().unwrap();

        assert_eq!(
            err,
            RosterError::SourceUnavailable {
                status: Some(404),
                detail: "status code: 404".into(),
            }
        );
    }

    #[test]
    fn fetch_maps_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/gone")).unwrap();

        let err = HttpSourceFetcher::default().fetch(&url).err().unwrap();
        assert!(matches!(
            err,
            RosterError::SourceUnavailable { status: None, ref detail } if detail.starts_with("status code: 0 error:")
        ));
    }
}
