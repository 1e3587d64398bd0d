use std::time::Duration;

use anyhow::Context as _;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("not found (404)")]
    NotFound,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::from_status(status);
        }
        Self::Transport(format!("{err:#}"))
    }
}

impl FetchError {
    fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::NOT_FOUND {
            Self::NotFound
        } else {
            Self::Status(status.as_u16())
        }
    }
}

/// Anything that can return the HTML body for a URL.
pub trait PageSource {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::blocking::Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("vidharvest/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        let body = response.text()?;
        tracing::debug!(url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    fn spawn_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let response = match request.url() {
                    "/ok" => tiny_http::Response::from_string("<html>ok</html>"),
                    "/moved" => tiny_http::Response::from_string("")
                        .with_status_code(302)
                        .with_header(
                            tiny_http::Header::from_bytes(&b"Location"[..], &b"/ok"[..])
                                .expect("location header"),
                        ),
                    "/busy" => tiny_http::Response::from_string("slow down").with_status_code(429),
                    "/slow" => {
                        thread::sleep(Duration::from_millis(600));
                        tiny_http::Response::from_string("late")
                    }
                    _ => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        (base_url, shutdown_tx, handle)
    }

    #[test]
    fn classifies_responses() {
        let (base_url, shutdown_tx, handle) = spawn_server();
        let source = HttpPageSource::new(Duration::from_millis(300)).unwrap();

        assert_eq!(
            source.fetch(&format!("{base_url}/ok")).unwrap(),
            "<html>ok</html>"
        );
        assert_eq!(
            source.fetch(&format!("{base_url}/moved")).unwrap(),
            "<html>ok</html>"
        );
        assert_eq!(
            source.fetch(&format!("{base_url}/missing")),
            Err(FetchError::NotFound)
        );
        assert_eq!(
            source.fetch(&format!("{base_url}/busy")),
            Err(FetchError::Status(429))
        );
        assert_eq!(
            source.fetch(&format!("{base_url}/slow")),
            Err(FetchError::Timeout)
        );

        let _ = shutdown_tx.send(());
        let _ = handle.join();
    }

    #[test]
    fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpPageSource::new(Duration::from_secs(2)).unwrap();
        let err = source.fetch(&format!("http://{addr}/")).unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
    }
}
