//! Remote LED actuator.
//!
//! The LED server exposes two idempotent GET endpoints, one per state.
//! Requests are best effort: a failure is reported to the caller, which logs
//! it and carries on. Nothing here retries or tracks the actuator's real
//! state.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use crate::config::ActuatorSettings;
use crate::trigger::Actuation;

/// Sink for actuation commands.
pub trait Actuator {
    fn send(&mut self, actuation: Actuation) -> Result<()>;
}

/// HTTP GET actuator with a hard per-request timeout.
pub struct HttpActuator {
    agent: ureq::Agent,
    base_url: String,
    on_url: String,
    off_url: String,
}

impl HttpActuator {
    pub fn new(
        on_url: impl Into<String>,
        off_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        let on_url = on_url.into();
        Self {
            agent,
            base_url: on_url.clone(),
            on_url,
            off_url: off_url.into(),
        }
    }

    pub fn from_settings(settings: &ActuatorSettings) -> Self {
        let mut actuator = Self::new(&settings.on_url, &settings.off_url, settings.timeout);
        actuator.base_url = settings.base_url.clone();
        actuator
    }

    pub fn url_for(&self, actuation: Actuation) -> &str {
        match actuation {
            Actuation::TurnOn => &self.on_url,
            Actuation::TurnOff => &self.off_url,
        }
    }

    /// Check that the LED server answers on its base URL.
    pub fn probe(&self) -> Result<()> {
        self.get(&self.base_url)
            .with_context(|| format!("probe actuator at {}", self.base_url))
    }

    fn get(&self, url: &str) -> Result<()> {
        match self.agent.get(url).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(anyhow!("{} answered HTTP {}", url, code)),
            Err(e) => Err(anyhow!("request to {} failed: {}", url, e)),
        }
    }
}

impl Actuator for HttpActuator {
    fn send(&mut self, actuation: Actuation) -> Result<()> {
        let url = self.url_for(actuation).to_string();
        self.get(&url)
            .with_context(|| format!("send led {} command", actuation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve `count` requests with a fixed status, returning request lines.
    fn serve(status: &'static str, count: usize) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut lines = Vec::new();
            for _ in 0..count {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 1024];
                let n = stream.read(&mut buf).unwrap();
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                lines.push(request.lines().next().unwrap_or_default().to_string());
                let body = "LED";
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
            lines
        });
        (base, handle)
    }

    #[test]
    fn sends_on_and_off_to_their_endpoints() {
        let (base, handle) = serve("200 OK", 2);
        let mut actuator = HttpActuator::new(
            format!("{}/led/on", base),
            format!("{}/led/off", base),
            Duration::from_secs(1),
        );
        actuator.send(Actuation::TurnOn).unwrap();
        actuator.send(Actuation::TurnOff).unwrap();

        let lines = handle.join().unwrap();
        assert_eq!(lines[0], "GET /led/on HTTP/1.1");
        assert_eq!(lines[1], "GET /led/off HTTP/1.1");
    }

    #[test]
    fn error_status_is_reported() {
        let (base, handle) = serve("500 Internal Server Error", 1);
        let mut actuator = HttpActuator::new(
            format!("{}/led/on", base),
            format!("{}/led/off", base),
            Duration::from_secs(1),
        );
        let err = actuator.send(Actuation::TurnOn).unwrap_err();
        assert!(format!("{:#}", err).contains("500"));
        handle.join().unwrap();
    }

    #[test]
    fn unreachable_endpoint_is_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut actuator = HttpActuator::new(
            format!("http://{}/led/on", addr),
            format!("http://{}/led/off", addr),
            Duration::from_millis(200),
        );
        assert!(actuator.send(Actuation::TurnOff).is_err());
    }
}
