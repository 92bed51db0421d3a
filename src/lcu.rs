//! Client discovery and authenticated REST transport.
//!
//! The client advertises an ephemeral port and token on its own command
//! line; when that is unreadable we fall back to the lockfile next to the
//! install. Either way the credentials live exactly as long as the client
//! process and are reacquired from scratch on any transport failure.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use reqwest::{Client, StatusCode};
use sysinfo::System;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Executable name of the client process across platforms.
const CLIENT_PROCESS: &str = "LeagueClientUx";

/// Ceiling for every REST request against the client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection material for one client process.
///
/// Immutable once acquired; the generation is bumped on every reacquisition
/// so stale credentials are distinguishable after a client restart.
#[derive(Clone)]
pub struct Credentials {
    pub port: u16,
    pub auth_token: String,
    pub protocol: String,
    pub generation: u64,
}

impl Credentials {
    /// The client only listens on loopback.
    pub fn base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.protocol, self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("wss://127.0.0.1:{}", self.port)
    }

    /// Basic auth header; the username is always the literal `riot`.
    pub fn auth_header(&self) -> String {
        let credentials = format!("riot:{}", self.auth_token);
        format!("Basic {}", BASE64.encode(credentials.as_bytes()))
    }
}

// Hand-written so the token can never end up in a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("port", &self.port)
            .field("auth_token", &"<redacted>")
            .field("protocol", &self.protocol)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Finds the running client and yields valid credentials, or fails cleanly.
pub struct ClientLocator {
    generation: AtomicU64,
}

impl ClientLocator {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
        }
    }

    /// Locate the client and extract credentials.
    ///
    /// `ClientNotRunning` is the retryable "keep waiting" outcome; parse and
    /// permission failures mean a client was found but could not be read.
    pub fn acquire(&self) -> Result<Credentials> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut found_process = false;
        match Self::from_process() {
            Ok(Some((port, token))) => {
                info!(port, generation, "credentials read from client command line");
                return Ok(Credentials {
                    port,
                    auth_token: token,
                    protocol: "https".to_string(),
                    generation,
                });
            }
            Ok(None) => {}
            Err(e) => {
                // A client is running but its command line gave us nothing
                // usable; the lockfile may still work.
                debug!(error = %e, "command line unreadable, trying lockfile");
                found_process = true;
            }
        }

        match Self::from_lockfile() {
            Ok(Some(credentials)) => {
                info!(port = credentials.0, generation, "credentials read from lockfile");
                Ok(Credentials {
                    port: credentials.0,
                    auth_token: credentials.1,
                    protocol: credentials.2,
                    generation,
                })
            }
            Ok(None) if found_process => Err(AppError::ParseError(
                "client process found but neither command line nor lockfile is readable".into(),
            )),
            Ok(None) => Err(AppError::ClientNotRunning),
            Err(e) => Err(e),
        }
    }

    /// Scan the process table for the client and parse its command line.
    /// `Ok(None)` means no client process exists.
    fn from_process() -> Result<Option<(u16, String)>> {
        let system = System::new_all();
        let Some(process) = system
            .processes()
            .values()
            .find(|process| process.name().contains(CLIENT_PROCESS))
        else {
            return Ok(None);
        };

        let cmdline = process.cmd().join(" ");
        if cmdline.is_empty() {
            return Err(AppError::PermissionDenied(
                "client command line is empty or unreadable".into(),
            ));
        }
        Self::parse_command_line(&cmdline).map(Some)
    }

    /// Extract `--app-port` and `--remoting-auth-token` from a command line.
    /// Arguments may arrive quoted depending on how the platform reports
    /// them, hence the regex rather than simple prefix matching.
    fn parse_command_line(cmdline: &str) -> Result<(u16, String)> {
        let port_re = Regex::new(r#"--app-port[=\s]+["']?(\d{1,5})"#)
            .map_err(|e| AppError::ParseError(format!("regex error: {e}")))?;
        let token_re = Regex::new(r#"--remoting-auth-token[=\s]+["']?([A-Za-z0-9+/=_-]+)"#)
            .map_err(|e| AppError::ParseError(format!("regex error: {e}")))?;

        let port = port_re
            .captures(cmdline)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .ok_or_else(|| AppError::ParseError("--app-port missing from command line".into()))?;
        let token = token_re
            .captures(cmdline)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                AppError::ParseError("--remoting-auth-token missing from command line".into())
            })?;

        Ok((port, token))
    }

    /// Read the lockfile next to the installed client.
    /// `Ok(None)` means no lockfile was found anywhere we know to look.
    fn from_lockfile() -> Result<Option<(u16, String, String)>> {
        for path in Self::lockfile_candidates() {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    AppError::PermissionDenied(path.display().to_string())
                } else {
                    AppError::Io(e)
                }
            })?;
            debug!(path = %path.display(), "parsing lockfile");
            return Self::parse_lockfile(&content).map(Some);
        }
        Ok(None)
    }

    fn lockfile_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        // The command line knows where the client lives even when the
        // credential arguments are absent.
        let system = System::new_all();
        if let Some(process) = system
            .processes()
            .values()
            .find(|process| process.name().contains(CLIENT_PROCESS))
        {
            if let Ok(re) = Regex::new(r#"--install-directory[=\s]+["']?([^"']+?)["']?(?:\s|$)"#) {
                let cmdline = process.cmd().join(" ");
                if let Some(caps) = re.captures(&cmdline) {
                    if let Some(dir) = caps.get(1) {
                        candidates.push(PathBuf::from(dir.as_str()).join("lockfile"));
                    }
                }
            }
        }

        #[cfg(target_os = "windows")]
        candidates.extend(
            [
                "C:\\Riot Games\\League of Legends",
                "D:\\Riot Games\\League of Legends",
                "C:\\Program Files\\Riot Games\\League of Legends",
                "C:\\Program Files (x86)\\Riot Games\\League of Legends",
            ]
            .iter()
            .map(|p| PathBuf::from(p).join("lockfile")),
        );

        #[cfg(target_os = "macos")]
        candidates.push(PathBuf::from(
            "/Applications/League of Legends.app/Contents/LoL/lockfile",
        ));

        #[cfg(all(unix, not(target_os = "macos")))]
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(
                PathBuf::from(home).join(".config/riot-games/league-of-legends/lockfile"),
            );
        }

        candidates
    }

    /// Format: `name:pid:port:token:protocol`.
    fn parse_lockfile(content: &str) -> Result<(u16, String, String)> {
        let parts: Vec<&str> = content.trim().split(':').collect();
        if parts.len() < 5 {
            return Err(AppError::ParseError(format!(
                "lockfile has {} fields, expected 5",
                parts.len()
            )));
        }

        let port = parts[2]
            .parse::<u16>()
            .map_err(|_| AppError::ParseError(format!("invalid port in lockfile: {}", parts[2])))?;

        Ok((port, parts[3].to_string(), parts[4].to_string()))
    }
}

impl Default for ClientLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticated REST client against the local endpoint.
pub struct RestClient {
    credentials: Credentials,
    client: Client,
}

impl RestClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        // The endpoint presents an ephemeral self-signed certificate, so
        // verification is disabled — acceptable only because `base_url`
        // pins the host to loopback. Anything talking to a remote host
        // (the CDN refresh) uses a normally-verifying client instead.
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            credentials,
            client,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// GET a client resource as JSON.
    ///
    /// 401 maps to `Auth` (reacquire credentials), 404 to `NotInPhase`
    /// ("no data", not an error for session resources); connect and read
    /// failures surface as `Transport` for the supervisor.
    pub async fn get(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.credentials.base_url(), path);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.credentials.auth_header())
            .send()
            .await
            .map_err(|e| {
                warn!(path, error = %e, "request to client failed");
                AppError::Transport(e.to_string())
            })?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| AppError::Decode(format!("{path}: {e}"))),
            StatusCode::UNAUTHORIZED => Err(AppError::Auth),
            StatusCode::NOT_FOUND => Err(AppError::NotInPhase),
            status => Err(AppError::Http(status.as_u16())),
        }
    }
}
