//! Browser dispatch.
//!
//! Opens analytics URLs with the platform's default-browser launcher. The
//! url travels as a single argv element end to end; it is never interpolated
//! into a shell command line. Opens wait out a configurable delay (so a
//! burst of draft updates settles first), pass a rate limiter, and can be
//! cancelled while still delayed — a new session invalidates opens queued by
//! the old one.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::triggers::OpenIntent;
use crate::{AppError, Result};

/// Hard ceiling on browser opens, whatever the trigger configuration does.
const MAX_OPENS_PER_MINUTE: u32 = 20;

/// Seam for the actual browser invocation so tests can substitute a fake.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Opens URLs with the operating system's default handler.
pub struct SystemOpener;

#[async_trait]
impl UrlOpener for SystemOpener {
    async fn open(&self, url: &str) -> Result<()> {
        let mut command = launcher_command(url);
        let status = command
            .status()
            .await
            .map_err(|e| AppError::Dispatch(format!("failed to spawn launcher: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::Dispatch(format!("launcher exited with {status}")))
        }
    }
}

#[cfg(target_os = "macos")]
fn launcher_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(all(unix, not(target_os = "macos")))]
fn launcher_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn launcher_command(url: &str) -> Command {
    // `start` is a cmd.exe builtin and cmd parses the whole line itself: the
    // first quoted argument becomes the window title, so an empty "" keeps
    // the url out of that slot, and the url must be caret-escaped before it
    // reaches the parser.
    let mut command = Command::new("cmd");
    command.arg("/C").arg("start").arg("");
    command.raw_arg(windows_start_argument(url));
    command
}

/// Quote a url for the `cmd /C start "" <url>` form: every character cmd
/// treats as a metacharacter is caret-escaped and the result is wrapped in
/// double quotes. Newlines would end the command line and cannot appear in a
/// valid url, so they are stripped.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn windows_start_argument(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len() + 8);
    escaped.push('"');
    for c in url.chars() {
        match c {
            '&' | '|' | '<' | '>' | '^' | '%' | '$' | '`' | '"' | '\'' | ';' => {
                escaped.push('^');
                escaped.push(c);
            }
            '\n' | '\r' => {}
            _ => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

/// What happened to one queued open.
#[derive(Debug)]
pub struct DispatchReport {
    pub intent: OpenIntent,
    pub outcome: Result<()>,
}

/// Queues delayed, rate-shaped opens on the runtime.
pub struct Dispatcher {
    opener: Arc<dyn UrlOpener>,
    limiter: Arc<DefaultDirectRateLimiter>,
    cancel_tx: broadcast::Sender<()>,
    reports: mpsc::Sender<DispatchReport>,
}

impl Dispatcher {
    pub fn new(opener: Arc<dyn UrlOpener>, reports: mpsc::Sender<DispatchReport>) -> Self {
        let per_minute =
            NonZeroU32::new(MAX_OPENS_PER_MINUTE).unwrap_or(NonZeroU32::MIN);
        let (cancel_tx, _) = broadcast::channel(4);
        Self {
            opener,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            cancel_tx,
            reports,
        }
    }

    /// Queue one open after `delay`. Intents from the same update share the
    /// delay and then proceed concurrently. Cancellable until the delay has
    /// elapsed; once the launcher is invoked the open runs to completion.
    pub fn dispatch(&self, intent: OpenIntent, delay: Duration) {
        let opener = self.opener.clone();
        let limiter = self.limiter.clone();
        let reports = self.reports.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();

        tokio::spawn(async move {
            // Biased so a cancellation that raced the end of the delay wins.
            tokio::select! {
                biased;
                _ = cancel_rx.recv() => {
                    debug!(url = %intent.url, "pending open cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            limiter.until_ready().await;

            info!(feature = %intent.feature, url = %intent.url, "opening analytics page");
            let outcome = opener.open(&intent.url).await;
            if let Err(e) = &outcome {
                warn!(url = %intent.url, error = %e, "browser launch failed");
            }
            let _ = reports.send(DispatchReport { intent, outcome }).await;
        });
    }

    /// Cancel every open still waiting out its delay. Used on shutdown and
    /// at session boundaries: fingerprints of queued opens belong to the old
    /// session, so they must not fire into the new one.
    pub fn cancel_pending(&self) {
        let _ = self.cancel_tx.send(());
    }
}
