//! WebSocket event stream from the client.
//!
//! One subscription frame requests every JSON API event; the client then
//! pushes frames of the shape `[8, "OnJsonApiEvent", {uri, eventType, data}]`
//! until the socket closes. Frame-level parsing happens here; mapping onto
//! domain events is the decoder's job.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::header::{HeaderValue, AUTHORIZATION},
        Message,
    },
    Connector,
};
use tracing::{debug, info, warn};

use crate::lcu::Credentials;
use crate::{AppError, Result};

/// Raw pushed event: the resource URI, `Create`/`Update`/`Delete`, and the
/// resource payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LcuEvent {
    pub uri: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

/// A live subscription to the client's event feed.
pub struct EventStream {
    event_rx: mpsc::Receiver<LcuEvent>,
    reader: JoinHandle<()>,
}

impl EventStream {
    /// Connect, authenticate the handshake, and subscribe to all events.
    pub async fn connect(credentials: &Credentials) -> Result<Self> {
        let url = credentials.ws_url();
        debug!(%url, "connecting event stream");

        let mut request = url
            .into_client_request()
            .map_err(|e| AppError::Transport(format!("invalid WebSocket request: {e}")))?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&credentials.auth_header())
                .map_err(|e| AppError::Transport(format!("invalid auth header: {e}")))?,
        );

        let connector = Connector::Rustls(Arc::new(loopback_tls_config()));
        let (ws_stream, _response) =
            connect_async_tls_with_config(request, None, false, Some(connector))
                .await
                .map_err(|e| match e {
                    tungstenite::Error::Http(response)
                        if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
                    {
                        AppError::Auth
                    }
                    other => AppError::Transport(format!("WebSocket connect failed: {other}")),
                })?;

        let (mut write, mut read) = ws_stream.split();

        // Opcode 5 = subscribe. One subscription covers every JSON API event.
        write
            .send(Message::Text(r#"[5, "OnJsonApiEvent"]"#.into()))
            .await
            .map_err(|e| AppError::Transport(format!("subscription failed: {e}")))?;
        info!("subscribed to client events");

        let (event_tx, event_rx) = mpsc::channel::<LcuEvent>(256);
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_frame(&text) {
                            if event_tx.send(event).await.is_err() {
                                debug!("event receiver dropped, stopping reader");
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("event stream closed by client");
                        break;
                    }
                    Ok(_) => {} // ping/pong/binary
                    Err(e) => {
                        warn!(error = %e, "event stream read error");
                        break;
                    }
                }
            }
        });

        Ok(Self { event_rx, reader })
    }

    /// Next pushed event; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<LcuEvent> {
        self.event_rx.recv().await
    }

    /// Tear the connection down. Also happens on drop.
    pub fn close(&self) {
        self.reader.abort();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// TLS config accepting the client's ephemeral self-signed certificate.
/// Only ever used against loopback; every remote connection in this crate
/// verifies normally.
fn loopback_tls_config() -> rustls::ClientConfig {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::DigitallySignedStruct;

    #[derive(Debug)]
    struct AcceptAnyCert;

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            vec![
                rustls::SignatureScheme::RSA_PKCS1_SHA256,
                rustls::SignatureScheme::RSA_PKCS1_SHA384,
                rustls::SignatureScheme::RSA_PKCS1_SHA512,
                rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
                rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
                rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
                rustls::SignatureScheme::RSA_PSS_SHA256,
                rustls::SignatureScheme::RSA_PSS_SHA384,
                rustls::SignatureScheme::RSA_PSS_SHA512,
                rustls::SignatureScheme::ED25519,
            ]
        }
    }

    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth()
}

/// Parse one wire frame. Event frames are `[8, name, payload]`; everything
/// else (acks, heartbeats) is ignored.
fn parse_frame(text: &str) -> Option<LcuEvent> {
    let parsed: serde_json::Value = serde_json::from_str(text).ok()?;
    let frame = parsed.as_array()?;

    let opcode = frame.first()?.as_u64()?;
    if opcode != 8 {
        return None;
    }

    let payload = frame.get(2)?;
    Some(LcuEvent {
        uri: payload.get("uri")?.as_str()?.to_string(),
        event_type: payload.get("eventType")?.as_str()?.to_string(),
        data: payload.get("data")?.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_frame() {
        let frame = r#"[8,"OnJsonApiEvent",{"data":"InProgress","eventType":"Update","uri":"/lol-gameflow/v1/gameflow-phase"}]"#;
        let event = parse_frame(frame).unwrap();
        assert_eq!(event.uri, "/lol-gameflow/v1/gameflow-phase");
        assert_eq!(event.event_type, "Update");
        assert_eq!(event.data, serde_json::json!("InProgress"));
    }

    #[test]
    fn test_non_event_opcodes_are_ignored() {
        assert!(parse_frame(r#"[5,"OnJsonApiEvent"]"#).is_none());
        assert!(parse_frame(r#"[0,"ack"]"#).is_none());
    }

    #[test]
    fn test_garbage_frames_are_ignored() {
        assert!(parse_frame("not json").is_none());
        assert!(parse_frame(r#"{"uri":"x"}"#).is_none());
        assert!(parse_frame(r#"[8,"OnJsonApiEvent"]"#).is_none());
    }
}
