//! Authentication handshake
//!
//! The server speaks first: `auth_required`, then the client sends its
//! token and the server answers `auth_ok` or `auth_invalid`. Anything else
//! at either step aborts the attempt.

use hass_core::config::AccessToken;
use hass_core::{ClientError, ConnectionState};
use hass_protocol::{decode, encode, ClientMessage, ServerMessage};

use crate::state::StateMachine;
use crate::transport::{WsFrame, WsReader, WsWriter};

/// Run the handshake over a freshly opened socket
///
/// Expects the state machine in `Connecting` and leaves it in
/// `Authenticating`; the caller moves it to `Connected` once the
/// connection tasks are running. Returns the server version, if advertised.
pub(crate) async fn authenticate(
    state: &StateMachine,
    writer: &mut WsWriter,
    reader: &mut WsReader,
    token: &AccessToken,
) -> Result<Option<String>, ClientError> {
    match next_message(reader).await? {
        ServerMessage::AuthRequired { ha_version } => {
            tracing::debug!(
                "Server requested authentication (version {})",
                ha_version.as_deref().unwrap_or("unknown")
            );
        }
        other => {
            return Err(ClientError::UnexpectedHandshake(format!(
                "expected auth_required, got {}",
                other.type_name()
            )));
        }
    }

    state
        .transition_from(ConnectionState::Connecting, ConnectionState::Authenticating)
        .map_err(|_| ClientError::ConnectionClosed)?;

    let auth = ClientMessage::Auth {
        access_token: token.expose().to_string(),
    };
    writer.send_text(encode(&auth)?).await?;

    match next_message(reader).await? {
        ServerMessage::AuthOk { ha_version } => Ok(ha_version),
        ServerMessage::AuthInvalid { message } => Err(ClientError::AuthenticationFailed(
            message.unwrap_or_else(|| "invalid access token".to_string()),
        )),
        other => Err(ClientError::UnexpectedHandshake(format!(
            "expected auth_ok or auth_invalid, got {}",
            other.type_name()
        ))),
    }
}

/// Read until the next text frame and decode it
async fn next_message(reader: &mut WsReader) -> Result<ServerMessage, ClientError> {
    loop {
        match reader.recv().await {
            Some(Ok(WsFrame::Text(text))) => {
                return decode(&text).map_err(|e| {
                    ClientError::UnexpectedHandshake(format!("malformed frame: {}", e))
                });
            }
            Some(Ok(WsFrame::Close { code, reason })) => {
                return Err(ClientError::Transport(format!(
                    "server closed the connection during handshake ({} {})",
                    code, reason
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(ClientError::Transport(
                    "connection ended during handshake".to_string(),
                ));
            }
        }
    }
}
