use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use steam_server::RetryStrategy;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{ExecutorError, ExecutorResult};
use crate::protocol::SteamMessage;
use crate::starter::ExecutorStarter;
use crate::transport::SteamOutboxReceiver;

/// A WebSocket connection to Steam carrying one JSON message per text frame.
pub struct SteamConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SteamConnection {
    /// Connect to Steam, retrying the handshake according to the retry strategy.
    pub async fn connect(
        url: &str,
        token: Option<&str>,
        retry_strategy: &RetryStrategy,
    ) -> ExecutorResult<Self> {
        let stream = retry_strategy
            .run(|| Self::try_connect(url, token))
            .await?;
        Ok(Self { stream })
    }

    async fn try_connect(
        url: &str,
        token: Option<&str>,
    ) -> ExecutorResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let mut request = url.into_client_request()?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ExecutorError::InvalidArgument(format!("Steam token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (stream, response) = connect_async(request).await?;
        info!("connected to Steam at {url} with status {}", response.status());
        Ok(stream)
    }

    /// Exchange messages between Steam and the executor starter until either side closes.
    ///
    /// Incoming frames are delivered in receipt order.
    /// Frames that are not valid Steam messages are skipped.
    pub async fn serve(
        self,
        starter: ExecutorStarter,
        mut outbox: SteamOutboxReceiver,
    ) -> ExecutorResult<()> {
        let (mut sink, mut source) = self.stream.split();
        loop {
            tokio::select! {
                message = outbox.recv() => {
                    let Some(message) = message else {
                        info!("no more messages for Steam, closing the connection");
                        let _ = sink.close().await;
                        return Ok(());
                    };
                    let text = message.to_json()?;
                    debug!("sending to Steam: {text}");
                    sink.send(Message::text(text)).await?;
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            debug!("received from Steam: {}", text.as_str());
                            match SteamMessage::from_json(text.as_str()) {
                                Ok(message) => starter.deliver(message).await?,
                                Err(e) => warn!("ignoring message from Steam: {e}"),
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Steam closed the connection: {frame:?}");
                            return Ok(());
                        }
                        // Pings are answered by the WebSocket library.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("the Steam connection has ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
