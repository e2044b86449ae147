//! WebSocket transport
//!
//! Single WebSocket per remote. Text frames carry envelopes; binary frames
//! are passed on as lossy UTF-8 and left to the decoder to reject.

use async_trait::async_trait;
use futures_util::stream::{self, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use url::Url;

use super::{FrameSink, Transport, TransportError};

/// Open a WebSocket to a `ws://` or `wss://` endpoint.
pub async fn connect(endpoint: &str) -> Result<Transport, TransportError> {
    let url = Url::parse(endpoint)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
    }

    let (ws_stream, _) = connect_async(url.as_str()).await?;
    tracing::info!(endpoint = %url, "WebSocket connected");
    Ok(from_stream(ws_stream))
}

/// Wrap an already established WebSocket.
pub fn from_stream<S>(ws_stream: WebSocketStream<S>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws_stream.split();
    Transport::new(WsSink { sink }, inbound_frames(stream))
}

struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.sink.send(Message::Text(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await?;
        Ok(())
    }
}

fn inbound_frames<S>(stream: SplitStream<WebSocketStream<S>>) -> super::FrameStream
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // State goes to None after an error so the stream ends right after it.
    stream::unfold(Some(stream), |state| async move {
        let mut stream = state?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some((Ok(text), Some(stream))),
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    return Some((Ok(text), Some(stream)));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "WebSocket closed by peer");
                    return None;
                }
                // Ping/Pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some((Err(TransportError::from(e)), None)),
                None => return None,
            }
        }
    })
    .boxed()
}
