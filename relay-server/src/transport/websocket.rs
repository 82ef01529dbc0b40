//! WebSocket transport over tokio-tungstenite.

use super::{FrameSink, FrameSource, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Read half of a websocket connection.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// Write half of a websocket connection.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

/// Websocket settings derived from the relay's frame limit.
pub fn ws_config(max_frame_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_frame_size);
    config.max_frame_size = Some(max_frame_size);
    config
}

/// Split an upgraded websocket into relay transport halves.
pub fn split<S>(ws: WebSocketStream<S>) -> (WsSource<S>, WsSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (WsSource { stream }, WsSink { sink })
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(WsError::Capacity(e))) => {
                    tracing::debug!("Oversized frame: {}", e);
                    return Err(TransportError::FrameTooLarge);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            };

            match message {
                Message::Binary(data) => return Ok(Some(data)),
                Message::Text(text) => return Ok(Some(text.into_bytes())),
                Message::Close(_) => return Ok(None),
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        // Encoded envelopes are ASCII, so they go out as text frames.
        let message = match String::from_utf8(frame) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };
        self.sink.send(message).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            other => TransportError::SendFailed(other.to_string()),
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn text_and_binary_frames_are_read() {
        let (server, mut client) = ws_pair().await;
        let (mut source, _sink) = split(server);

        client.send(Message::Text("abc".to_string())).await.unwrap();
        client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

        assert_eq!(source.read_frame().await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(source.read_frame().await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn pings_are_skipped() {
        let (server, mut client) = ws_pair().await;
        let (mut source, _sink) = split(server);

        client.send(Message::Ping(vec![9])).await.unwrap();
        client.send(Message::Text("after".to_string())).await.unwrap();

        assert_eq!(source.read_frame().await.unwrap(), Some(b"after".to_vec()));
    }

    #[tokio::test]
    async fn ascii_frames_are_written_as_text() {
        let (server, mut client) = ws_pair().await;
        let (_source, mut sink) = split(server);

        sink.write_frame(b"ZnJhbWU=".to_vec()).await.unwrap();

        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, "ZnJhbWU="),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_frame_ends_stream() {
        let (server, mut client) = ws_pair().await;
        let (mut source, _sink) = split(server);

        client.close(None).await.unwrap();

        assert_eq!(source.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sink_close_reaches_client() {
        let (server, mut client) = ws_pair().await;
        let (_source, mut sink) = split(server);

        sink.close().await.unwrap();
        sink.close().await.unwrap();

        assert!(matches!(client.next().await, Some(Ok(Message::Close(_)))));
    }

    #[test]
    fn config_applies_frame_limit() {
        let config = ws_config(4096);
        assert_eq!(config.max_message_size, Some(4096));
        assert_eq!(config.max_frame_size, Some(4096));
    }
}
