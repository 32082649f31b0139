use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A bare WebSocket client for driving the hub in integration tests: sends
/// raw JSON text frames and decodes replies into `serde_json::Value` so
/// tests can assert on whatever shape they care about without pulling in
/// the full frame-classification machinery.
pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(MockWsClient { write, read })
    }

    pub async fn send_json(&mut self, value: &serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(value)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn subscribe(&mut self, channel: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.send_json(&serde_json::json!({"event": "subscribe", "channel": channel}))
            .await
    }

    pub async fn recv_json(&mut self) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    /// Waits for a frame whose `event` field matches `event`, discarding
    /// anything else in between (useful for skipping `connection_established`
    /// when a test only cares about the subscribe ack).
    pub async fn recv_event(&mut self, event: &str) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        loop {
            let frame = self.recv_json().await?;
            if frame.get("event").and_then(|e| e.as_str()) == Some(event) {
                return Ok(frame);
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
